use serde::{Deserialize, Serialize};

/// Serialized state of a token bucket for one (client_ip, endpoint) pair.
/// The arithmetic itself lives in `subtitle-cache` where it can run
/// atomically against the shared store; this is the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBucket {
    pub tokens: f64,
    pub last_refill_ts: f64,
}

impl RateBucket {
    pub fn full(capacity: f64, now: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill_ts: now,
        }
    }
}
