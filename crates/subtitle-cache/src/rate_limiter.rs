//! Token-bucket rate limiter (spec §4.5).
//!
//! Atomic via a single Lua script evaluated against the shared cache, so
//! that the read-refill-consume-persist cycle cannot race across
//! concurrent requests for the same bucket. Fails closed on store failure.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use std::sync::OnceLock;

use redis::Script;
use tracing::warn;

use crate::shared::SharedCache;

// KEYS[1] = bucket key
// ARGV[1] = capacity, ARGV[2] = refill_per_second, ARGV[3] = cost, ARGV[4] = now, ARGV[5] = ttl
// returns { allowed (0/1), remaining_floor, tokens }
fn bucket_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(
        r#"
        local capacity = tonumber(ARGV[1])
        local refill_per_second = tonumber(ARGV[2])
        local cost = tonumber(ARGV[3])
        local now = tonumber(ARGV[4])
        local ttl = tonumber(ARGV[5])

        local raw = redis.call("GET", KEYS[1])
        local tokens = capacity
        local last_ts = now
        if raw then
            local sep = string.find(raw, ":")
            tokens = tonumber(string.sub(raw, 1, sep - 1))
            last_ts = tonumber(string.sub(raw, sep + 1))
        end

        local delta = now - last_ts
        if delta < 0 then delta = 0 end
        tokens = math.min(capacity, tokens + delta * refill_per_second)

        local allowed = 0
        if tokens >= cost then
            tokens = tokens - cost
            allowed = 1
        end

        redis.call("SET", KEYS[1], tostring(tokens) .. ":" .. tostring(now), "EX", ttl)

        return { allowed, math.floor(tokens), tostring(tokens) }
        "#,
    ))
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: u64,
}

/// Bucket TTL: entries auto-expire after 61s idle (spec §3).
const BUCKET_TTL_SECS: u64 = 61;

pub struct RateLimiter {
    cache: SharedCache,
    fail_open: bool,
}

impl RateLimiter {
    pub fn new(cache: SharedCache, fail_open: bool) -> Self {
        Self { cache, fail_open }
    }

    /// Check and consume `cost` tokens from the bucket for `key`.
    /// `capacity = rpm + burst`; `refill_per_second = rpm / 60`.
    pub async fn check(&self, key: &str, rpm: u32, burst: u32, cost: u32) -> RateLimitDecision {
        let capacity = (rpm + burst) as f64;
        let refill_per_second = rpm as f64 / 60.0;
        let now = now_secs();
        let reset_at = now as u64 + BUCKET_TTL_SECS;

        let args = vec![
            capacity.to_string(),
            refill_per_second.to_string(),
            (cost as f64).to_string(),
            now.to_string(),
            BUCKET_TTL_SECS.to_string(),
        ];

        let result: Result<Vec<String>, _> = self
            .cache
            .eval_script(bucket_script(), &[key], &args)
            .await;

        match result {
            Ok(reply) if reply.len() == 3 => {
                let allowed = reply[0] == "1";
                let remaining = reply[1].parse::<i64>().unwrap_or(0);
                RateLimitDecision {
                    allowed,
                    remaining,
                    reset_at,
                }
            }
            Ok(_) | Err(_) => {
                warn!(key, "rate limiter store unavailable");
                if self.fail_open {
                    RateLimitDecision {
                        allowed: true,
                        remaining: rpm as i64,
                        reset_at,
                    }
                } else {
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at,
                    }
                }
            }
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_fields_are_plain_copy() {
        let d = RateLimitDecision {
            allowed: true,
            remaining: 5,
            reset_at: 100,
        };
        let d2 = d;
        assert_eq!(d, d2);
    }
}
