//! Wire shapes for queued work: the item placed on the stream and the
//! job-status record consumers poll with `fetch`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RQ-like job status. `deferred`/`scheduled` exist for jobs that are not
/// yet runnable; everything else tracks a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    Queued,
    Started,
    Deferred,
    Scheduled,
    Finished,
    Failed,
}

impl QueueJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueJobStatus::Queued => "queued",
            QueueJobStatus::Started => "started",
            QueueJobStatus::Deferred => "deferred",
            QueueJobStatus::Scheduled => "scheduled",
            QueueJobStatus::Finished => "finished",
            QueueJobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "started" => Some(Self::Started),
            "deferred" => Some(Self::Deferred),
            "scheduled" => Some(Self::Scheduled),
            "finished" => Some(Self::Finished),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// What goes on the stream: a reference to the work function plus its
/// keyword arguments, serialized as JSON for the consumer to deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub job_id: String,
    pub func_ref: String,
    pub kwargs: Value,
}

/// Options accepted by `enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub result_ttl_secs: u64,
    pub default_timeout_secs: u64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            result_ttl_secs: 86_400,
            default_timeout_secs: 600,
        }
    }
}

/// The record returned by `fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: QueueJobStatus,
    pub func_ref: String,
    pub kwargs: Value,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub exc_info: Option<String>,
}

/// Aggregate queue depth/status counters for `stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub depth: u64,
    pub started: u64,
    pub failed: u64,
    pub deferred: u64,
    pub scheduled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            QueueJobStatus::Queued,
            QueueJobStatus::Started,
            QueueJobStatus::Deferred,
            QueueJobStatus::Scheduled,
            QueueJobStatus::Finished,
            QueueJobStatus::Failed,
        ] {
            assert_eq!(QueueJobStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn unknown_status_rejected() {
        assert_eq!(QueueJobStatus::from_str("bogus"), None);
    }

    #[test]
    fn default_enqueue_options_are_sane() {
        let opts = EnqueueOptions::default();
        assert!(opts.result_ttl_secs > 0);
        assert!(opts.default_timeout_secs > 0);
    }
}
