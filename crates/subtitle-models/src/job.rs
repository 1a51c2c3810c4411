use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::VideoKey;

/// Durable job status. Transitions are one-way:
/// `queued -> processing -> {completed | failed | timeout | stale}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
    Stale,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Stale
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

/// Webhook delivery outcome recorded against a terminal job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// Default max per-attempt retry count within a single job execution.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Durable record of one extraction job. 1:N with a VideoKey; invariant I1
/// guarantees at most one row with an in-flight status per VideoKey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: Uuid,
    pub video_key: VideoKey,
    pub job_id: String,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_delivered: bool,
    pub webhook_delivery_status: Option<WebhookDeliveryStatus>,
    pub webhook_delivery_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub attempt: i32,
    pub max_attempts: i32,
}

impl ExtractionJob {
    pub fn new(video_key: VideoKey, job_id: String, webhook_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_key,
            job_id,
            status: JobStatus::Queued,
            result: None,
            error: None,
            webhook_url,
            webhook_delivered: false,
            webhook_delivery_status: None,
            webhook_delivery_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn wants_webhook(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// I4: a webhook row must reach a terminal delivery status once the
    /// job itself reaches a terminal status.
    pub fn webhook_invariant_holds(&self) -> bool {
        if !self.status.is_terminal() || self.webhook_url.is_none() {
            return true;
        }
        matches!(
            self.webhook_delivery_status,
            Some(WebhookDeliveryStatus::Delivered) | Some(WebhookDeliveryStatus::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_queued_and_in_flight() {
        let job = ExtractionJob::new(VideoKey::new("dQw4w9WgXcQ", "en"), "job-1".into(), None);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.status.is_in_flight());
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn webhook_invariant_satisfied_without_webhook() {
        let mut job = ExtractionJob::new(VideoKey::new("dQw4w9WgXcQ", "en"), "job-1".into(), None);
        job.status = JobStatus::Completed;
        assert!(job.webhook_invariant_holds());
    }

    #[test]
    fn webhook_invariant_violated_when_pending_at_terminal() {
        let mut job = ExtractionJob::new(
            VideoKey::new("dQw4w9WgXcQ", "en"),
            "job-1".into(),
            Some("http://receiver/hook".into()),
        );
        job.status = JobStatus::Completed;
        job.webhook_delivery_status = Some(WebhookDeliveryStatus::Pending);
        assert!(!job.webhook_invariant_holds());

        job.webhook_delivery_status = Some(WebhookDeliveryStatus::Delivered);
        assert!(job.webhook_invariant_holds());
    }
}
