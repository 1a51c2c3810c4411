use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::VideoKey;

/// How a subtitle artifact was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Primary,
    Fallback,
}

/// Outcome of the most recent extraction attempt for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Success,
    Failed,
}

/// A single timestamped caption segment. Timestamps are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_sec: f64,
    pub duration_sec: f64,
    pub text: String,
}

/// The durable, cacheable subtitle artifact for one (video_id, language).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRecord {
    pub id: Uuid,
    pub video_key: VideoKey,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub segments: Vec<Segment>,
    pub plain_text: String,
    pub extraction_method: Option<ExtractionMethod>,
    pub extraction_duration_ms: Option<i64>,
    pub extraction_status: ExtractionStatus,
    pub extraction_error: Option<String>,
    pub proxy_used: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// TTL applied to every upsert: `expires_at = now + 30d` (spec §3).
pub const RECORD_TTL_DAYS: i64 = 30;

/// Max length an extraction error string is truncated to before persisting.
pub const ERROR_TRUNCATE_LEN: usize = 500;

impl SubtitleRecord {
    /// Build a freshly-extracted successful record.
    pub fn new_success(
        video_key: VideoKey,
        title: Option<String>,
        duration_seconds: Option<f64>,
        segments: Vec<Segment>,
        plain_text: String,
        extraction_method: ExtractionMethod,
        extraction_duration_ms: i64,
        proxy_used: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video_key,
            title,
            duration_seconds,
            segments,
            plain_text,
            extraction_method: Some(extraction_method),
            extraction_duration_ms: Some(extraction_duration_ms),
            extraction_status: ExtractionStatus::Success,
            extraction_error: None,
            proxy_used,
            checksum: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(RECORD_TTL_DAYS),
        }
    }

    /// I5: segment start times must be non-decreasing.
    pub fn segments_non_decreasing(&self) -> bool {
        self.segments
            .windows(2)
            .all(|w| w[0].start_sec <= w[1].start_sec)
    }

    /// Truncate an extraction error string to the persisted limit.
    pub fn truncate_error(err: &str) -> String {
        if err.len() <= ERROR_TRUNCATE_LEN {
            err.to_string()
        } else {
            err.chars().take(ERROR_TRUNCATE_LEN).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> VideoKey {
        VideoKey::new("dQw4w9WgXcQ", "en")
    }

    #[test]
    fn non_decreasing_segments_pass() {
        let record = SubtitleRecord::new_success(
            key(),
            None,
            None,
            vec![
                Segment { start_sec: 0.0, duration_sec: 2.0, text: "Hello".into() },
                Segment { start_sec: 2.0, duration_sec: 2.0, text: "world".into() },
            ],
            "Hello world".into(),
            ExtractionMethod::Primary,
            120,
            None,
        );
        assert!(record.segments_non_decreasing());
    }

    #[test]
    fn decreasing_segments_fail() {
        let mut record = SubtitleRecord::new_success(
            key(),
            None,
            None,
            vec![
                Segment { start_sec: 2.0, duration_sec: 2.0, text: "world".into() },
                Segment { start_sec: 0.0, duration_sec: 2.0, text: "Hello".into() },
            ],
            "world Hello".into(),
            ExtractionMethod::Primary,
            120,
            None,
        );
        assert!(!record.segments_non_decreasing());
        record.segments.reverse();
        assert!(record.segments_non_decreasing());
    }

    #[test]
    fn truncates_long_errors() {
        let long = "x".repeat(600);
        let truncated = SubtitleRecord::truncate_error(&long);
        assert_eq!(truncated.len(), ERROR_TRUNCATE_LEN);
    }

    #[test]
    fn short_errors_unchanged() {
        assert_eq!(SubtitleRecord::truncate_error("boom"), "boom");
    }
}
