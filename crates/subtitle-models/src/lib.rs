//! Shared data model for the subtitle cache service.
//!
//! Types here are plain data plus pure derivation functions; no I/O.

pub mod keys;
pub mod video_id;

mod cached;
mod job;
mod proxy;
mod rate_bucket;
mod subtitle;

pub use cached::CachedSubtitle;
pub use job::{ExtractionJob, JobStatus, WebhookDeliveryStatus, DEFAULT_MAX_ATTEMPTS};
pub use proxy::Proxy;
pub use rate_bucket::RateBucket;
pub use subtitle::{
    ExtractionMethod, ExtractionStatus, Segment, SubtitleRecord, ERROR_TRUNCATE_LEN,
    RECORD_TTL_DAYS,
};
pub use video_id::{VideoIdError, VideoIdResult};

use serde::{Deserialize, Serialize};

/// Identity of a cached/persisted subtitle artifact. Never stored on its
/// own; derived per request from the video ID and language code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoKey {
    pub video_id: String,
    pub language: String,
}

impl VideoKey {
    pub fn new(video_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            language: language.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        keys::cache_key(&self.video_id, &self.language)
    }

    pub fn lock_key(&self) -> String {
        keys::lock_key(&self.cache_key())
    }
}
