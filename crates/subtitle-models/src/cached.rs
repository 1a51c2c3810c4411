use serde::{Deserialize, Serialize};

use crate::subtitle::{ExtractionMethod, SubtitleRecord};
use crate::Segment;

/// The read-path response payload (spec §4.9). This is the exact shape
/// stored verbatim (as JSON) in Tier-1 and Tier-2 — every writer into
/// those tiers (the API's cache orchestrator on a Tier-3 hit, the worker
/// on a freshly-completed extraction) must serialize this type, and every
/// reader decodes it as this type, so the two tiers stay shape-compatible
/// regardless of which process populated them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSubtitle {
    pub video_id: String,
    pub language: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub subtitles: Vec<Segment>,
    pub plain_text: String,
    pub extraction_method: Option<ExtractionMethod>,
    pub proxy_used: Option<String>,
    pub cached: bool,
    pub cache_tier: Option<String>,
}

impl CachedSubtitle {
    /// Build the cache payload from a durable record. `cache_tier` names
    /// the tier this payload is being written into/read from (e.g.
    /// `"postgres"`, `"redis"`, `"memory"`) — a read path that later
    /// decodes this value typically overwrites it via `with_tier` to
    /// reflect where the read actually hit.
    pub fn from_record(record: &SubtitleRecord, cache_tier: &str) -> Self {
        Self {
            video_id: record.video_key.video_id.clone(),
            language: record.video_key.language.clone(),
            title: record.title.clone(),
            duration_seconds: record.duration_seconds,
            subtitles: record.segments.clone(),
            plain_text: record.plain_text.clone(),
            extraction_method: record.extraction_method,
            proxy_used: record.proxy_used.clone(),
            cached: true,
            cache_tier: Some(cache_tier.to_string()),
        }
    }

    pub fn with_tier(mut self, tier: &str) -> Self {
        self.cache_tier = Some(tier.to_string());
        self.cached = true;
        self
    }
}
