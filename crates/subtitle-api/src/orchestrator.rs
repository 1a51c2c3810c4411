//! Cache orchestrator (spec §4.9): read-through across tiers 1→2→3 with
//! request coalescing on a tier-3 miss, and single-flight async enqueue.
//! No single teacher module does this composition; every primitive it
//! calls (tier operations, `set_if_absent` locking, `find_pending_job`/
//! `create_job`) is grounded in the crates it composes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use subtitle_cache::{MemoryCache, SharedCache};
use subtitle_db::Repository;
use subtitle_models::{CachedSubtitle, ExtractionStatus, JobStatus, VideoKey};
use subtitle_queue::{EnqueueOptions, JobQueue};

use crate::error::ApiError;
use crate::metrics;

const LOCK_TTL: Duration = Duration::from_secs(30);
const LOST_LOCK_SLEEP: Duration = Duration::from_millis(100);

pub struct Orchestrator {
    memory: Arc<MemoryCache>,
    shared: SharedCache,
    repo: Repository,
    queue: Arc<JobQueue>,
    memory_ttl: Duration,
    result_ttl: Duration,
}

impl Orchestrator {
    pub fn new(
        memory: Arc<MemoryCache>,
        shared: SharedCache,
        repo: Repository,
        queue: Arc<JobQueue>,
        memory_ttl: Duration,
        result_ttl: Duration,
    ) -> Self {
        Self {
            memory,
            shared,
            repo,
            queue,
            memory_ttl,
            result_ttl,
        }
    }

    pub fn queue_handle(&self) -> Arc<JobQueue> {
        self.queue.clone()
    }

    /// §4.9 read path: tier-1 -> tier-2 -> coalescing lock -> tier-3.
    pub async fn get_cached(&self, key: &VideoKey) -> Option<CachedSubtitle> {
        let cache_key = key.cache_key();

        if let Some(value) = self.memory.get(&cache_key) {
            metrics::record_cache_hit("memory");
            return serde_json::from_value::<CachedSubtitle>(value)
                .ok()
                .map(|p| p.with_tier("memory"));
        }

        if let Some(payload) = self.try_tier2(&cache_key, true).await {
            return Some(payload);
        }

        let lock_key = key.lock_key();
        let acquired = self.shared.acquire_lock(&lock_key, LOCK_TTL).await.unwrap_or(false);

        if acquired {
            let result = self.get_cached_locked(key, &cache_key).await;
            let _ = self.shared.release_lock(&lock_key).await;
            if result.is_none() {
                metrics::record_cache_miss();
            }
            result
        } else {
            tokio::time::sleep(LOST_LOCK_SLEEP).await;
            let result = self.try_tier2(&cache_key, false).await;
            if result.is_none() {
                metrics::record_cache_miss();
            }
            result
        }
    }

    async fn try_tier2(&self, cache_key: &str, populate_tier1: bool) -> Option<CachedSubtitle> {
        let value = self.shared.get(cache_key).await?;
        metrics::record_cache_hit("redis");
        if populate_tier1 {
            self.memory.set(cache_key, value.clone(), self.memory_ttl);
        }
        serde_json::from_value::<CachedSubtitle>(value)
            .ok()
            .map(|p| p.with_tier("redis"))
    }

    async fn get_cached_locked(&self, key: &VideoKey, cache_key: &str) -> Option<CachedSubtitle> {
        // Another request may have filled tier-2 while we waited for the lock.
        if let Some(payload) = self.try_tier2(cache_key, true).await {
            return Some(payload);
        }

        match self.repo.find_subtitle(key).await {
            Ok(Some(record)) if record.extraction_status == ExtractionStatus::Success => {
                let payload = CachedSubtitle::from_record(&record, "postgres");
                if let Ok(value) = serde_json::to_value(&payload) {
                    self.shared.set(cache_key, &value, self.result_ttl).await;
                    self.memory.set(cache_key, value, self.memory_ttl);
                }
                metrics::record_cache_hit("postgres");
                Some(payload)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "tier-3 lookup failed");
                None
            }
        }
    }

    /// §4.9 batch read: single tier-1 `get_many`, then single tier-2
    /// `get_many` for the remainder; no tier-3 fallback (keeps batch
    /// response bounded, per spec.md §9's documented open question).
    pub async fn get_cached_batch(
        &self,
        video_ids: &[String],
        language: &str,
    ) -> HashMap<String, CachedSubtitle> {
        let keys: Vec<VideoKey> = video_ids
            .iter()
            .map(|id| VideoKey::new(id.clone(), language.to_string()))
            .collect();
        let cache_keys: Vec<String> = keys.iter().map(VideoKey::cache_key).collect();

        let mut out = HashMap::new();
        let mem_hits = self.memory.get_many(&cache_keys);

        let mut remaining = Vec::new();
        for (cache_key, vk) in cache_keys.iter().zip(&keys) {
            match mem_hits
                .get(cache_key)
                .and_then(|v| serde_json::from_value::<CachedSubtitle>(v.clone()).ok())
            {
                Some(payload) => {
                    out.insert(vk.video_id.clone(), payload.with_tier("memory"));
                }
                None => remaining.push(cache_key.clone()),
            }
        }

        if !remaining.is_empty() {
            let shared_hits = self.shared.get_many(&remaining).await;
            for (cache_key, vk) in cache_keys.iter().zip(&keys) {
                if out.contains_key(&vk.video_id) {
                    continue;
                }
                if let Some(value) = shared_hits.get(cache_key) {
                    self.memory.set(cache_key, value.clone(), self.memory_ttl);
                    if let Ok(payload) = serde_json::from_value::<CachedSubtitle>(value.clone()) {
                        out.insert(vk.video_id.clone(), payload.with_tier("redis"));
                    }
                }
            }
        }

        out
    }

    /// §4.9 single-flight enqueue: dedup against an already in-flight job,
    /// reconcile a durable row the queue no longer knows about, else
    /// enqueue afresh.
    pub async fn enqueue_extraction(
        &self,
        key: &VideoKey,
        clean_for_ai: bool,
        webhook_url: Option<String>,
        client_ip_hash: Option<String>,
    ) -> Result<String, ApiError> {
        if let Some(existing) = self.repo.find_pending_job(key).await? {
            if self.queue.is_alive(&existing.job_id).await.unwrap_or(false) {
                return Ok(existing.job_id);
            }
            self.repo
                .update_job_status(
                    &existing.job_id,
                    JobStatus::Stale,
                    None,
                    Some("queue_job_missing"),
                )
                .await?;
        }

        let kwargs = serde_json::json!({
            "video_id": key.video_id,
            "language": key.language,
            "clean_for_ai": clean_for_ai,
            "client_ip_hash": client_ip_hash,
        });

        let job_id = self
            .queue
            .enqueue("extract_task", kwargs, EnqueueOptions::default())
            .await?;
        self.repo
            .create_job(key, &job_id, webhook_url.as_deref())
            .await?;

        metrics::record_job_enqueued();
        Ok(job_id)
    }
}
