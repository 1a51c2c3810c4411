//! Shared-cache-backed proxy failure bookkeeping (spec §4.6).
//!
//! Counters live in Tier-2 so they are visible across worker processes;
//! grounded on the cached-pool-with-refresh shape of the teacher's IPv6
//! rotation pool, but state moves out of an in-process `RwLock` and into
//! the shared cache since this pool is consulted by many worker processes.

use std::time::Duration;

use subtitle_models::keys;

use crate::shared::SharedCache;

/// Failures reset on success; cooldown = BASE_COOLDOWN * failures.
const FAILURE_TTL: Duration = Duration::from_secs(24 * 3600);

pub struct ProxyRegistry {
    cache: SharedCache,
    max_failures: u32,
    base_cooldown: Duration,
}

impl ProxyRegistry {
    pub fn new(cache: SharedCache, max_failures: u32, base_cooldown: Duration) -> Self {
        Self {
            cache,
            max_failures,
            base_cooldown,
        }
    }

    pub async fn failures(&self, proxy_id: &str) -> u32 {
        self.cache
            .get_typed::<u32>(&keys::proxy_failures_key(proxy_id))
            .await
            .unwrap_or(0)
    }

    async fn last_failure_secs(&self, proxy_id: &str) -> Option<u64> {
        self.cache
            .get_typed::<u64>(&keys::proxy_last_failure_key(proxy_id))
            .await
    }

    /// `is_available(p) = failures < MAX_FAILURES OR (now - last_failure) > BASE_COOLDOWN * failures`
    pub async fn is_available(&self, proxy_id: &str) -> bool {
        let failures = self.failures(proxy_id).await;
        if failures < self.max_failures {
            return true;
        }
        let Some(last_failure) = self.last_failure_secs(proxy_id).await else {
            return true;
        };
        let now = now_secs();
        let cooldown = self.base_cooldown.as_secs() * failures as u64;
        now.saturating_sub(last_failure) > cooldown
    }

    pub async fn mark_success(&self, proxy_id: &str) {
        self.cache.delete(&keys::proxy_failures_key(proxy_id)).await;
        self.cache
            .delete(&keys::proxy_last_failure_key(proxy_id))
            .await;
    }

    pub async fn mark_failure(&self, proxy_id: &str) {
        let key = keys::proxy_failures_key(proxy_id);
        if self.cache.incr(&key, 1).await.is_ok() {
            let _ = self.cache.expire(&key, FAILURE_TTL).await;
        }
        self.cache
            .set(&keys::proxy_last_failure_key(proxy_id), &now_secs(), FAILURE_TTL)
            .await;
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
