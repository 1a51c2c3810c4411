//! Process-wide collaborators, constructed once at startup and threaded
//! through the request pipeline via Axum's `State` extractor — the
//! construction-root pattern SPEC_FULL.md §9 calls for in place of global
//! async singletons.

use std::sync::Arc;

use subtitle_cache::{MemoryCache, RateLimiter, SharedCache};
use subtitle_db::{DbConfig, Repository};
use subtitle_queue::JobQueue;

use crate::config::ApiConfig;
use crate::middleware::IpLimiterCache;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub memory: Arc<MemoryCache>,
    pub shared: SharedCache,
    pub repo: Repository,
    pub queue: Arc<JobQueue>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ip_limiter: Arc<IpLimiterCache>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub async fn new(
        config: ApiConfig,
        db_config: DbConfig,
        queue_config: subtitle_queue::QueueConfig,
        redis_url: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = subtitle_db::init_pool(&db_config).await?;
        let repo = Repository::new(pool);

        let shared = SharedCache::new(redis_url)?;
        let memory = Arc::new(MemoryCache::new(config.memory_cache_max_entries));

        let queue = JobQueue::new(queue_config)?;
        queue.init().await?;

        let rate_limiter = RateLimiter::new(shared.clone(), config.rate_limit_fail_open);

        let orchestrator = Arc::new(Orchestrator::new(
            memory.clone(),
            shared.clone(),
            repo.clone(),
            Arc::new(queue),
            config.memory_cache_ttl,
            config.result_ttl,
        ));

        Ok(Self {
            config: Arc::new(config),
            memory,
            shared,
            repo,
            queue: orchestrator_queue_handle(&orchestrator),
            rate_limiter: Arc::new(rate_limiter),
            ip_limiter: Arc::new(IpLimiterCache::new()),
            orchestrator,
        })
    }
}

/// The orchestrator owns the canonical `Arc<JobQueue>`; admin handlers that
/// need direct queue access (stats, DLQ depth) borrow the same handle
/// rather than constructing a second client.
fn orchestrator_queue_handle(orchestrator: &Arc<Orchestrator>) -> Arc<JobQueue> {
    orchestrator.queue_handle()
}
