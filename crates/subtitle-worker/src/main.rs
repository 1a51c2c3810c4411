//! Extraction worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subtitle_cache::{ProxyRegistry, SharedCache};
use subtitle_db::{DbConfig, Repository};
use subtitle_extract::{FallbackEngine, PrimaryEngine, ProxyPool};
use subtitle_queue::{JobQueue, QueueConfig};
use subtitle_worker::executor::ExecutionContext;
use subtitle_worker::{JobExecutor, WebhookNotifier, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("subtitle=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("starting subtitle-worker");

    let config = WorkerConfig::from_env();
    info!(concurrency = config.concurrency, "worker config loaded");

    let queue_config = QueueConfig::from_env();
    let redis_url = queue_config.redis_url.clone();
    let queue = match JobQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("failed to create job queue: {e}");
            std::process::exit(1);
        }
    };

    let db_config = DbConfig::from_env();
    let pool = match subtitle_db::init_pool(&db_config).await {
        Ok(p) => p,
        Err(e) => {
            error!("failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    let repo = Repository::new(pool);

    let shared = match SharedCache::new(&redis_url) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to connect to redis: {e}");
            std::process::exit(1);
        }
    };

    let registry = ProxyRegistry::new(shared.clone(), config.proxy_max_failures, config.proxy_cooldown);
    let proxy_pool = ProxyPool::new(&config.proxy_urls, registry, config.proxy_auth.clone());

    let primary = Box::new(PrimaryEngine::new(config.primary_engine_url.clone()));
    let fallback = Box::new(FallbackEngine::new(config.fallback_engine_url.clone()));
    let notifier = WebhookNotifier::new(&config);

    let ctx = ExecutionContext {
        config: config.clone(),
        shared,
        repo,
        proxy_pool,
        primary,
        fallback,
        notifier,
    };

    let executor = Arc::new(JobExecutor::new(queue, ctx));

    let shutdown_executor = Arc::clone(&executor);
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("executor error: {e}");
        std::process::exit(1);
    }

    shutdown_handle.abort();
    info!("worker shutdown complete");
}
