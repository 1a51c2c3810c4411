//! Worker configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `WORKER_CONCURRENCY` — jobs processed concurrently by this process.
    pub concurrency: usize,
    /// `WORKER_DB_POOL_SIZE`.
    pub db_pool_size: u32,
    /// `YT_EXTRACTION_TIMEOUT`, per-attempt engine timeout.
    pub extraction_timeout: Duration,
    /// `YT_RETRY_MAX_ATTEMPTS`.
    pub retry_max_attempts: u32,
    /// `YT_RETRY_BACKOFF_FACTOR` — base of the `2^(attempt-1)` backoff,
    /// capped at 30s per spec §4.8. Default 2.0 matches the documented
    /// formula; present as a tunable since the spec names the env var.
    pub retry_backoff_factor: f64,
    pub proxy_urls: String,
    pub proxy_auth: Option<String>,
    pub proxy_cooldown: Duration,
    pub proxy_max_failures: u32,
    pub webhook_secret: Option<String>,
    pub webhook_timeout: Duration,
    pub webhook_max_retries: u32,
    /// Base URL of the primary transcript engine. Not part of the spec's
    /// named environment options (the engines themselves are out of
    /// scope); required only to construct `subtitle_extract::PrimaryEngine`.
    pub primary_engine_url: String,
    pub fallback_engine_url: String,
    pub result_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            db_pool_size: 5,
            extraction_timeout: Duration::from_secs(30),
            retry_max_attempts: 3,
            retry_backoff_factor: 2.0,
            proxy_urls: String::new(),
            proxy_auth: None,
            proxy_cooldown: Duration::from_secs(60),
            proxy_max_failures: 3,
            webhook_secret: None,
            webhook_timeout: Duration::from_secs(10),
            webhook_max_retries: 3,
            primary_engine_url: "http://localhost:8081".to_string(),
            fallback_engine_url: "http://localhost:8082".to_string(),
            result_ttl: Duration::from_secs(86_400),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse("WORKER_CONCURRENCY", defaults.concurrency),
            db_pool_size: env_parse("WORKER_DB_POOL_SIZE", defaults.db_pool_size),
            extraction_timeout: Duration::from_secs(env_parse(
                "YT_EXTRACTION_TIMEOUT",
                defaults.extraction_timeout.as_secs(),
            )),
            retry_max_attempts: env_parse("YT_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_backoff_factor: env_parse(
                "YT_RETRY_BACKOFF_FACTOR",
                defaults.retry_backoff_factor,
            ),
            proxy_urls: std::env::var("YT_PROXY_URLS").unwrap_or_default(),
            proxy_auth: std::env::var("YT_PROXY_AUTH").ok(),
            proxy_cooldown: Duration::from_secs(env_parse(
                "PROXY_COOLDOWN_SECONDS",
                defaults.proxy_cooldown.as_secs(),
            )),
            proxy_max_failures: env_parse("PROXY_MAX_FAILURES", defaults.proxy_max_failures),
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
            webhook_timeout: Duration::from_secs(env_parse(
                "WEBHOOK_TIMEOUT",
                defaults.webhook_timeout.as_secs(),
            )),
            webhook_max_retries: env_parse("WEBHOOK_MAX_RETRIES", defaults.webhook_max_retries),
            primary_engine_url: std::env::var("PRIMARY_ENGINE_URL")
                .unwrap_or(defaults.primary_engine_url),
            fallback_engine_url: std::env::var("FALLBACK_ENGINE_URL")
                .unwrap_or(defaults.fallback_engine_url),
            result_ttl: Duration::from_secs(env_parse(
                "REDIS_RESULT_TTL",
                defaults.result_ttl.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
