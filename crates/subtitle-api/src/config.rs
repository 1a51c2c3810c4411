//! API process configuration, read directly from the environment the way
//! every `*Config::from_env()` constructor in the corpus does.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,

    pub db_pool_size: u32,

    pub rate_limit_rpm: u32,
    pub rate_limit_burst: u32,
    pub rate_limit_fail_open: bool,

    pub jwt_secret: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header_name: String,

    pub memory_cache_max_entries: usize,
    pub memory_cache_ttl: Duration,
    pub result_ttl: Duration,

    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            cors_origins: vec![],
            db_pool_size: 10,
            rate_limit_rpm: 60,
            rate_limit_burst: 10,
            rate_limit_fail_open: false,
            jwt_secret: None,
            api_key: None,
            api_key_header_name: "X-API-Key".to_string(),
            memory_cache_max_entries: 10_000,
            memory_cache_ttl: Duration::from_secs(60),
            result_ttl: Duration::from_secs(3600),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            cors_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            db_pool_size: std::env::var("DB_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db_pool_size),
            rate_limit_rpm: std::env::var("RATE_LIMIT_REQUESTS_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_rpm),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_burst),
            rate_limit_fail_open: std::env::var("RATE_LIMIT_FAIL_OPEN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            api_key: std::env::var("API_KEY").ok().filter(|s| !s.is_empty()),
            api_key_header_name: std::env::var("API_KEY_HEADER_NAME")
                .unwrap_or(defaults.api_key_header_name),
            memory_cache_max_entries: std::env::var("MEMORY_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_cache_max_entries),
            memory_cache_ttl: Duration::from_secs(
                std::env::var("MEMORY_CACHE_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            result_ttl: Duration::from_secs(
                std::env::var("REDIS_RESULT_TTL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ApiConfig::default();
        assert!(!cfg.is_production());
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert!(!cfg.rate_limit_fail_open);
    }
}
