//! Durable-store configuration.

/// Durable-store configuration, read the way every `*Config::from_env()`
/// constructor in the teacher reads environment variables directly.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub schema: String,
    pub pool_size: u32,
    /// When true, skip `sqlx::migrate!` and create tables ad hoc instead.
    /// Per spec §9's own design note, production deployments should
    /// disable this — migrations are the source of truth there.
    pub auto_create: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/subtitles".to_string(),
            schema: "public".to_string(),
            pool_size: 10,
            auto_create: false,
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/subtitles".to_string()),
            schema: std::env::var("DB_SCHEMA").unwrap_or_else(|_| "public".to_string()),
            pool_size: std::env::var("DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            auto_create: std::env::var("DB_AUTO_CREATE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Identifiers must match `^[A-Za-z_][A-Za-z0-9_]*$` per spec §6.
    pub fn validate_schema_name(&self) -> bool {
        let mut chars = self.schema.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_schema_names() {
        let mut cfg = DbConfig::default();
        cfg.schema = "subtitles_svc".to_string();
        assert!(cfg.validate_schema_name());
    }

    #[test]
    fn rejects_leading_digit() {
        let mut cfg = DbConfig::default();
        cfg.schema = "1bad".to_string();
        assert!(!cfg.validate_schema_name());
    }

    #[test]
    fn rejects_special_chars() {
        let mut cfg = DbConfig::default();
        cfg.schema = "bad-schema; drop table".to_string();
        assert!(!cfg.validate_schema_name());
    }
}
