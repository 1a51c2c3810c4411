//! Connection pool construction and schema/migration bootstrap.
//!
//! Grounded on `initialize_database` in the teacher's SQLite-backed
//! sibling, generalized to Postgres: connect, ensure the configured schema
//! exists, then run migrations (unless `auto_create` short-circuits that
//! in favor of ad hoc table creation — see `DbConfig::auto_create`).

use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::Pool;
use tracing::info;

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};

/// Pooled connections recycled hourly, pre-pinged before use (spec §5).
const POOL_RECYCLE: Duration = Duration::from_secs(3600);
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn init_pool(config: &DbConfig) -> DbResult<Pool<Postgres>> {
    if !config.validate_schema_name() {
        return Err(DbError::InvalidSchemaName(config.schema.clone()));
    }

    let schema = config.schema.clone();
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .max_lifetime(POOL_RECYCLE)
        .test_before_acquire(true)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                sqlx::query(&format!("SET search_path TO \"{}\", public", schema))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", config.schema))
        .execute(&pool)
        .await?;

    if config.auto_create {
        info!("DB_AUTO_CREATE set, creating tables ad hoc instead of running migrations");
        create_tables_ad_hoc(&pool).await?;
    } else {
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    info!("durable store initialized (schema={})", config.schema);
    Ok(pool)
}

async fn create_tables_ad_hoc(pool: &Pool<Postgres>) -> DbResult<()> {
    // Multiple statements in one file, so this goes through the simple
    // query protocol rather than a prepared statement.
    sqlx::raw_sql(include_str!("../migrations/0001_init.sql"))
        .execute(pool)
        .await?;
    Ok(())
}
