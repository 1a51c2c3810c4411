//! Tier-2 shared cache: thin wrapper over Redis.
//!
//! Grounded on the direct `redis::cmd`/`AsyncCommands` usage in the
//! teacher's job-queue client (`try_acquire_idempotency` for the
//! set-if-absent-as-lock idiom, `increment_retry` for atomic incr).
//! Per spec §4.3: decode/transport failures on reads are swallowed and
//! logged, never propagated; writes are best-effort. `delete_pattern`
//! MUST use incremental `SCAN`, never blocking `KEYS`.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::CacheResult;

const SCAN_BATCH_SIZE: usize = 500;

/// Shared cache client. Cloning is cheap (the inner `redis::Client` is
/// itself cheaply cloneable; connections are opened per call via the
/// multiplexed async connection, same pattern as the teacher's queue).
#[derive(Clone)]
pub struct SharedCache {
    client: redis::Client,
}

impl SharedCache {
    pub fn new(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Returns `None` on transport error or decode failure (logged).
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut conn = match self.conn().await {
            Ok(c) => c,
            Err(e) => {
                warn!(key, error = %e, "shared cache get: connection failed");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "shared cache get failed");
                return None;
            }
        };
        raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "shared cache decode failed");
                None
            }
        })
    }

    /// Single round-trip batch read; keys absent from the reply map on miss.
    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, Value> {
        let mut out = HashMap::new();
        if keys.is_empty() {
            return out;
        }
        let mut conn = match self.conn().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "shared cache get_many: connection failed");
                return out;
            }
        };
        let raws: Vec<Option<String>> = match conn.mget(keys).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "shared cache get_many failed");
                return out;
            }
        };
        for (key, raw) in keys.iter().zip(raws) {
            if let Some(raw) = raw {
                if let Ok(value) = serde_json::from_str(&raw) {
                    out.insert(key.clone(), value);
                }
            }
        }
        out
    }

    /// Best-effort write; errors are swallowed and logged.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "shared cache encode failed");
                return;
            }
        };
        let mut conn = match self.conn().await {
            Ok(c) => c,
            Err(e) => {
                warn!(key, error = %e, "shared cache set: connection failed");
                return;
            }
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
            .await
        {
            warn!(key, error = %e, "shared cache set failed");
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut conn = match self.conn().await {
            Ok(c) => c,
            Err(e) => {
                warn!(key, error = %e, "shared cache delete: connection failed");
                return false;
            }
        };
        conn.del::<_, u64>(key).await.unwrap_or(0) > 0
    }

    /// Incrementally scans and deletes keys matching `pattern`, in batches
    /// of `SCAN_BATCH_SIZE`, never blocking the server with `KEYS`.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let mut conn = match self.conn().await {
            Ok(c) => c,
            Err(e) => {
                warn!(pattern, error = %e, "shared cache delete_pattern: connection failed");
                return 0;
            }
        };

        let mut deleted = 0u64;
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(pattern, error = %e, "shared cache scan failed");
                    break;
                }
            };

            if !batch.is_empty() {
                match conn.del::<_, u64>(&batch).await {
                    Ok(n) => deleted += n,
                    Err(e) => warn!(pattern, error = %e, "shared cache batch delete failed"),
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        deleted
    }

    pub async fn incr(&self, key: &str, n: i64) -> CacheResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, n).await?)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.expire::<_, ()>(key, ttl.as_secs() as i64).await?;
        Ok(())
    }

    /// Atomic `SET key value NX EX ttl`, used as a lock primitive.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let result: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .unwrap_or(false);
        Ok(result)
    }

    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.set_if_absent(key, "1", ttl).await
    }

    pub async fn release_lock(&self, key: &str) -> CacheResult<()> {
        self.delete(key).await;
        Ok(())
    }

    /// Evaluate a Lua script atomically. Used by the rate limiter for its
    /// read-refill-consume-persist cycle.
    pub async fn eval_script<T: redis::FromRedisValue>(
        &self,
        script: &redis::Script,
        keys: &[&str],
        args: &[String],
    ) -> CacheResult<T> {
        let mut conn = self.conn().await?;
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        Ok(invocation.invoke_async(&mut conn).await?)
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .await
            .and_then(|v| serde_json::from_value(v).ok())
    }
}
