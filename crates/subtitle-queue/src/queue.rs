//! RQ-like job queue over Redis. The wire mechanics (stream, consumer
//! group, DLQ, claim-pending) follow the teacher's Redis Streams queue;
//! they're wrapped behind the simpler `enqueue`/`fetch`/`stats` contract
//! consumers actually need.

use chrono::Utc;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{EnqueueOptions, JobRecord, QueueItem, QueueJobStatus, QueueStats};

fn job_key(job_id: &str) -> String {
    format!("subtitle:job:{job_id}")
}

pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Create the consumer group if it doesn't already exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a unit of work; returns the opaque job_id.
    pub async fn enqueue(
        &self,
        func_ref: &str,
        kwargs: Value,
        opts: EnqueueOptions,
    ) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let job_id = Uuid::new_v4().to_string();
        let item = QueueItem {
            job_id: job_id.clone(),
            func_ref: func_ref.to_string(),
            kwargs: kwargs.clone(),
        };
        let payload = serde_json::to_string(&item)?;
        let now = Utc::now();

        let key = job_key(&job_id);
        let _: () = redis::pipe()
            .hset(&key, "status", QueueJobStatus::Queued.as_str())
            .hset(&key, "func_ref", func_ref)
            .hset(&key, "kwargs", kwargs.to_string())
            .hset(&key, "enqueued_at", now.to_rfc3339())
            .hset(&key, "result_ttl_secs", opts.result_ttl_secs)
            .hset(&key, "default_timeout_secs", opts.default_timeout_secs)
            .expire(&key, opts.result_ttl_secs as i64)
            .query_async(&mut conn)
            .await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job_id")
            .arg(&job_id)
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job_id, message_id = %message_id, func_ref, "enqueued job");
        Ok(job_id)
    }

    /// Like `enqueue`, but the item becomes runnable only after `delay`.
    pub async fn enqueue_with_delay(
        &self,
        func_ref: &str,
        kwargs: Value,
        opts: EnqueueOptions,
        delay: std::time::Duration,
    ) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let job_id = Uuid::new_v4().to_string();
        let item = QueueItem {
            job_id: job_id.clone(),
            func_ref: func_ref.to_string(),
            kwargs: kwargs.clone(),
        };
        let payload = serde_json::to_string(&item)?;
        let now = Utc::now();
        let visible_at = now.timestamp() as u64 + delay.as_secs();

        let key = job_key(&job_id);
        let _: () = redis::pipe()
            .hset(&key, "status", QueueJobStatus::Scheduled.as_str())
            .hset(&key, "func_ref", func_ref)
            .hset(&key, "kwargs", kwargs.to_string())
            .hset(&key, "enqueued_at", now.to_rfc3339())
            .hset(&key, "result_ttl_secs", opts.result_ttl_secs)
            .hset(&key, "default_timeout_secs", opts.default_timeout_secs)
            .expire(&key, opts.result_ttl_secs as i64)
            .query_async(&mut conn)
            .await?;

        redis::cmd("ZADD")
            .arg(&self.config.scheduled_key)
            .arg(visible_at)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        self.bump_stat("scheduled").await.ok();
        info!(job_id = %job_id, visible_at, "scheduled job with delay");
        Ok(job_id)
    }

    /// Move due scheduled jobs onto the main stream. Returns the count moved.
    pub async fn process_scheduled_jobs(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now = Utc::now().timestamp();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.scheduled_key)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let mut moved = 0;
        for payload in &due {
            if let Ok(item) = serde_json::from_str::<QueueItem>(payload) {
                let key = job_key(&item.job_id);
                redis::cmd("HSET")
                    .arg(&key)
                    .arg("status")
                    .arg(QueueJobStatus::Queued.as_str())
                    .query_async::<()>(&mut conn)
                    .await
                    .ok();

                redis::cmd("XADD")
                    .arg(&self.config.stream_name)
                    .arg("*")
                    .arg("job_id")
                    .arg(&item.job_id)
                    .arg("job")
                    .arg(payload)
                    .query_async::<String>(&mut conn)
                    .await
                    .ok();
                moved += 1;
            } else {
                warn!("failed to parse scheduled job payload");
            }

            redis::cmd("ZREM")
                .arg(&self.config.scheduled_key)
                .arg(payload)
                .query_async::<()>(&mut conn)
                .await
                .ok();
        }

        if moved > 0 {
            info!(count = moved, "moved scheduled jobs to main queue");
        }
        Ok(moved)
    }

    /// Fetch the current job-status record, or `None` if it has expired or
    /// never existed.
    pub async fn fetch(&self, job_id: &str) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = job_key(job_id);

        let fields: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status = fields
            .get("status")
            .and_then(|s| QueueJobStatus::from_str(s))
            .unwrap_or(QueueJobStatus::Queued);
        let kwargs: Value = fields
            .get("kwargs")
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null);
        let result: Option<Value> = fields.get("result").and_then(|s| serde_json::from_str(s).ok());

        Ok(Some(JobRecord {
            job_id: job_id.to_string(),
            status,
            func_ref: fields.get("func_ref").cloned().unwrap_or_default(),
            kwargs,
            enqueued_at: fields
                .get("enqueued_at")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            started_at: fields
                .get("started_at")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            ended_at: fields
                .get("ended_at")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            result,
            exc_info: fields.get("exc_info").cloned(),
        }))
    }

    /// Whether the queue still knows about this job (used by the
    /// orchestrator's stale-job check before trusting a durable
    /// `find_pending_job` hit).
    pub async fn is_alive(&self, job_id: &str) -> QueueResult<bool> {
        Ok(self.fetch(job_id).await?.is_some_and(|r| {
            matches!(
                r.status,
                QueueJobStatus::Queued | QueueJobStatus::Started | QueueJobStatus::Scheduled
            )
        }))
    }

    pub async fn mark_started(&self, job_id: &str) -> QueueResult<()> {
        self.set_status(job_id, QueueJobStatus::Started, None, None).await?;
        self.bump_stat("started").await.ok();
        Ok(())
    }

    pub async fn mark_finished(&self, job_id: &str, result: &Value) -> QueueResult<()> {
        self.set_status(job_id, QueueJobStatus::Finished, Some(result), None)
            .await
    }

    pub async fn mark_failed(&self, job_id: &str, exc_info: &str) -> QueueResult<()> {
        self.set_status(job_id, QueueJobStatus::Failed, None, Some(exc_info))
            .await?;
        self.bump_stat("failed").await.ok();
        Ok(())
    }

    pub async fn mark_deferred(&self, job_id: &str) -> QueueResult<()> {
        self.set_status(job_id, QueueJobStatus::Deferred, None, None).await?;
        self.bump_stat("deferred").await.ok();
        Ok(())
    }

    async fn set_status(
        &self,
        job_id: &str,
        status: QueueJobStatus,
        result: Option<&Value>,
        exc_info: Option<&str>,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = job_key(job_id);
        let now = Utc::now();

        let mut pipe = redis::pipe();
        pipe.hset(&key, "status", status.as_str());
        if status == QueueJobStatus::Started {
            pipe.hset(&key, "started_at", now.to_rfc3339());
        }
        if matches!(status, QueueJobStatus::Finished | QueueJobStatus::Failed) {
            pipe.hset(&key, "ended_at", now.to_rfc3339());
        }
        if let Some(r) = result {
            pipe.hset(&key, "result", r.to_string());
        }
        if let Some(e) = exc_info {
            pipe.hset(&key, "exc_info", e);
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn bump_stat(&self, field: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.hincr::<_, _, _, ()>("subtitle:queue:stats", field, 1).await?;
        Ok(())
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let depth: u64 = conn.xlen(&self.config.stream_name).await?;
        let counters: std::collections::HashMap<String, u64> =
            conn.hgetall("subtitle:queue:stats").await?;

        Ok(QueueStats {
            queue_name: self.config.stream_name.clone(),
            depth,
            started: counters.get("started").copied().unwrap_or(0),
            failed: counters.get("failed").copied().unwrap_or(0),
            deferred: counters.get("deferred").copied().unwrap_or(0),
            scheduled: counters.get("scheduled").copied().unwrap_or(0),
        })
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    // ---------------------------------------------------------------
    // Worker-facing stream mechanics
    // ---------------------------------------------------------------

    /// Consume new messages from the stream on behalf of `consumer_name`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueItem)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<QueueItem>(&payload_str) {
                        Ok(item) => items.push((message_id, item)),
                        Err(e) => {
                            warn!("failed to parse job payload: {e}");
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }
        Ok(items)
    }

    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn dlq(&self, message_id: &str, item: &QueueItem, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(item)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;
        self.mark_failed(&item.job_id, error).await.ok();
        warn!(job_id = %item.job_id, "moved job to DLQ: {error}");
        Ok(())
    }

    /// Reclaim messages idle for longer than `min_idle_ms` (crashed
    /// worker recovery).
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueItem)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending_details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut message_ids_to_claim = Vec::new();
        for detail in pending_details {
            if detail.len() >= 4 {
                if let (
                    Some(redis::Value::BulkString(id_bytes)),
                    Some(redis::Value::Int(idle_ms)),
                ) = (detail.get(0), detail.get(2))
                {
                    if *idle_ms as u64 >= min_idle_ms {
                        if let Ok(id) = String::from_utf8(id_bytes.clone()) {
                            message_ids_to_claim.push(id);
                        }
                    }
                }
            }
        }

        if message_ids_to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for id in &message_ids_to_claim {
            cmd.arg(id);
        }

        let claimed: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;
        let mut items = Vec::new();
        for message in claimed {
            if message.len() < 2 {
                continue;
            }
            let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Array(fields))) =
                (message.get(0), message.get(1))
            else {
                continue;
            };
            let Ok(message_id) = String::from_utf8(id_bytes.clone()) else {
                continue;
            };

            let mut payload: Option<String> = None;
            let mut i = 0;
            while i + 1 < fields.len() {
                if let (
                    Some(redis::Value::BulkString(field_bytes)),
                    Some(redis::Value::BulkString(value_bytes)),
                ) = (fields.get(i), fields.get(i + 1))
                {
                    if field_bytes == b"job" {
                        payload = String::from_utf8(value_bytes.clone()).ok();
                        break;
                    }
                }
                i += 2;
            }

            if let Some(payload) = payload {
                match serde_json::from_str::<QueueItem>(&payload) {
                    Ok(item) => items.push((message_id, item)),
                    Err(e) => {
                        warn!("failed to parse claimed job payload: {e}");
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }
        Ok(items)
    }

    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("subtitle:retry:{message_id}");
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86_400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}
