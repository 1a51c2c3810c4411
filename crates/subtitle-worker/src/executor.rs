//! Job executor. Grounded on `vclip-worker/src/executor.rs`: a semaphore
//! bounds concurrent jobs, a periodic task reclaims pending messages
//! abandoned by a crashed consumer, and shutdown drains in-flight jobs
//! before the process exits. Unlike the teacher, a finished job has no
//! dedup key to clear — `subtitle-queue::JobQueue` carries no dedup
//! concept, since at-most-one-in-flight (I1) is already enforced upstream
//! by the API orchestrator's durable `find_pending_job` + `is_alive` check.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use subtitle_cache::SharedCache;
use subtitle_db::Repository;
use subtitle_extract::{ProxyPool, TranscriptEngine};
use subtitle_queue::{JobQueue, QueueItem};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::notifier::WebhookNotifier;
use crate::pipeline::Pipeline;

/// Every resource a job needs that outlives any single job: shared across
/// concurrently-running jobs via `Arc`, never mutated once built.
pub struct ExecutionContext {
    pub config: WorkerConfig,
    pub shared: SharedCache,
    pub repo: Repository,
    pub proxy_pool: ProxyPool,
    pub primary: Box<dyn TranscriptEngine>,
    pub fallback: Box<dyn TranscriptEngine>,
    pub notifier: WebhookNotifier,
}

pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<ExecutionContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(queue: JobQueue, ctx: ExecutionContext) -> Self {
        let config = ctx.config.clone();
        let job_semaphore = Arc::new(Semaphore::new(config.concurrency));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("subtitle-worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            concurrency = self.config.concurrency,
            "starting job executor"
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        let queue_clone = Arc::clone(&self.queue);
        let ctx_clone = Arc::clone(&self.ctx);
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, 1_800_000, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!(count = jobs.len(), "claimed pending jobs");
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) = semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("failed to claim pending jobs: {e}"),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("error consuming jobs: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(Duration::from_secs(60), self.wait_for_jobs()).await;

        info!("job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self.queue.consume(&self.consumer_name, 1000, available.min(5)).await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!(count = jobs.len(), "consumed jobs from queue");

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Run one job and report the outcome back to the queue (ack, or
    /// retry-until-DLQ). The job's own terminal status (completed/failed/
    /// timeout) is recorded by `Pipeline::run` against the durable store
    /// regardless of what happens here.
    async fn execute_job(
        ctx: Arc<ExecutionContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: QueueItem,
    ) {
        let job_id = job.job_id.clone();
        info!(job_id = %job_id, "executing job");

        match Self::parse_kwargs(&job.kwargs) {
            Ok((video_id, language, clean_for_ai)) => {
                let webhook_url = ctx
                    .repo
                    .get_job(&job_id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|j| j.webhook_url);

                let pipeline = Pipeline {
                    config: &ctx.config,
                    shared: &ctx.shared,
                    repo: &ctx.repo,
                    queue: queue.as_ref(),
                    proxy_pool: &ctx.proxy_pool,
                    primary: ctx.primary.as_ref(),
                    fallback: ctx.fallback.as_ref(),
                    notifier: &ctx.notifier,
                };
                pipeline
                    .run(&job_id, &video_id, &language, clean_for_ai, webhook_url.as_deref())
                    .await;

                if let Err(e) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, "failed to ack job: {e}");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "malformed job kwargs: {e}");
                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                if retry_count >= queue.max_retries() {
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!(job_id = %job_id, "failed to move job to DLQ: {dlq_err}");
                    }
                } else {
                    warn!(job_id = %job_id, retry_count, "job will be retried");
                }
            }
        }
    }

    fn parse_kwargs(kwargs: &Value) -> WorkerResult<(String, String, bool)> {
        let video_id = kwargs
            .get("video_id")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::job_failed("kwargs missing video_id"))?
            .to_string();
        let language = kwargs
            .get("language")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::job_failed("kwargs missing language"))?
            .to_string();
        let clean_for_ai = kwargs
            .get("clean_for_ai")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok((video_id, language, clean_for_ai))
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.concurrency {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kwargs_extracts_fields() {
        let kwargs = serde_json::json!({
            "video_id": "dQw4w9WgXcQ",
            "language": "en",
            "clean_for_ai": true,
        });
        let (video_id, language, clean_for_ai) = JobExecutor::parse_kwargs(&kwargs).unwrap();
        assert_eq!(video_id, "dQw4w9WgXcQ");
        assert_eq!(language, "en");
        assert!(clean_for_ai);
    }

    #[test]
    fn parse_kwargs_defaults_clean_for_ai() {
        let kwargs = serde_json::json!({"video_id": "abc", "language": "en"});
        let (_, _, clean_for_ai) = JobExecutor::parse_kwargs(&kwargs).unwrap();
        assert!(!clean_for_ai);
    }

    #[test]
    fn parse_kwargs_rejects_missing_video_id() {
        let kwargs = serde_json::json!({"language": "en"});
        assert!(JobExecutor::parse_kwargs(&kwargs).is_err());
    }
}
