//! Extraction job pipeline (spec §4.8): `queued -> processing ->
//! {completed|failed|timeout}`, dual-engine extraction behind the outer
//! per-attempt retry policy, cache write-through, then webhook delivery.
//! `stale` is not a transition this pipeline makes — that happens in the
//! API orchestrator's `enqueue_extraction` path, before a job ever reaches
//! a worker.

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use subtitle_cache::SharedCache;
use subtitle_db::Repository;
use subtitle_extract::{extract, Extracted, ProxyPool};
use subtitle_models::{CachedSubtitle, ExtractionMethod, JobStatus, Segment, SubtitleRecord, VideoKey};
use subtitle_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::notifier::WebhookNotifier;
use crate::retry::{extraction_backoff, retry_async, RetryResult};

pub struct Pipeline<'a> {
    pub config: &'a WorkerConfig,
    pub shared: &'a SharedCache,
    pub repo: &'a Repository,
    pub queue: &'a JobQueue,
    pub proxy_pool: &'a ProxyPool,
    pub primary: &'a (dyn subtitle_extract::TranscriptEngine),
    pub fallback: &'a (dyn subtitle_extract::TranscriptEngine),
    pub notifier: &'a WebhookNotifier,
}

impl<'a> Pipeline<'a> {
    /// Run one extraction job to completion. `queue_job_id` is the opaque
    /// id assigned by `subtitle_queue::JobQueue::enqueue`.
    pub async fn run(
        &self,
        queue_job_id: &str,
        video_id: &str,
        language: &str,
        clean_for_ai: bool,
        webhook_url: Option<&str>,
    ) {
        let key = VideoKey::new(video_id, language);

        if let Err(e) = self.queue.mark_started(queue_job_id).await {
            warn!(queue_job_id, "failed to mark queue job started: {e}");
        }

        if let Err(e) = self
            .repo
            .update_job_status(queue_job_id, JobStatus::Processing, None, None)
            .await
        {
            error!(queue_job_id, "failed to mark job processing: {e}");
            return;
        }

        let job_deadline = self.config.extraction_timeout + Duration::from_secs(10);
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            job_deadline,
            self.extract_with_retries(video_id, language, clean_for_ai),
        )
        .await;
        let extraction_duration_ms = started.elapsed().as_millis() as i64;

        let (status, result, error_msg) = match outcome {
            Err(_) => {
                warn!(queue_job_id, "job exceeded its overall timeout");
                (JobStatus::Timeout, None, Some("job exceeded timeout".to_string()))
            }
            Ok(RetryResult::Success(extracted)) => {
                if let Err(e) = self
                    .persist_success(&key, &extracted, extraction_duration_ms)
                    .await
                {
                    error!(queue_job_id, "failed to persist successful extraction: {e}");
                    (JobStatus::Failed, None, Some(e.to_string()))
                } else {
                    let result = success_result_json(&extracted);
                    (JobStatus::Completed, Some(result), None)
                }
            }
            Ok(RetryResult::Failed { error, .. }) => {
                let message = error.to_string();
                let _ = self
                    .repo
                    .mark_subtitle_failed(&key, ExtractionMethod::Primary, &message)
                    .await;
                (JobStatus::Failed, None, Some(message))
            }
        };

        info!(queue_job_id, status = ?status, "job reached terminal state");

        if let Err(e) = self
            .repo
            .update_job_status(queue_job_id, status, result.as_ref(), error_msg.as_deref())
            .await
        {
            error!(queue_job_id, "failed to record terminal job status: {e}");
        }

        let queue_outcome = match (&result, &error_msg) {
            (Some(r), _) => self.queue.mark_finished(queue_job_id, r).await,
            (None, msg) => {
                self.queue
                    .mark_failed(queue_job_id, msg.as_deref().unwrap_or("extraction failed"))
                    .await
            }
        };
        if let Err(e) = queue_outcome {
            error!(queue_job_id, "failed to record terminal queue status: {e}");
        }

        if let Some(webhook_url) = webhook_url {
            self.notifier
                .notify(
                    self.repo,
                    queue_job_id,
                    video_id,
                    webhook_url,
                    result.as_ref(),
                    error_msg.as_deref(),
                )
                .await;
        }
    }

    async fn extract_with_retries(
        &self,
        video_id: &str,
        language: &str,
        clean_for_ai: bool,
    ) -> RetryResult<Extracted, subtitle_extract::ExtractError> {
        retry_async(
            self.config.retry_max_attempts,
            extraction_backoff,
            |e: &subtitle_extract::ExtractError| e.is_permanent_failure(),
            "extraction",
            |_attempt| {
                extract(
                    video_id,
                    language,
                    clean_for_ai,
                    self.config.extraction_timeout,
                    self.proxy_pool,
                    self.primary,
                    self.fallback,
                )
            },
        )
        .await
    }

    async fn persist_success(
        &self,
        key: &VideoKey,
        extracted: &Extracted,
        extraction_duration_ms: i64,
    ) -> WorkerResult<()> {
        let record = SubtitleRecord::new_success(
            key.clone(),
            extracted.title.clone(),
            None,
            extracted.segments.clone(),
            extracted.plain_text.clone(),
            extracted.method,
            extraction_duration_ms,
            extracted.proxy_used.clone(),
        );
        self.repo.upsert_subtitle(&record).await?;
        let cached = CachedSubtitle::from_record(&record, "postgres");
        self.shared
            .set(&key.cache_key(), &cached, self.config.result_ttl)
            .await;
        Ok(())
    }
}

fn success_result_json(extracted: &Extracted) -> Value {
    serde_json::json!({
        "title": extracted.title,
        "subtitles": extracted.segments.iter().map(segment_json).collect::<Vec<_>>(),
        "plain_text": extracted.plain_text,
        "extraction_method": extracted.method,
        "proxy_used": extracted.proxy_used,
    })
}

fn segment_json(segment: &Segment) -> Value {
    serde_json::json!({
        "start_sec": segment.start_sec,
        "duration_sec": segment.duration_sec,
        "text": segment.text,
    })
}
