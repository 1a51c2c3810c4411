//! Tier-3 durable store repository (spec §4.4).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Pool, Row};
use uuid::Uuid;

use subtitle_models::{
    ExtractionJob, ExtractionMethod, ExtractionStatus, JobStatus, Segment, SubtitleRecord,
    VideoKey, WebhookDeliveryStatus, RECORD_TTL_DAYS,
};

use crate::error::{DbError, DbResult};

#[derive(Clone)]
pub struct Repository {
    pool: Pool<Postgres>,
}

impl Repository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    // ---------------------------------------------------------------
    // Subtitle records
    // ---------------------------------------------------------------

    pub async fn find_subtitle(&self, video_key: &VideoKey) -> DbResult<Option<SubtitleRecord>> {
        let row = sqlx::query(
            "SELECT id, video_id, language, title, duration_seconds, segments, plain_text, \
             extraction_method, extraction_duration_ms, extraction_status, extraction_error, \
             proxy_used, checksum, created_at, updated_at, expires_at \
             FROM subtitle_records WHERE video_id = $1 AND language = $2",
        )
        .bind(&video_key.video_id)
        .bind(&video_key.language)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_subtitle).transpose()
    }

    /// Atomic create-or-update keyed by the unique (video_id, language)
    /// pair. Every upsert refreshes `expires_at = now + 30d`.
    pub async fn upsert_subtitle(&self, record: &SubtitleRecord) -> DbResult<()> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(RECORD_TTL_DAYS);
        let segments_json = serde_json::to_value(&record.segments)?;
        let method = record.extraction_method.map(method_to_str);
        let status = status_to_str(record.extraction_status);

        sqlx::query(
            "INSERT INTO subtitle_records \
             (id, video_id, language, title, duration_seconds, segments, plain_text, \
              extraction_method, extraction_duration_ms, extraction_status, extraction_error, \
              proxy_used, checksum, created_at, updated_at, expires_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16) \
             ON CONFLICT (video_id, language) DO UPDATE SET \
               title = EXCLUDED.title, \
               duration_seconds = EXCLUDED.duration_seconds, \
               segments = EXCLUDED.segments, \
               plain_text = EXCLUDED.plain_text, \
               extraction_method = EXCLUDED.extraction_method, \
               extraction_duration_ms = EXCLUDED.extraction_duration_ms, \
               extraction_status = EXCLUDED.extraction_status, \
               extraction_error = EXCLUDED.extraction_error, \
               proxy_used = EXCLUDED.proxy_used, \
               checksum = EXCLUDED.checksum, \
               updated_at = EXCLUDED.updated_at, \
               expires_at = EXCLUDED.expires_at",
        )
        .bind(Uuid::new_v4())
        .bind(&record.video_key.video_id)
        .bind(&record.video_key.language)
        .bind(&record.title)
        .bind(record.duration_seconds)
        .bind(segments_json)
        .bind(&record.plain_text)
        .bind(method)
        .bind(record.extraction_duration_ms)
        .bind(status)
        .bind(&record.extraction_error)
        .bind(&record.proxy_used)
        .bind(&record.checksum)
        .bind(now)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Truncates the error to the model's persisted limit before storing.
    pub async fn mark_subtitle_failed(
        &self,
        video_key: &VideoKey,
        method: ExtractionMethod,
        error: &str,
    ) -> DbResult<()> {
        let truncated = SubtitleRecord::truncate_error(error);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO subtitle_records \
             (id, video_id, language, segments, plain_text, extraction_method, \
              extraction_status, extraction_error, created_at, updated_at, expires_at) \
             VALUES ($1,$2,$3,'[]'::jsonb,'',$4,$5,$6,$7,$7,$8) \
             ON CONFLICT (video_id, language) DO UPDATE SET \
               extraction_method = EXCLUDED.extraction_method, \
               extraction_status = EXCLUDED.extraction_status, \
               extraction_error = EXCLUDED.extraction_error, \
               updated_at = EXCLUDED.updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&video_key.video_id)
        .bind(&video_key.language)
        .bind(method_to_str(method))
        .bind(status_to_str(ExtractionStatus::Failed))
        .bind(&truncated)
        .bind(now)
        .bind(now + chrono::Duration::days(RECORD_TTL_DAYS))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn clear_subtitles(&self, video_id: Option<&str>) -> DbResult<u64> {
        let result = match video_id {
            Some(id) => {
                sqlx::query("DELETE FROM subtitle_records WHERE video_id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM subtitle_records")
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    // ---------------------------------------------------------------
    // Extraction jobs
    // ---------------------------------------------------------------

    /// Most-recent job with status in {queued, processing}, backed by the
    /// composite index on (video_id, language, job_status).
    pub async fn find_pending_job(&self, video_key: &VideoKey) -> DbResult<Option<ExtractionJob>> {
        let row = sqlx::query(
            "SELECT id, video_id, language, job_id, job_status, result, error, webhook_url, \
             webhook_delivered, webhook_delivery_status, webhook_delivery_error, created_at, \
             started_at, completed_at, duration_seconds, attempt, max_attempts \
             FROM extraction_jobs \
             WHERE video_id = $1 AND language = $2 AND job_status IN ('queued', 'processing') \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(&video_key.video_id)
        .bind(&video_key.language)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_job).transpose()
    }

    pub async fn create_job(
        &self,
        video_key: &VideoKey,
        queue_job_id: &str,
        webhook_url: Option<&str>,
    ) -> DbResult<ExtractionJob> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO extraction_jobs \
             (id, video_id, language, job_id, job_status, webhook_url, webhook_delivered, \
              created_at, attempt, max_attempts) \
             VALUES ($1,$2,$3,$4,'queued',$5,false,$6,0,3)",
        )
        .bind(id)
        .bind(&video_key.video_id)
        .bind(&video_key.language)
        .bind(queue_job_id)
        .bind(webhook_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let mut job = ExtractionJob::new(
            video_key.clone(),
            queue_job_id.to_string(),
            webhook_url.map(str::to_string),
        );
        job.id = id;
        job.created_at = now;
        Ok(job)
    }

    pub async fn get_job(&self, queue_job_id: &str) -> DbResult<Option<ExtractionJob>> {
        let row = sqlx::query(
            "SELECT id, video_id, language, job_id, job_status, result, error, webhook_url, \
             webhook_delivered, webhook_delivery_status, webhook_delivery_error, created_at, \
             started_at, completed_at, duration_seconds, attempt, max_attempts \
             FROM extraction_jobs WHERE job_id = $1",
        )
        .bind(queue_job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_job).transpose()
    }

    /// Monotonic status transition. Stamps `started_at` on first entry to
    /// `processing`, and `completed_at` + `duration_seconds` on entry to
    /// any terminal state.
    pub async fn update_job_status(
        &self,
        queue_job_id: &str,
        status: JobStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let status_str = job_status_to_str(status);

        let existing = sqlx::query(
            "SELECT created_at, started_at FROM extraction_jobs WHERE job_id = $1",
        )
        .bind(queue_job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        let started_at: Option<DateTime<Utc>> = existing.try_get("started_at")?;
        let created_at: DateTime<Utc> = existing.try_get("created_at")?;

        let new_started_at = if status == JobStatus::Processing && started_at.is_none() {
            Some(now)
        } else {
            started_at
        };

        let (completed_at, duration_seconds) = if status.is_terminal() {
            let basis = new_started_at.unwrap_or(created_at);
            (
                Some(now),
                Some((now - basis).num_milliseconds() as f64 / 1000.0),
            )
        } else {
            (None, None)
        };

        sqlx::query(
            "UPDATE extraction_jobs SET job_status = $1, result = $2, error = $3, \
             started_at = COALESCE($4, started_at), \
             completed_at = COALESCE($5, completed_at), \
             duration_seconds = COALESCE($6, duration_seconds) \
             WHERE job_id = $7",
        )
        .bind(status_str)
        .bind(result)
        .bind(error)
        .bind(new_started_at)
        .bind(completed_at)
        .bind(duration_seconds)
        .bind(queue_job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_webhook_delivery(
        &self,
        queue_job_id: &str,
        delivered: bool,
        status: WebhookDeliveryStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE extraction_jobs SET webhook_delivered = $1, webhook_delivery_status = $2, \
             webhook_delivery_error = $3 WHERE job_id = $4",
        )
        .bind(delivered)
        .bind(webhook_status_to_str(status))
        .bind(error)
        .bind(queue_job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Jobs with a non-null `webhook_url`, `webhook_delivered = false`, and
    /// a terminal job status, ordered by `completed_at` ascending.
    pub async fn list_pending_webhook_jobs(&self, limit: i64) -> DbResult<Vec<ExtractionJob>> {
        let rows = sqlx::query(
            "SELECT id, video_id, language, job_id, job_status, result, error, webhook_url, \
             webhook_delivered, webhook_delivery_status, webhook_delivery_error, created_at, \
             started_at, completed_at, duration_seconds, attempt, max_attempts \
             FROM extraction_jobs \
             WHERE webhook_url IS NOT NULL AND webhook_delivered = false \
               AND job_status IN ('completed', 'failed', 'timeout', 'stale') \
             ORDER BY completed_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_job).collect()
    }
}

fn method_to_str(m: ExtractionMethod) -> &'static str {
    match m {
        ExtractionMethod::Primary => "primary",
        ExtractionMethod::Fallback => "fallback",
    }
}

fn str_to_method(s: &str) -> Option<ExtractionMethod> {
    match s {
        "primary" => Some(ExtractionMethod::Primary),
        "fallback" => Some(ExtractionMethod::Fallback),
        _ => None,
    }
}

fn status_to_str(s: ExtractionStatus) -> &'static str {
    match s {
        ExtractionStatus::Pending => "pending",
        ExtractionStatus::Success => "success",
        ExtractionStatus::Failed => "failed",
    }
}

fn str_to_status(s: &str) -> ExtractionStatus {
    match s {
        "success" => ExtractionStatus::Success,
        "failed" => ExtractionStatus::Failed,
        _ => ExtractionStatus::Pending,
    }
}

fn job_status_to_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Timeout => "timeout",
        JobStatus::Stale => "stale",
    }
}

fn str_to_job_status(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "timeout" => JobStatus::Timeout,
        "stale" => JobStatus::Stale,
        _ => JobStatus::Queued,
    }
}

fn webhook_status_to_str(s: WebhookDeliveryStatus) -> &'static str {
    match s {
        WebhookDeliveryStatus::Pending => "pending",
        WebhookDeliveryStatus::Delivered => "delivered",
        WebhookDeliveryStatus::Failed => "failed",
    }
}

fn str_to_webhook_status(s: &str) -> Option<WebhookDeliveryStatus> {
    match s {
        "pending" => Some(WebhookDeliveryStatus::Pending),
        "delivered" => Some(WebhookDeliveryStatus::Delivered),
        "failed" => Some(WebhookDeliveryStatus::Failed),
        _ => None,
    }
}

fn row_to_subtitle(row: PgRow) -> DbResult<SubtitleRecord> {
    let segments_value: Value = row.try_get("segments")?;
    let segments: Vec<Segment> = serde_json::from_value(segments_value)?;
    let method_str: Option<String> = row.try_get("extraction_method")?;
    let status_str: String = row.try_get("extraction_status")?;

    Ok(SubtitleRecord {
        id: row.try_get("id")?,
        video_key: VideoKey::new(
            row.try_get::<String, _>("video_id")?,
            row.try_get::<String, _>("language")?,
        ),
        title: row.try_get("title")?,
        duration_seconds: row.try_get("duration_seconds")?,
        segments,
        plain_text: row.try_get("plain_text")?,
        extraction_method: method_str.as_deref().and_then(str_to_method),
        extraction_duration_ms: row.try_get("extraction_duration_ms")?,
        extraction_status: str_to_status(&status_str),
        extraction_error: row.try_get("extraction_error")?,
        proxy_used: row.try_get("proxy_used")?,
        checksum: row.try_get("checksum")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn row_to_job(row: PgRow) -> DbResult<ExtractionJob> {
    let status_str: String = row.try_get("job_status")?;
    let webhook_status_str: Option<String> = row.try_get("webhook_delivery_status")?;

    Ok(ExtractionJob {
        id: row.try_get("id")?,
        video_key: VideoKey::new(
            row.try_get::<String, _>("video_id")?,
            row.try_get::<String, _>("language")?,
        ),
        job_id: row.try_get("job_id")?,
        status: str_to_job_status(&status_str),
        result: row.try_get("result")?,
        error: row.try_get("error")?,
        webhook_url: row.try_get("webhook_url")?,
        webhook_delivered: row.try_get("webhook_delivered")?,
        webhook_delivery_status: webhook_status_str.as_deref().and_then(str_to_webhook_status),
        webhook_delivery_error: row.try_get("webhook_delivery_error")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        attempt: row.try_get("attempt")?,
        max_attempts: row.try_get("max_attempts")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Timeout,
            JobStatus::Stale,
        ] {
            assert_eq!(str_to_job_status(job_status_to_str(s)), s);
        }
    }

    #[test]
    fn extraction_method_round_trips() {
        assert_eq!(
            str_to_method(method_to_str(ExtractionMethod::Primary)),
            Some(ExtractionMethod::Primary)
        );
        assert_eq!(
            str_to_method(method_to_str(ExtractionMethod::Fallback)),
            Some(ExtractionMethod::Fallback)
        );
    }

    #[test]
    fn webhook_status_round_trips() {
        for s in [
            WebhookDeliveryStatus::Pending,
            WebhookDeliveryStatus::Delivered,
            WebhookDeliveryStatus::Failed,
        ] {
            assert_eq!(str_to_webhook_status(webhook_status_to_str(s)), Some(s));
        }
    }
}
