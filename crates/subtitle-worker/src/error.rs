//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("extraction error: {0}")]
    Extract(#[from] subtitle_extract::ExtractError),

    #[error("cache error: {0}")]
    Cache(#[from] subtitle_cache::CacheError),

    #[error("database error: {0}")]
    Db(#[from] subtitle_db::DbError),

    #[error("queue error: {0}")]
    Queue(#[from] subtitle_queue::QueueError),

    #[error("webhook delivery error: {0}")]
    Webhook(String),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn webhook(msg: impl Into<String>) -> Self {
        Self::Webhook(msg.into())
    }
}
