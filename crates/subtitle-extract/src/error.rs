//! Extraction error types and retry/permanence classification.

use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

impl ExtractError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Matches the spec's retriable set: forbidden, rate limit, timeout,
    /// connection/network errors, 403, 429.
    pub fn is_retryable(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("forbidden")
            || msg.contains("rate limit")
            || msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connection")
            || msg.contains("network")
            || msg.contains("403")
            || msg.contains("429")
    }

    /// "transcripts disabled" and "no transcript found" should propagate to
    /// the fallback engine rather than being retried via proxy.
    pub fn should_try_fallback(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("transcripts disabled") || msg.contains("no transcript found")
    }

    /// "video unavailable" is fatal: no retry, no fallback, no proxy.
    pub fn is_permanent_failure(&self) -> bool {
        let msg = self.to_string().to_lowercase();
        msg.contains("video unavailable")
            || msg.contains("video is unavailable")
            || msg.contains("video is private")
            || msg.contains("private video")
    }
}
