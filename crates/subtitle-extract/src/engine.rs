//! Transcript engines. The specific upstream transcript services these
//! wrap are treated as opaque HTTP endpoints here — only the retry/proxy
//! orchestration and payload shapes the spec names are implemented.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ExtractError, ExtractResult};

#[derive(Debug, Clone)]
pub struct RawSegment {
    pub start_sec: f64,
    pub duration_sec: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RawTranscript {
    pub title: Option<String>,
    pub segments: Vec<RawSegment>,
}

#[async_trait]
pub trait TranscriptEngine: Send + Sync {
    /// Fetch a raw (unnormalized) transcript. `proxy_url` is `None` for a
    /// direct attempt.
    async fn fetch(
        &self,
        video_id: &str,
        language: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> ExtractResult<RawTranscript>;
}

fn build_client(proxy_url: Option<&str>, timeout: Duration) -> ExtractResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(url) = proxy_url {
        let proxy = reqwest::Proxy::all(url).map_err(ExtractError::Request)?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(ExtractError::Request)
}

/// Primary engine: a direct transcript API returning a flat list of
/// timestamped cues.
pub struct PrimaryEngine {
    base_url: String,
}

impl PrimaryEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrimaryCue {
    start_sec: f64,
    duration_sec: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct PrimaryResponse {
    title: Option<String>,
    cues: Vec<PrimaryCue>,
}

#[async_trait]
impl TranscriptEngine for PrimaryEngine {
    async fn fetch(
        &self,
        video_id: &str,
        language: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> ExtractResult<RawTranscript> {
        let client = build_client(proxy_url, timeout)?;
        let url = format!("{}/transcripts/{video_id}", self.base_url);

        let response = client
            .get(&url)
            .query(&[("lang", language)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(ExtractError::engine("forbidden"));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExtractError::engine("rate limit exceeded (429)"));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::engine(format!(
                "primary engine returned {status}: {body}"
            )));
        }

        let parsed: PrimaryResponse = response.json().await?;
        if parsed.cues.is_empty() {
            return Err(ExtractError::engine("no transcript found"));
        }

        Ok(RawTranscript {
            title: parsed.title,
            segments: parsed
                .cues
                .into_iter()
                .map(|c| RawSegment {
                    start_sec: c.start_sec,
                    duration_sec: c.duration_sec,
                    text: c.text,
                })
                .collect(),
        })
    }
}

/// Fallback engine: downloader-based, returning JSON3-shaped caption
/// events (`tStartMs`, `dDurationMs`, `segs[].utf8`).
pub struct FallbackEngine {
    base_url: String,
}

impl FallbackEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    utf8: String,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(default)]
    #[serde(rename = "tStartMs")]
    t_start_ms: f64,
    #[serde(default)]
    #[serde(rename = "dDurationMs")]
    d_duration_ms: f64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Response {
    title: Option<String>,
    events: Vec<Json3Event>,
}

#[async_trait]
impl TranscriptEngine for FallbackEngine {
    async fn fetch(
        &self,
        video_id: &str,
        language: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> ExtractResult<RawTranscript> {
        let client = build_client(proxy_url, timeout)?;
        let url = format!("{}/captions/{video_id}", self.base_url);

        let response = client
            .get(&url)
            .query(&[("lang", language), ("fmt", "json3")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(ExtractError::engine("forbidden"));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExtractError::engine("rate limit exceeded (429)"));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ExtractError::engine("no transcript found"));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(ExtractError::engine(format!(
                "fallback engine returned {status}"
            )));
        }

        let parsed: Json3Response = response.json().await?;

        let segments: Vec<RawSegment> = parsed
            .events
            .into_iter()
            .filter_map(|e| {
                let text: String = e
                    .segs
                    .iter()
                    .map(|s| s.utf8.replace('\n', " "))
                    .collect::<Vec<_>>()
                    .join("")
                    .trim()
                    .to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(RawSegment {
                        start_sec: e.t_start_ms / 1000.0,
                        duration_sec: e.d_duration_ms / 1000.0,
                        text,
                    })
                }
            })
            .collect();

        if segments.is_empty() {
            return Err(ExtractError::engine("no transcript found"));
        }

        Ok(RawTranscript {
            title: parsed.title,
            segments,
        })
    }
}
