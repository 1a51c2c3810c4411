//! Dual-engine extraction orchestration (spec §4.7): direct-first,
//! proxy on retriable failure, primary before fallback.

use std::time::Duration;

use subtitle_models::{ExtractionMethod, Segment};

use crate::engine::TranscriptEngine;
use crate::error::{ExtractError, ExtractResult};
use crate::normalize::{build_plain_text, clean_segment_text};
use crate::proxy_pool::ProxyPool;

#[derive(Debug, Clone)]
pub struct Extracted {
    pub video_id: String,
    pub language: String,
    pub title: Option<String>,
    pub segments: Vec<Segment>,
    pub plain_text: String,
    pub method: ExtractionMethod,
    pub proxy_used: Option<String>,
}

pub async fn extract(
    video_id: &str,
    language: &str,
    clean_for_ai: bool,
    timeout: Duration,
    proxy_pool: &ProxyPool,
    primary: &dyn TranscriptEngine,
    fallback: &dyn TranscriptEngine,
) -> ExtractResult<Extracted> {
    let build = |raw: crate::engine::RawTranscript, method, proxy_used: Option<String>| {
        build_extracted(video_id, language, raw, method, proxy_used, clean_for_ai)
    };

    // 1. Primary, direct.
    let mut last_err = match primary.fetch(video_id, language, None, timeout).await {
        Ok(raw) => return Ok(build(raw, ExtractionMethod::Primary, None)),
        Err(e) if e.is_permanent_failure() => return Err(e),
        Err(e) => e,
    };

    // 2. Primary via proxy, if the failure is retriable and not one that
    // should instead fall straight through to the fallback engine.
    if last_err.is_retryable() && !last_err.should_try_fallback() {
        if let Some(proxy) = proxy_pool.choose().await {
            match primary.fetch(video_id, language, Some(&proxy.connect_url), timeout).await {
                Ok(raw) => {
                    proxy_pool.mark_success(&proxy.id).await;
                    return Ok(build(raw, ExtractionMethod::Primary, Some(proxy.id)));
                }
                Err(e) => {
                    proxy_pool.mark_failure(&proxy.id).await;
                    if e.is_permanent_failure() {
                        return Err(e);
                    }
                    last_err = e;
                }
            }
        }
    }

    // 3. Fallback, direct.
    last_err = match fallback.fetch(video_id, language, None, timeout).await {
        Ok(raw) => return Ok(build(raw, ExtractionMethod::Fallback, None)),
        Err(e) if e.is_permanent_failure() => return Err(e),
        Err(e) => e,
    };

    // 4. Fallback via proxy.
    if last_err.is_retryable() && !last_err.should_try_fallback() {
        if let Some(proxy) = proxy_pool.choose().await {
            match fallback.fetch(video_id, language, Some(&proxy.connect_url), timeout).await {
                Ok(raw) => {
                    proxy_pool.mark_success(&proxy.id).await;
                    return Ok(build(raw, ExtractionMethod::Fallback, Some(proxy.id)));
                }
                Err(e) => {
                    proxy_pool.mark_failure(&proxy.id).await;
                    last_err = e;
                }
            }
        }
    }

    // 5. Exhausted.
    Err(ExtractError::failed(format!(
        "extraction failed: {last_err}"
    )))
}

fn build_extracted(
    video_id: &str,
    language: &str,
    raw: crate::engine::RawTranscript,
    method: ExtractionMethod,
    proxy_used: Option<String>,
    clean_for_ai: bool,
) -> Extracted {
    let mut segments = Vec::with_capacity(raw.segments.len());
    let mut cleaned_texts = Vec::with_capacity(raw.segments.len());

    for seg in raw.segments {
        let text = if clean_for_ai {
            match clean_segment_text(&seg.text) {
                Some(t) => t,
                None => continue,
            }
        } else {
            seg.text.trim().to_string()
        };
        if text.is_empty() {
            continue;
        }
        cleaned_texts.push(text.clone());
        segments.push(Segment {
            start_sec: seg.start_sec,
            duration_sec: seg.duration_sec,
            text,
        });
    }

    let plain_text = if clean_for_ai {
        build_plain_text(&cleaned_texts)
    } else {
        cleaned_texts.join(" ")
    };

    Extracted {
        video_id: video_id.to_string(),
        language: language.to_string(),
        title: raw.title,
        segments,
        plain_text,
        method,
        proxy_used,
    }
}
