//! `/api/v1/subtitles*` and `/api/v1/job/{job_id}` handlers (spec.md §6).
//! Validation here is deliberately thin — video-ID/URL resolution and
//! webhook-URL shape checks only; everything else is delegated to the
//! orchestrator.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use subtitle_models::video_id::resolve_video_id;
use subtitle_models::VideoKey;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_BATCH_SIZE: usize = 100;
const DEFAULT_LANGUAGE: &str = "en";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_clean_for_ai() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SubtitleRequest {
    pub video_id: Option<String>,
    pub video_url: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_clean_for_ai")]
    pub clean_for_ai: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnqueuedResponse<'a> {
    job_id: String,
    status: &'static str,
    video_id: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
}

/// Resolve `video_id` or `video_url` into a validated 11-char ID.
fn resolve_request_video_id(req: &SubtitleRequest) -> Result<String, ApiError> {
    let candidate = req
        .video_id
        .as_deref()
        .or(req.video_url.as_deref())
        .ok_or_else(|| ApiError::validation("video_id or video_url is required"))?;

    resolve_video_id(candidate).map_err(|e| ApiError::InvalidVideoId(e.to_string()))
}

/// Reject webhook URLs whose scheme is not http/https or whose host is
/// empty (spec §4.10's submission-time validation rule).
fn validate_webhook_url(raw: &str) -> Result<(), ApiError> {
    let parsed = url::Url::parse(raw)
        .map_err(|_| ApiError::validation("webhook_url is not a valid URL"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::validation("webhook_url must use http or https"));
    }
    if parsed.host_str().unwrap_or("").is_empty() {
        return Err(ApiError::validation("webhook_url must have a non-empty host"));
    }
    Ok(())
}

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubtitleRequest>,
) -> Result<Response, ApiError> {
    let video_id = resolve_request_video_id(&req)?;
    if let Some(webhook_url) = &req.webhook_url {
        validate_webhook_url(webhook_url)?;
    }

    let key = VideoKey::new(video_id.clone(), req.language.clone());

    if let Some(cached) = state.orchestrator.get_cached(&key).await {
        return Ok((StatusCode::OK, Json(cached)).into_response());
    }

    let job_id = state
        .orchestrator
        .enqueue_extraction(&key, req.clean_for_ai, req.webhook_url.clone(), None)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            job_id,
            status: "queued",
            video_id: &video_id,
            language: &req.language,
            webhook_url: req.webhook_url.as_deref(),
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    #[serde(default = "default_language")]
    pub language: String,
}

pub async fn get_by_video_id(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> Result<Response, ApiError> {
    if !subtitle_models::video_id::is_valid_video_id(&video_id) {
        return Err(ApiError::InvalidVideoId(video_id));
    }

    let key = VideoKey::new(video_id, query.language);
    match state.orchestrator.get_cached(&key).await {
        Some(cached) => Ok((StatusCode::OK, Json(cached)).into_response()),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub video_ids: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_clean_for_ai")]
    pub clean_for_ai: bool,
    pub webhook_url: Option<String>,
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Response, ApiError> {
    if req.video_ids.is_empty() {
        return Err(ApiError::validation("video_ids must not be empty"));
    }
    if req.video_ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::validation(format!(
            "video_ids must not exceed {MAX_BATCH_SIZE} entries"
        )));
    }
    if let Some(webhook_url) = &req.webhook_url {
        validate_webhook_url(webhook_url)?;
    }

    for video_id in &req.video_ids {
        if !subtitle_models::video_id::is_valid_video_id(video_id) {
            return Err(ApiError::InvalidVideoId(video_id.clone()));
        }
    }

    let cached = state
        .orchestrator
        .get_cached_batch(&req.video_ids, &req.language)
        .await;

    let mut job_ids = Vec::new();
    for video_id in &req.video_ids {
        if cached.contains_key(video_id) {
            continue;
        }
        let key = VideoKey::new(video_id.clone(), req.language.clone());
        let job_id = state
            .orchestrator
            .enqueue_extraction(&key, req.clean_for_ai, req.webhook_url.clone(), None)
            .await?;
        job_ids.push(job_id);
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "queued",
            "video_count": req.video_ids.len(),
            "queued_count": job_ids.len(),
            "cached_count": cached.len(),
            "job_ids": job_ids,
            "cached": cached.into_values().collect::<Vec<_>>(),
        })),
    )
        .into_response())
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.queue.fetch(&job_id).await? {
        Some(record) => Ok((
            StatusCode::OK,
            Json(json!({
                "job_id": record.job_id,
                "status": record.status,
                "enqueued_at": record.enqueued_at,
                "ended_at": record.ended_at,
                "result": record.result,
                "exc_info": record.exc_info,
            })),
        )
            .into_response()),
        None => Ok((
            StatusCode::OK,
            Json(json!({ "job_id": job_id, "status": "not_found" })),
        )
            .into_response()),
    }
}
