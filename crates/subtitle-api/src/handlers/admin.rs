//! Admin surface (spec.md §6): cache purge, queue stats, rate-limit
//! inspection/reset. Every handler here requires `AdminUser`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use subtitle_models::{keys, VideoKey};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    #[serde(default)]
    pub purge_db: bool,
}

pub async fn clear_cache(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PurgeQuery>,
) -> Result<Response, ApiError> {
    state.memory.clear();
    state.shared.delete_pattern("youtube:subtitle:*").await;

    let deleted_db_records = if query.purge_db {
        state.repo.clear_subtitles(None).await?
    } else {
        0
    };

    Ok(Json(json!({
        "status": "ok",
        "deleted_db_records": deleted_db_records,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ClearOneQuery {
    #[serde(default)]
    pub language: Option<String>,
}

pub async fn clear_cache_for_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(video_id): Path<String>,
    Query(query): Query<ClearOneQuery>,
) -> Result<Response, ApiError> {
    match &query.language {
        Some(language) => {
            let key = VideoKey::new(video_id.clone(), language.clone());
            state.memory.delete(&key.cache_key());
            state.shared.delete(&key.cache_key()).await;
        }
        None => {
            state
                .shared
                .delete_pattern(&format!("{}*", keys::cache_key_prefix(&video_id)))
                .await;
        }
    }

    Ok(Json(json!({ "status": "ok", "video_id": video_id })).into_response())
}

pub async fn queue_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Response, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats).into_response())
}

pub async fn rate_limit_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ip): Path<String>,
) -> Result<Response, ApiError> {
    let key = keys::rate_key(&ip, "/api/v1/subtitles");
    let decision = state
        .rate_limiter
        .check(&key, state.config.rate_limit_rpm, state.config.rate_limit_burst, 0)
        .await;

    Ok(Json(json!({
        "ip": ip,
        "remaining": decision.remaining,
        "reset_at": decision.reset_at,
    }))
    .into_response())
}

pub async fn rate_limit_reset(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ip): Path<String>,
) -> Result<Response, ApiError> {
    let key = keys::rate_key(&ip, "/api/v1/subtitles");
    state.shared.delete(&key).await;
    Ok(Json(json!({ "status": "ok", "ip": ip })).into_response())
}
