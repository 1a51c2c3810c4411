//! Liveness/readiness/version endpoints (spec.md §6). Not part of the
//! core subsystems — kept thin and dependency-checking only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    let redis_ok = redis_reachable(&state).await;
    let postgres_ok = sqlx::query("SELECT 1")
        .execute(state.repo.pool())
        .await
        .is_ok();

    let status = if redis_ok && postgres_ok { "ok" } else { "degraded" };
    let code = if redis_ok && postgres_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "components": {
                "redis": if redis_ok { "ok" } else { "unavailable" },
                "postgres": if postgres_ok { "ok" } else { "unavailable" },
            },
            "memory_cache": {
                "size": state.memory.size(),
                "hit_rate": state.memory.hit_rate(),
            },
        })),
    )
        .into_response()
}

/// `get` swallows transport errors and returns `None` on both miss and
/// failure, so a direct probe write/delete pair is the only reliable way
/// to confirm Redis reachability rather than reasoning from `get` alone.
async fn redis_reachable(state: &AppState) -> bool {
    state
        .shared
        .set("health:probe", &true, std::time::Duration::from_secs(5))
        .await;
    state.shared.get("health:probe").await.is_some()
}

pub async fn live() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

pub async fn status() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "service": "subtitle-api",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}
