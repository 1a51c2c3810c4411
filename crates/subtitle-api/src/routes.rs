//! Router assembly. Grounded on the teacher's `routes.rs`: the middleware
//! stack is layered metrics -> security-headers -> request-id ->
//! request-logging -> cors (innermost to outermost), then the state is
//! attached last.

use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{admin, health, subtitles};
use crate::middleware as app_middleware;
use crate::state::AppState;

pub fn build_router(state: AppState, prometheus: PrometheusHandle) -> Router {
    let cors = app_middleware::cors_layer(&state.config.cors_origins);

    let v1 = Router::new()
        .route("/subtitles", post(subtitles::submit))
        .route("/subtitles/batch", post(subtitles::submit_batch))
        .route("/subtitles/:video_id", get(subtitles::get_by_video_id))
        .route("/job/:job_id", get(subtitles::get_job))
        .route("/admin/cache/clear", post(admin::clear_cache))
        .route(
            "/admin/cache/clear/:video_id",
            delete(admin::clear_cache_for_video),
        )
        .route("/admin/queue/stats", get(admin::queue_stats))
        .route("/admin/rate-limit/stats/:ip", get(admin::rate_limit_stats))
        .route("/admin/rate-limit/reset/:ip", post(admin::rate_limit_reset))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit_middleware,
        ));

    let api = Router::new()
        .nest("/api/v1", v1)
        .fallback(deprecated_api_redirect);

    Router::new()
        .route("/health", get(health::health))
        .route("/live", get(health::live))
        .route("/status", get(health::status))
        .route("/metrics", get(move || render_metrics(prometheus.clone())))
        .merge(api)
        .layer(middleware::from_fn(app_middleware::request_logging))
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(middleware::from_fn(app_middleware::security_headers))
        .layer(middleware::from_fn(crate::metrics::metrics_middleware))
        .layer(cors)
        .with_state(state)
}

async fn render_metrics(handle: PrometheusHandle) -> Response {
    handle.render().into_response()
}

/// `/api/<path>` without `/v1/` -> 308 redirect to `/api/v1/<path>` with
/// the documented deprecation headers (spec.md §6).
async fn deprecated_api_redirect(uri: Uri) -> Response {
    let path = uri.path();
    let Some(rest) = path.strip_prefix("/api/").filter(|p| !p.starts_with("v1/") && *p != "v1") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let location = format!("/api/v1/{rest}");
    let mut response = Redirect::permanent(&location).into_response();
    let headers = response.headers_mut();
    headers.insert("X-API-Deprecation", "true".parse().unwrap());
    headers.insert("X-API-Version", "v1".parse().unwrap());
    response
}
