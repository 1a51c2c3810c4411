//! Prometheus metrics (SPEC_FULL.md §2 item 15). Grounded on the teacher's
//! `metrics.rs`: a `names` module of string constants, a `sanitize_path`
//! label-cardinality guard via `regex_lite`, and a request-timing
//! middleware.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "subtitle_http_requests_total";
    pub const HTTP_REQUEST_DURATION: &str = "subtitle_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "subtitle_http_requests_in_flight";
    pub const QUEUE_DEPTH: &str = "subtitle_queue_depth";
    pub const DLQ_DEPTH: &str = "subtitle_dlq_depth";
    pub const JOB_ENQUEUED_TOTAL: &str = "subtitle_job_enqueued_total";
    pub const JOB_COMPLETED_TOTAL: &str = "subtitle_job_completed_total";
    pub const JOB_FAILED_TOTAL: &str = "subtitle_job_failed_total";
    pub const RATE_LIMIT_HIT_TOTAL: &str = "subtitle_rate_limit_hit_total";
    pub const EXTRACTION_ATTEMPT_TOTAL: &str = "subtitle_extraction_attempt_total";
    pub const EXTRACTION_FAILURE_TOTAL: &str = "subtitle_extraction_failure_total";
    pub const WEBHOOK_DELIVERY_TOTAL: &str = "subtitle_webhook_delivery_total";
    pub const CACHE_HIT_TOTAL: &str = "subtitle_cache_hit_total";
    pub const CACHE_MISS_TOTAL: &str = "subtitle_cache_miss_total";
}

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .unwrap()
    })
}

fn numeric_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d+").unwrap())
}

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/subtitles/[A-Za-z0-9_-]{11}").unwrap())
}

fn job_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/job/[^/]+").unwrap())
}

/// Collapse high-cardinality path segments (UUIDs, numeric IDs, video
/// IDs, job IDs) to fixed placeholders so the `path` label doesn't blow
/// up Prometheus cardinality.
pub fn sanitize_path(path: &str) -> String {
    let path = uuid_re().replace_all(path, ":id");
    let path = numeric_segment_re().replace_all(&path, "/:id");
    let path = video_id_re().replace_all(&path, "/subtitles/:video_id");
    let path = job_id_re().replace_all(&path, "/job/:job_id");
    path.into_owned()
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| sanitize_path(request.uri().path()));
    let method = request.method().to_string();

    metrics::gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    let status = response.status().as_u16().to_string();
    metrics::counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(
        names::HTTP_REQUEST_DURATION,
        "method" => method,
        "path" => path,
    )
    .record(start.elapsed().as_secs_f64());

    response
}

pub fn record_rate_limit_hit(endpoint: &str) {
    metrics::counter!(names::RATE_LIMIT_HIT_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_job_enqueued() {
    metrics::counter!(names::JOB_ENQUEUED_TOTAL).increment(1);
}

pub fn set_queue_length(depth: u64) {
    metrics::gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn set_dlq_length(depth: u64) {
    metrics::gauge!(names::DLQ_DEPTH).set(depth as f64);
}

pub fn record_cache_hit(tier: &str) {
    metrics::counter!(names::CACHE_HIT_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_cache_miss() {
    metrics::counter!(names::CACHE_MISS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/v1/subtitles/dQw4w9WgXcQ"),
            "/api/v1/subtitles/:video_id"
        );
        assert_eq!(
            sanitize_path("/api/v1/job/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/job/:job_id"
        );
        assert_eq!(sanitize_path("/api/v1/admin/rate-limit/stats/42"), "/api/v1/admin/rate-limit/stats/:id");
    }
}
