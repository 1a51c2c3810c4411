//! Cross-cutting HTTP middleware: CORS, security headers, request-id,
//! request logging, and the two-layer rate limit (an in-memory `governor`
//! pre-filter in front of the Tier-2-backed token bucket of record).
//!
//! Grounded directly on the teacher's `middleware.rs`: CORS/security-
//! headers/request-id/request-logging/client-IP-extraction are carried
//! close to verbatim. The rate-limit body is rewired to call
//! `subtitle_cache::RateLimiter` (spec §4.5) instead of relying on
//! `governor` alone, since this system's rate limiter of record must be
//! shared across processes and fail closed.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn, Span};
use uuid::Uuid;

use subtitle_models::keys;

use crate::error::ApiError;
use crate::state::AppState;

type GovernorRateLimiter =
    GovernorLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

const MAX_IP_LIMITER_ENTRIES: usize = 10_000;
const IP_LIMITER_ENTRY_TTL: Duration = Duration::from_secs(3600);

/// Coarse per-IP pre-filter: cheap, in-memory, and deliberately generous
/// relative to the Tier-2 bucket — it exists to absorb raw connection
/// floods before they ever reach Redis, not to enforce the documented
/// per-endpoint policy.
pub struct IpLimiterCache {
    limiters: RwLock<HashMap<IpAddr, (Arc<GovernorRateLimiter>, Instant)>>,
}

impl IpLimiterCache {
    pub fn new() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, ip: IpAddr) -> Arc<GovernorRateLimiter> {
        {
            let guard = self.limiters.read().await;
            if let Some((limiter, _)) = guard.get(&ip) {
                return limiter.clone();
            }
        }

        let quota = Quota::per_second(NonZeroU32::new(50).unwrap())
            .allow_burst(NonZeroU32::new(100).unwrap());
        let limiter = Arc::new(GovernorLimiter::direct(quota));

        let mut guard = self.limiters.write().await;
        self.cleanup_expired(&mut guard);
        guard.insert(ip, (limiter.clone(), Instant::now()));
        limiter
    }

    fn cleanup_expired(&self, guard: &mut HashMap<IpAddr, (Arc<GovernorRateLimiter>, Instant)>) {
        if guard.len() < MAX_IP_LIMITER_ENTRIES {
            return;
        }
        let now = Instant::now();
        guard.retain(|_, (_, inserted_at)| now.duration_since(*inserted_at) < IP_LIMITER_ENTRY_TTL);
    }

    async fn check(&self, ip: IpAddr) -> bool {
        self.get(ip).await.check().is_ok()
    }
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    if origins.iter().any(|o| o == "*") || origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect();
        layer
            .allow_origin(AllowOrigin::list(parsed))
            .allow_credentials(true)
    }
}

pub async fn security_headers(request: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert("X-API-Version", HeaderValue::from_static("v1"));
    response
}

pub async fn request_id(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", &request_id);
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }
    response
}

pub async fn request_logging(request: Request<axum::body::Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if path == "/health" || path == "/live" || path == "/status" {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        method = %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// X-Forwarded-For -> X-Real-IP -> `ConnectInfo` fallback chain.
pub fn extract_client_ip(
    headers: &axum::http::HeaderMap,
    connect_info: Option<IpAddr>,
) -> IpAddr {
    if let Some(forwarded) = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
    {
        return forwarded;
    }
    if let Some(real_ip) = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return real_ip;
    }
    connect_info.unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Two-layer rate limit: the `governor` pre-filter, then the Tier-2
/// token bucket of record (spec §4.5), keyed per (client_ip, endpoint).
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = extract_client_ip(request.headers(), Some(addr.ip()));

    if !state.ip_limiter.check(ip).await {
        warn!(%ip, "governor pre-filter rejected request");
        return Ok(rate_limited_response(1, 0));
    }

    let endpoint = request.uri().path();
    let key = keys::rate_key(&ip.to_string(), endpoint);
    let decision = state
        .rate_limiter
        .check(&key, state.config.rate_limit_rpm, state.config.rate_limit_burst, 1)
        .await;

    if !decision.allowed {
        return Ok(rate_limited_response(
            1,
            decision.reset_at.saturating_sub(now_secs()),
        ));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&state.config.rate_limit_rpm.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_at.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Policy",
        HeaderValue::from_str(&format!(
            "{};w=60;burst={}",
            state.config.rate_limit_rpm, state.config.rate_limit_burst
        ))
        .unwrap(),
    );
    Ok(response)
}

fn rate_limited_response(retry_after: u64, reset_at: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(serde_json::json!({
            "error": {
                "code": "RATE_LIMIT_EXCEEDED",
                "message": "rate limit exceeded",
                "meta": { "retry_after": retry_after, "reset_at": reset_at },
            }
        })),
    )
        .into_response();
    response.headers_mut().insert(
        "Retry-After",
        HeaderValue::from_str(&retry_after.to_string()).unwrap(),
    );
    response
        .headers_mut()
        .insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    response
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ip_prefers_forwarded_for() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("X-Forwarded-For", "1.2.3.4, 5.6.7.8".parse().unwrap());
        let ip = extract_client_ip(&headers, Some(IpAddr::from([9, 9, 9, 9])));
        assert_eq!(ip, IpAddr::from([1, 2, 3, 4]));
    }

    #[test]
    fn extract_ip_falls_back_to_connect_info() {
        let headers = axum::http::HeaderMap::new();
        let ip = extract_client_ip(&headers, Some(IpAddr::from([9, 9, 9, 9])));
        assert_eq!(ip, IpAddr::from([9, 9, 9, 9]));
    }
}
