//! Authentication gate (spec §4.11): admin endpoints require a valid
//! bearer JWT (HS256) or a matching API key. Fails closed with 500 when
//! neither secret is configured.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub exp: i64,
}

/// Marker extractor: presence means the request passed the admin gate.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub subject: String,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_admin_auth(parts, state).map(|subject| AdminUser { subject })
    }
}

fn check_admin_auth(parts: &Parts, state: &AppState) -> Result<String, ApiError> {
    let jwt_secret = state.config.jwt_secret.as_deref();
    let api_key = state.config.api_key.as_deref();

    if jwt_secret.is_none() && api_key.is_none() {
        return Err(ApiError::AuthNotConfigured);
    }

    if let Some(secret) = jwt_secret {
        if let Some(token) = bearer_token(parts) {
            return verify_jwt(&token, secret);
        }
    }

    if let Some(configured_key) = api_key {
        let header_name = state.config.api_key_header_name.as_str();
        if let Some(presented) = parts
            .headers
            .get(header_name)
            .and_then(|v| v.to_str().ok())
        {
            if constant_time_eq(presented, configured_key) {
                return Ok("api-key".to_string());
            }
        }
    }

    Err(ApiError::Unauthorized)
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn verify_jwt(token: &str, secret: &str) -> Result<String, ApiError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let data = decode::<AdminClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| ApiError::Unauthorized)?;

    if data.claims.exp < Utc::now().timestamp() {
        return Err(ApiError::Unauthorized);
    }

    Ok(data.claims.sub)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("secret", "secret"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatch() {
        assert!(!constant_time_eq("secret", "wrong"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq("short", "much-longer-string"));
    }

    #[test]
    fn expired_jwt_is_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = AdminClaims {
            sub: "admin".to_string(),
            exp: Utc::now().timestamp() - 10,
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"topsecret"),
        )
        .unwrap();

        assert!(verify_jwt(&token, "topsecret").is_err());
    }

    #[test]
    fn valid_jwt_is_accepted() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = AdminClaims {
            sub: "admin".to_string(),
            exp: Utc::now().timestamp() + 3600,
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"topsecret"),
        )
        .unwrap();

        assert_eq!(verify_jwt(&token, "topsecret").unwrap(), "admin");
    }
}
