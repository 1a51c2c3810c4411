//! Signed webhook delivery (spec §4.10). HMAC construction grounded on
//! `vclip-storage/src/delivery.rs::DeliveryToken::sign`/`verify`; delivery
//! retry loop grounded on `vclip-worker/src/retry.rs`, reshaped to this
//! crate's [`retry::retry_async`] with the webhook-specific backoff curve.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use subtitle_db::Repository;
use subtitle_models::WebhookDeliveryStatus;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, webhook_backoff};

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookNotifier {
    client: reqwest::Client,
    secret: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl WebhookNotifier {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret: config.webhook_secret.clone(),
            timeout: config.webhook_timeout,
            max_retries: config.webhook_max_retries,
        }
    }

    /// Build, sign, and deliver the `job.completed` payload, then record
    /// the terminal delivery outcome via `repo.update_webhook_delivery`.
    pub async fn notify(
        &self,
        repo: &Repository,
        job_id: &str,
        video_id: &str,
        webhook_url: &str,
        result: Option<&Value>,
        error: Option<&str>,
    ) {
        let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let payload = build_payload(job_id, video_id, result, error, &timestamp);
        let canonical = canonical_json(&payload);
        let signature = self.secret.as_deref().map(|secret| sign(secret, &canonical, &timestamp));

        let outcome = retry_async(
            self.max_retries,
            webhook_backoff,
            |_: &WorkerError| false,
            "webhook_delivery",
            |_attempt| self.attempt_delivery(webhook_url, &payload, &timestamp, signature.as_deref()),
        )
        .await;

        match outcome {
            crate::retry::RetryResult::Success(()) => {
                info!(job_id, "webhook delivered");
                let _ = repo
                    .update_webhook_delivery(job_id, true, WebhookDeliveryStatus::Delivered, None)
                    .await;
            }
            crate::retry::RetryResult::Failed { error, attempts } => {
                warn!(job_id, attempts, "webhook delivery exhausted retries: {error}");
                let _ = repo
                    .update_webhook_delivery(
                        job_id,
                        true,
                        WebhookDeliveryStatus::Failed,
                        Some(&error.to_string()),
                    )
                    .await;
            }
        }
    }

    async fn attempt_delivery(
        &self,
        webhook_url: &str,
        payload: &Value,
        timestamp: &str,
        signature: Option<&str>,
    ) -> WorkerResult<()> {
        let mut request = self
            .client
            .post(webhook_url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("User-Agent", "YouTube-Subtitle-API/1.0")
            .header("X-Webhook-Timestamp", timestamp);

        if let Some(sig) = signature {
            request = request.header("X-Webhook-Signature", format!("sha256={sig}"));
        }

        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| WorkerError::webhook(format!("request error: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(WorkerError::webhook(format!(
                "non-2xx response: {}",
                response.status()
            )))
        }
    }
}

fn build_payload(
    job_id: &str,
    video_id: &str,
    result: Option<&Value>,
    error: Option<&str>,
    timestamp: &str,
) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("event".into(), Value::String("job.completed".into()));
    map.insert("job_id".into(), Value::String(job_id.to_string()));
    map.insert("video_id".into(), Value::String(video_id.to_string()));
    map.insert(
        "status".into(),
        Value::String(if error.is_some() { "failed" } else { "success" }.to_string()),
    );
    if let Some(r) = result {
        map.insert("result".into(), r.clone());
    }
    if let Some(e) = error {
        map.insert("error".into(), Value::String(e.to_string()));
    }
    map.insert("timestamp".into(), Value::String(timestamp.to_string()));
    Value::Object(map)
}

/// Sorted-keys, no-space JSON serialization of the payload.
fn canonical_json(payload: &Value) -> String {
    let Value::Object(map) = payload else {
        return payload.to_string();
    };
    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn sign(secret: &str, canonical_json: &str, timestamp: &str) -> String {
    let signing_input = format!("{canonical_json}.{timestamp}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification, for symmetry with the signer (used by
/// integration tests and any future inbound-verification surface).
pub fn verify(secret: &str, canonical_json: &str, timestamp: &str, signature_hex: &str) -> bool {
    let expected = sign(secret, canonical_json, timestamp);
    let (Ok(expected_bytes), Ok(given_bytes)) = (hex::decode(&expected), hex::decode(signature_hex))
    else {
        return false;
    };
    expected_bytes.ct_eq(&given_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys() {
        let payload = build_payload("job-1", "dQw4w9WgXcQ", None, Some("boom"), "2024-01-01T00:00:00Z");
        let json = canonical_json(&payload);
        let event_pos = json.find("\"error\"").unwrap();
        let status_pos = json.find("\"status\"").unwrap();
        assert!(event_pos < status_pos, "keys must be sorted alphabetically");
        assert!(!json.contains(": "), "canonical json must have no spaces");
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let secret = "test-secret";
        let payload = build_payload("job-1", "dQw4w9WgXcQ", Some(&serde_json::json!({"ok": true})), None, "2024-01-01T00:00:00Z");
        let canonical = canonical_json(&payload);
        let sig = sign(secret, &canonical, "2024-01-01T00:00:00Z");
        assert!(verify(secret, &canonical, "2024-01-01T00:00:00Z", &sig));
        assert!(!verify("wrong-secret", &canonical, "2024-01-01T00:00:00Z", &sig));
    }

    #[test]
    fn success_payload_omits_error_failed_omits_result() {
        let success = build_payload("j", "v", Some(&serde_json::json!({"a": 1})), None, "t");
        assert_eq!(success["status"], "success");
        assert!(success.get("error").is_none());

        let failed = build_payload("j", "v", None, Some("bad"), "t");
        assert_eq!(failed["status"], "failed");
        assert!(failed.get("result").is_none());
    }
}
