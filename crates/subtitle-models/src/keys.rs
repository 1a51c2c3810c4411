//! Cache-key, lock-key, rate-limit-key, and proxy-id derivation.
//!
//! Pure functions only; no I/O. Mirrors the fingerprinting style used
//! throughout the corpus for deterministic ID derivation (hash-then-slice).

use md5::Md5;
use sha2::{Digest, Sha256};

/// `youtube:subtitle:<video_id>[:<language>]`
pub fn cache_key(video_id: &str, language: &str) -> String {
    format!("youtube:subtitle:{}:{}", video_id, language)
}

/// `youtube:subtitle:<video_id>` with no language suffix, used for
/// video-scoped (not language-scoped) pattern operations.
pub fn cache_key_prefix(video_id: &str) -> String {
    format!("youtube:subtitle:{}", video_id)
}

/// `lock:<cache_key>`
pub fn lock_key(cache_key: &str) -> String {
    format!("lock:{}", cache_key)
}

/// `ratelimit:<ip>:<hex8(md5(endpoint))>`
pub fn rate_key(client_ip: &str, endpoint: &str) -> String {
    let digest = Md5::digest(endpoint.as_bytes());
    let hex8 = hex::encode(&digest[..4]);
    format!("ratelimit:{}:{}", client_ip, hex8)
}

/// `hex16(sha256(url))` — stable identity for a proxy URL.
pub fn proxy_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// `proxy:fails:<proxy_id>`
pub fn proxy_failures_key(proxy_id: &str) -> String {
    format!("proxy:fails:{}", proxy_id)
}

/// `proxy:last_failure:<proxy_id>`
pub fn proxy_last_failure_key(proxy_id: &str) -> String {
    format!("proxy:last_failure:{}", proxy_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_format() {
        assert_eq!(
            cache_key("dQw4w9WgXcQ", "en"),
            "youtube:subtitle:dQw4w9WgXcQ:en"
        );
    }

    #[test]
    fn lock_key_wraps_cache_key() {
        let ck = cache_key("dQw4w9WgXcQ", "en");
        assert_eq!(lock_key(&ck), "lock:youtube:subtitle:dQw4w9WgXcQ:en");
    }

    #[test]
    fn rate_key_is_deterministic() {
        let a = rate_key("1.2.3.4", "/api/v1/subtitles");
        let b = rate_key("1.2.3.4", "/api/v1/subtitles");
        assert_eq!(a, b);
        assert!(a.starts_with("ratelimit:1.2.3.4:"));
        assert_eq!(a.len(), "ratelimit:1.2.3.4:".len() + 8);
    }

    #[test]
    fn proxy_id_is_16_hex_chars() {
        let id = proxy_id("http://proxy.example.com:8080");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
