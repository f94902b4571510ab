//! Idempotency key extraction.
//!
//! Clients mark a retryable request with an `Idempotency-Key` header (or the
//! older `X-Idempotency-Key`). Values are trimmed; empty or oversized keys
//! are ignored, so the request simply runs without replay protection.

use axum::http::HeaderMap;
use tracing::debug;

/// Longest accepted key, in bytes.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

const IDEMPOTENCY_HEADERS: [&str; 2] = ["idempotency-key", "x-idempotency-key"];

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    for name in IDEMPOTENCY_HEADERS {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if value.len() > MAX_IDEMPOTENCY_KEY_LEN {
            debug!(header = name, len = value.len(), "Ignoring oversized idempotency key");
            return None;
        }
        return Some(value.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_reads_standard_header_first() {
        let mut headers = HeaderMap::new();
        headers.insert("x-idempotency-key", HeaderValue::from_static("legacy"));
        headers.insert("idempotency-key", HeaderValue::from_static(" 8e0f-42 "));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("8e0f-42"));
    }

    #[test]
    fn test_falls_back_to_legacy_header() {
        let mut headers = HeaderMap::new();
        headers.insert("idempotency-key", HeaderValue::from_static("   "));
        headers.insert("x-idempotency-key", HeaderValue::from_static("legacy"));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("legacy"));
    }

    #[test]
    fn test_rejects_oversized_key() {
        let mut headers = HeaderMap::new();
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        headers.insert("idempotency-key", HeaderValue::from_str(&long).unwrap());
        assert_eq!(idempotency_key(&headers), None);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(idempotency_key(&HeaderMap::new()), None);
    }
}
