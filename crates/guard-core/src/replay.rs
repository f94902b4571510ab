//! Idempotent response replay.
//!
//! A side-effecting handler stores its result under `scope:idempotency_key`;
//! a retry carrying the same key within the TTL gets the stored result back
//! instead of running the side effect again.
//!
//! Expiry is enforced twice: lookups treat an entry at or past `expires_at`
//! as absent and delete it, and the janitor physically removes entries that
//! nobody looked up once they are past a grace period.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

const SECS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Longest TTL a replay entry keeps; larger values are capped.
pub const MAX_REPLAY_TTL: Duration = Duration::from_secs(100 * SECS_PER_YEAR);

/// A stored response, in one of the two shapes handlers produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayPayload {
    /// JSON API result.
    Json {
        status: u16,
        body: serde_json::Value,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// Redirect issued after a form post.
    Redirect { status: u16, location: String },
}

impl ReplayPayload {
    /// JSON payload with `content-type: application/json` fixed.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        ReplayPayload::Json {
            status,
            body,
            headers,
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        ReplayPayload::Redirect {
            status,
            location: location.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReplayPayload::Json { .. } => "json",
            ReplayPayload::Redirect { .. } => "redirect",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReplayEntry {
    pub(crate) payload: ReplayPayload,
    pub(crate) expires_at: Instant,
}

/// Replay entries for every `scope:key` pair.
#[derive(Debug, Default)]
pub struct ReplayCache {
    entries: DashMap<String, ReplayEntry>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` until `now + ttl`, replacing any previous entry.
    /// TTLs beyond [`MAX_REPLAY_TTL`] are capped to it.
    pub fn insert(&self, key: &str, payload: ReplayPayload, ttl: Duration, now: Instant) {
        let ttl = ttl.min(MAX_REPLAY_TTL);
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(Duration::from_secs(SECS_PER_YEAR)))
            .unwrap_or(now);
        debug!(
            replay_key = %key,
            kind = payload.kind(),
            ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            "Stored replay entry"
        );
        self.entries.insert(
            key.to_string(),
            ReplayEntry {
                payload,
                expires_at,
            },
        );
    }

    /// Live payload for `key`, deleting it if it has expired.
    pub fn lookup(&self, key: &str, now: Instant) -> Option<ReplayPayload> {
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Some(entry.payload.clone());
            }
        }

        // Re-checked under the write lock so a concurrent fresh insert survives.
        if self
            .entries
            .remove_if(key, |_, entry| now >= entry.expires_at)
            .is_some()
        {
            debug!(replay_key = %key, "Expired replay entry removed on lookup");
        }
        None
    }

    /// Drop entries more than `grace` past their expiry. Returns how many
    /// were removed.
    pub fn sweep(&self, now: Instant, grace: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.expires_at) <= grace);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = ReplayPayload::json(200, json!({"score": 3}));
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["kind"], "json");
        assert_eq!(value["status"], 200);
        assert_eq!(value["body"]["score"], 3);
        assert_eq!(value["headers"]["content-type"], "application/json");

        let redirect = serde_json::to_value(ReplayPayload::redirect(303, "/quiz/1")).unwrap();
        assert_eq!(redirect, json!({"kind": "redirect", "status": 303, "location": "/quiz/1"}));
    }

    #[test]
    fn test_lookup_returns_payload_until_expiry() {
        let cache = ReplayCache::new();
        let now = Instant::now();
        let payload = ReplayPayload::json(201, json!({"id": 7}));

        cache.insert("quiz:k", payload.clone(), Duration::from_millis(500), now);

        assert_eq!(
            cache.lookup("quiz:k", now + Duration::from_millis(499)),
            Some(payload)
        );
        assert_eq!(cache.lookup("quiz:k", now + Duration::from_millis(500)), None);
        assert!(cache.is_empty(), "expired entry should be deleted on lookup");
    }

    #[test]
    fn test_insert_overwrites_unconditionally() {
        let cache = ReplayCache::new();
        let now = Instant::now();

        cache.insert("s:k", ReplayPayload::redirect(303, "/a"), Duration::from_secs(5), now);
        cache.insert("s:k", ReplayPayload::redirect(303, "/b"), Duration::from_secs(5), now);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup("s:k", now),
            Some(ReplayPayload::redirect(303, "/b"))
        );
    }

    #[test]
    fn test_oversized_ttl_is_capped_not_dropped() {
        let cache = ReplayCache::new();
        let now = Instant::now();
        let payload = ReplayPayload::redirect(303, "/done");

        cache.insert("s:k", payload.clone(), Duration::MAX, now);

        assert_eq!(cache.lookup("s:k", now), Some(payload.clone()));
        assert_eq!(
            cache.lookup("s:k", now + Duration::from_secs(10 * SECS_PER_YEAR)),
            Some(payload)
        );
    }

    #[test]
    fn test_sweep_honors_grace_period() {
        let cache = ReplayCache::new();
        let now = Instant::now();
        let grace = Duration::from_secs(120);

        cache.insert("a", ReplayPayload::redirect(303, "/"), Duration::from_secs(1), now);
        cache.insert("b", ReplayPayload::redirect(303, "/"), Duration::from_secs(100), now);

        // "a" expired 120s ago exactly: still within grace.
        assert_eq!(cache.sweep(now + Duration::from_secs(121), grace), 0);
        assert_eq!(cache.sweep(now + Duration::from_secs(122), grace), 1);
        assert_eq!(cache.len(), 1);
    }
}
