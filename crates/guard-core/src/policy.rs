//! The request-policy store object.
//!
//! [`RequestPolicy`] owns one limiter, one replay cache and the janitor that
//! bounds them. It is cheap to clone: clones share the same stores, so a
//! single instance can be handed to every request handler. Tests build their
//! own isolated instance with a `ManualClock`.

use crate::clock::{Clock, SystemClock};
use crate::config::{GuardConfig, RateLimitOptions};
use crate::janitor::{StoreJanitor, SweepReport};
use crate::replay::{ReplayCache, ReplayPayload};
use crate::window::{RateLimitDecision, SlidingWindowLimiter};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct RequestPolicy {
    config: Arc<GuardConfig>,
    clock: Arc<dyn Clock>,
    limiter: Arc<SlidingWindowLimiter>,
    replays: Arc<ReplayCache>,
    janitor: Arc<StoreJanitor>,
}

impl Clone for RequestPolicy {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
            limiter: Arc::clone(&self.limiter),
            replays: Arc::clone(&self.replays),
            janitor: Arc::clone(&self.janitor),
        }
    }
}

impl std::fmt::Debug for RequestPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPolicy")
            .field("config", &self.config)
            .field("tracked_windows", &self.limiter.len())
            .field("cached_replays", &self.replays.len())
            .finish()
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl RequestPolicy {
    pub fn new(config: GuardConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a policy with an explicit time source. The config is sanitized.
    pub fn with_clock(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.sanitized();
        let janitor = StoreJanitor::new(
            config.cleanup_interval,
            config.rate_limit_stale,
            config.replay_stale,
        );
        Self {
            config: Arc::new(config),
            clock,
            limiter: Arc::new(SlidingWindowLimiter::new()),
            replays: Arc::new(ReplayCache::new()),
            janitor: Arc::new(janitor),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// May this client proceed under `scope`?
    ///
    /// Distinct scopes and distinct clients never share a counter. Never
    /// fails: unusable options fall back to the configured defaults.
    pub fn check_rate_limit(
        &self,
        scope: &str,
        client_id: &str,
        options: RateLimitOptions,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        self.janitor.cleanup_stores(now, &self.limiter, &self.replays);

        let (window, max_requests) = options.resolve(&self.config);
        self.limiter
            .check(&store_key(scope, client_id), window, max_requests, now)
    }

    /// Live replay payload for `key` under `scope`, if any.
    pub fn get_replay(&self, scope: &str, key: &str) -> Option<ReplayPayload> {
        let payload = self
            .replays
            .lookup(&store_key(scope, key), self.clock.now());
        if payload.is_some() {
            debug!(scope = %scope, "Replay cache hit");
        }
        payload
    }

    /// Store `payload` for `ttl` (default TTL when `None` or zero).
    ///
    /// Last write wins; callers store once per logical side effect.
    pub fn set_replay(
        &self,
        scope: &str,
        key: &str,
        payload: ReplayPayload,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.config.default_replay_ttl);
        self.replays
            .insert(&store_key(scope, key), payload, ttl, self.clock.now());
    }

    /// Cache a JSON API result with `content-type: application/json`.
    pub fn cache_api_response(
        &self,
        scope: &str,
        key: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        self.cleanup_stores();
        self.set_replay(scope, key, ReplayPayload::json(status, body), None);
    }

    /// Cache a redirect result.
    pub fn cache_redirect_response(
        &self,
        scope: &str,
        key: &str,
        status: u16,
        location: impl Into<String>,
    ) {
        self.cleanup_stores();
        self.set_replay(scope, key, ReplayPayload::redirect(status, location), None);
    }

    /// Run the janitor if its interval has elapsed.
    pub fn cleanup_stores(&self) -> Option<SweepReport> {
        self.janitor
            .cleanup_stores(self.clock.now(), &self.limiter, &self.replays)
    }

    pub fn tracked_windows(&self) -> usize {
        self.limiter.len()
    }

    pub fn cached_replays(&self) -> usize {
        self.replays.len()
    }
}

/// Joins `scope` and `key` with `:`. Neither part is escaped, so scopes
/// must not be a colon-separated prefix of one another (`api` and
/// `api:quiz`), or `api` + `quiz:k` and `api:quiz` + `k` share an entry.
fn store_key(scope: &str, key: &str) -> String {
    format!("{}:{}", scope, key)
}
