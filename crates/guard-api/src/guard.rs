//! Header-aware facade over [`RequestPolicy`].
//!
//! Handlers hold a [`RequestGuard`] (usually in router state) and call it
//! with the request headers; the guard derives the client identifier and
//! delegates to the shared stores.
//!
//! ```rust,ignore
//! async fn submit(State(guard): State<RequestGuard>, headers: HeaderMap) -> Response {
//!     if let Err(rejected) = guard.enforce("api:quiz:submit", &headers, RateLimitOptions::new(60_000, 10)) {
//!         return rejected;
//!     }
//!     let Some(key) = guard.replay_key(&headers) else { return do_submit().await };
//!     if let Some(payload) = guard.get_replay("api:quiz:submit", &key) {
//!         return guard.replay_to_response(&payload);
//!     }
//!     // perform the side effect, then cache_api_response(...)
//! }
//! ```

use crate::identity::{HeaderPrecedence, IdentifyClient};
use crate::idempotency::idempotency_key;
use crate::responses::{replay_to_response_with_fallback, response_rate_limited};
use axum::{http::HeaderMap, response::Response};
use request_guard_core::{
    GuardConfig, RateLimitDecision, RateLimitOptions, ReplayPayload, RequestPolicy,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RequestGuard {
    policy: RequestPolicy,
    identity: Arc<dyn IdentifyClient>,
}

impl std::fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGuard")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RequestGuard {
    fn default() -> Self {
        Self::new(RequestPolicy::default())
    }
}

impl RequestGuard {
    /// Guard over `policy`, identifying clients by the configured header
    /// precedence.
    pub fn new(policy: RequestPolicy) -> Self {
        let identity = HeaderPrecedence::from_names(&policy.config().identity_headers);
        Self {
            policy,
            identity: Arc::new(identity),
        }
    }

    pub fn from_config(config: GuardConfig) -> Self {
        Self::new(RequestPolicy::new(config))
    }

    /// Replace the identity extractor.
    pub fn with_identity(mut self, identity: impl IdentifyClient + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn client_id(&self, headers: &HeaderMap) -> String {
        self.identity.client_id(headers)
    }

    /// May the caller identified by `headers` proceed under `scope`?
    pub fn check_rate_limit(
        &self,
        scope: &str,
        headers: &HeaderMap,
        options: RateLimitOptions,
    ) -> RateLimitDecision {
        let client_id = self.client_id(headers);
        let decision = self.policy.check_rate_limit(scope, &client_id, options);

        #[cfg(feature = "metrics")]
        crate::metrics::record_rate_limit_decision(scope, decision.allowed);

        decision
    }

    /// [`Self::check_rate_limit`], turning a refusal into the standard 429.
    #[allow(clippy::result_large_err)]
    pub fn enforce(
        &self,
        scope: &str,
        headers: &HeaderMap,
        options: RateLimitOptions,
    ) -> Result<RateLimitDecision, Response> {
        let decision = self.check_rate_limit(scope, headers, options);
        match decision.retry_after {
            Some(retry_after) if !decision.allowed => {
                Err(response_rate_limited(retry_after, Some(scope)))
            }
            _ => Ok(decision),
        }
    }

    /// Replay-cache key for this request: client identifier plus the
    /// `Idempotency-Key` header, so two clients reusing a key never collide.
    pub fn replay_key(&self, headers: &HeaderMap) -> Option<String> {
        let key = idempotency_key(headers)?;
        Some(format!("{}:{}", self.client_id(headers), key))
    }

    pub fn get_replay(&self, scope: &str, key: &str) -> Option<ReplayPayload> {
        let payload = self.policy.get_replay(scope, key);

        #[cfg(feature = "metrics")]
        crate::metrics::record_replay_lookup(scope, payload.is_some());

        payload
    }

    pub fn set_replay(&self, scope: &str, key: &str, payload: ReplayPayload, ttl: Option<Duration>) {
        #[cfg(feature = "metrics")]
        crate::metrics::record_replay_store(scope, payload.kind());

        self.policy.set_replay(scope, key, payload, ttl);
    }

    pub fn cache_api_response(&self, scope: &str, key: &str, status: u16, body: serde_json::Value) {
        #[cfg(feature = "metrics")]
        crate::metrics::record_replay_store(scope, "json");

        self.policy.cache_api_response(scope, key, status, body);
    }

    pub fn cache_redirect_response(&self, scope: &str, key: &str, status: u16, location: &str) {
        #[cfg(feature = "metrics")]
        crate::metrics::record_replay_store(scope, "redirect");

        self.policy.cache_redirect_response(scope, key, status, location);
    }

    /// Rebuild a stored response, using the configured fallback redirect.
    pub fn replay_to_response(&self, payload: &ReplayPayload) -> Response {
        replay_to_response_with_fallback(payload, &self.policy.config().fallback_redirect)
    }
}
