//! Rate limiting middleware.
//!
//! Applies one [`RateLimitRule`] to every request routed through it. Refused
//! requests get the standard 429; admitted responses are annotated with
//! rate-limit headers:
//!
//! - `X-RateLimit-Limit`: requests allowed per window
//! - `X-RateLimit-Remaining`: requests left in the current window
//! - `X-RateLimit-Reset`: unix time (seconds) at which the window reopens
//!
//! ## Example
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use request_guard_api::{rate_limit_middleware, RateLimitRule, RequestGuard};
//!
//! let rule = RateLimitRule::new(guard, "api:session:switch", RateLimitOptions::new(60_000, 20));
//! let app = Router::new()
//!     .route("/api/v1/session/switch", post(switch))
//!     .layer(middleware::from_fn_with_state(rule, rate_limit_middleware));
//! ```

use crate::guard::RequestGuard;
use crate::responses::response_rate_limited;
use axum::{
    extract::{Request, State},
    http::{
        header::{HeaderName, HeaderValue},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use request_guard_core::{RateLimitDecision, RateLimitOptions};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Scope and budget enforced by [`rate_limit_middleware`].
#[derive(Clone, Debug)]
pub struct RateLimitRule {
    pub guard: RequestGuard,
    pub scope: String,
    pub options: RateLimitOptions,
}

impl RateLimitRule {
    pub fn new(guard: RequestGuard, scope: impl Into<String>, options: RateLimitOptions) -> Self {
        Self {
            guard,
            scope: scope.into(),
            options,
        }
    }
}

/// Rate limiting middleware, for use with `axum::middleware::from_fn_with_state`.
pub async fn rate_limit_middleware(
    State(rule): State<RateLimitRule>,
    req: Request,
    next: Next,
) -> Response {
    let decision = rule
        .guard
        .check_rate_limit(&rule.scope, req.headers(), rule.options);

    let mut response = match decision.retry_after {
        Some(retry_after) if !decision.allowed => {
            response_rate_limited(retry_after, Some(&rule.scope))
        }
        _ => next.run(req).await,
    };

    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Write the `X-RateLimit-*` headers for `decision`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
    let reset_in = decision.reset_after.as_millis().div_ceil(1000);
    let reset = now.saturating_add(u64::try_from(reset_in).unwrap_or(u64::MAX));

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset));
}
