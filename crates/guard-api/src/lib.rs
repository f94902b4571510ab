//! Request Guard API Library
//!
//! HTTP-facing half of the request-policy guard: client identification from
//! proxy headers, the standard 429 and replay responses, an axum middleware
//! and the `RequestGuard` facade handlers call into.

pub mod guard;
pub mod identity;
pub mod idempotency;
pub mod middleware;
pub mod responses;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use guard::RequestGuard;
pub use identity::{HeaderPrecedence, IdentifyClient, ANONYMOUS_CLIENT};
pub use middleware::{rate_limit_middleware, RateLimitRule};
pub use responses::{replay_to_response, response_rate_limited, RedirectError};

pub use request_guard_core::{GuardConfig, RateLimitDecision, RateLimitOptions, ReplayPayload};
