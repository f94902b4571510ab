//! Request Guard Core
//!
//! In-memory stores backing the request-policy guard:
//! - Fixed-window admission counters keyed by scope and client
//! - Short-lived replay entries keyed by scope and idempotency key
//! - An access-triggered janitor that bounds both stores
//!
//! Everything here is synchronous and HTTP-agnostic. The `request-guard-api`
//! crate layers header parsing and axum responses on top.

pub mod clock;
pub mod config;
pub mod error;
pub mod janitor;
pub mod policy;
pub mod replay;
pub mod window;

pub use clock::{Clock, SystemClock};
pub use config::{GuardConfig, RateLimitOptions};
pub use error::ConfigError;
pub use janitor::{StoreJanitor, SweepReport};
pub use policy::RequestPolicy;
pub use replay::{ReplayCache, ReplayPayload};
pub use window::{RateLimitDecision, SlidingWindowLimiter};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
