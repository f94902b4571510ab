//! Guard configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REQUEST_GUARD_WINDOW_MS` | 60000 | Default admission window |
//! | `REQUEST_GUARD_MAX_REQUESTS` | 60 | Default requests per window |
//! | `REQUEST_GUARD_REPLAY_TTL_MS` | 20000 | Default replay entry lifetime |
//! | `REQUEST_GUARD_CLEANUP_INTERVAL_MS` | 30000 | Minimum gap between janitor sweeps |
//! | `REQUEST_GUARD_RATE_LIMIT_STALE_MS` | 300000 | Age after which a rate window is swept |
//! | `REQUEST_GUARD_REPLAY_STALE_MS` | 120000 | Grace past expiry before a replay entry is swept |
//! | `REQUEST_GUARD_FALLBACK_REDIRECT` | `/login` | Target for replayed redirects with a bad location |
//! | `REQUEST_GUARD_IDENTITY_HEADERS` | see [`DEFAULT_IDENTITY_HEADERS`] | Client identity header precedence |
//!
//! Unparsable or non-positive values never fail startup: they are logged and
//! replaced by the defaults.

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default admission window (60 seconds).
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 60;

/// Default lifetime of a replay entry (20 seconds).
pub const DEFAULT_REPLAY_TTL_MS: u64 = 20_000;

/// Janitor sweeps run at most this often.
pub const CLEANUP_INTERVAL_MS: u64 = 30_000;

/// Rate windows older than this are swept.
pub const RATE_LIMIT_STALE_MS: u64 = 300_000;

/// Replay entries this far past expiry are swept.
pub const REPLAY_STALE_MS: u64 = 120_000;

/// Where a replayed redirect goes when its stored location is unusable.
pub const DEFAULT_FALLBACK_REDIRECT: &str = "/login";

/// Client identity headers, highest precedence first.
pub const DEFAULT_IDENTITY_HEADERS: [&str; 4] =
    ["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "user-agent"];

/// Configuration shared by every store in a [`crate::RequestPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Window used when a caller does not pass one.
    pub default_window: Duration,

    /// Request budget used when a caller does not pass one.
    pub default_max_requests: u32,

    /// Replay TTL used when a caller does not pass one.
    pub default_replay_ttl: Duration,

    pub cleanup_interval: Duration,

    pub rate_limit_stale: Duration,

    /// Grace period past `expires_at` before a replay entry is physically
    /// removed. Logical expiry in lookups does not wait for it.
    pub replay_stale: Duration,

    pub fallback_redirect: String,

    /// Header names consulted for the client identifier, in order.
    pub identity_headers: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_window: Duration::from_millis(DEFAULT_WINDOW_MS),
            default_max_requests: DEFAULT_MAX_REQUESTS,
            default_replay_ttl: Duration::from_millis(DEFAULT_REPLAY_TTL_MS),
            cleanup_interval: Duration::from_millis(CLEANUP_INTERVAL_MS),
            rate_limit_stale: Duration::from_millis(RATE_LIMIT_STALE_MS),
            replay_stale: Duration::from_millis(REPLAY_STALE_MS),
            fallback_redirect: DEFAULT_FALLBACK_REDIRECT.to_string(),
            identity_headers: DEFAULT_IDENTITY_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl GuardConfig {
    /// Build configuration from `REQUEST_GUARD_*` environment variables.
    ///
    /// The result is already sanitized.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let identity_headers = env_parse::<String>("REQUEST_GUARD_IDENTITY_HEADERS")
            .map(|raw| {
                raw.split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or(defaults.identity_headers);

        Self {
            default_window: env_millis("REQUEST_GUARD_WINDOW_MS")
                .unwrap_or(defaults.default_window),
            default_max_requests: env_parse("REQUEST_GUARD_MAX_REQUESTS")
                .unwrap_or(defaults.default_max_requests),
            default_replay_ttl: env_millis("REQUEST_GUARD_REPLAY_TTL_MS")
                .unwrap_or(defaults.default_replay_ttl),
            cleanup_interval: env_millis("REQUEST_GUARD_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval),
            rate_limit_stale: env_millis("REQUEST_GUARD_RATE_LIMIT_STALE_MS")
                .unwrap_or(defaults.rate_limit_stale),
            replay_stale: env_millis("REQUEST_GUARD_REPLAY_STALE_MS")
                .unwrap_or(defaults.replay_stale),
            fallback_redirect: env_parse("REQUEST_GUARD_FALLBACK_REDIRECT")
                .unwrap_or(defaults.fallback_redirect),
            identity_headers,
        }
        .sanitized()
    }

    /// Validate configuration values.
    ///
    /// Returns the first problem found. Zero replay grace is allowed: it means
    /// expired entries are swept on the next janitor run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_window.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "default_window",
            });
        }
        if self.default_max_requests == 0 {
            return Err(ConfigError::NonPositive {
                field: "default_max_requests",
            });
        }
        if self.default_replay_ttl.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "default_replay_ttl",
            });
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "cleanup_interval",
            });
        }
        if self.rate_limit_stale.is_zero() {
            return Err(ConfigError::NonPositive {
                field: "rate_limit_stale",
            });
        }
        if !is_local_path(&self.fallback_redirect) {
            return Err(ConfigError::InvalidFallbackRedirect(
                self.fallback_redirect.clone(),
            ));
        }
        if self.identity_headers.is_empty() {
            return Err(ConfigError::NonPositive {
                field: "identity_headers",
            });
        }
        Ok(())
    }

    /// Replace every invalid value with its default, logging each one.
    pub fn sanitized(mut self) -> Self {
        while let Err(err) = self.validate() {
            warn!(error = %err, "Invalid guard configuration, using default");
            let defaults = Self::default();
            match err {
                ConfigError::NonPositive { field } => match field {
                    "default_window" => self.default_window = defaults.default_window,
                    "default_max_requests" => {
                        self.default_max_requests = defaults.default_max_requests
                    }
                    "default_replay_ttl" => self.default_replay_ttl = defaults.default_replay_ttl,
                    "cleanup_interval" => self.cleanup_interval = defaults.cleanup_interval,
                    "rate_limit_stale" => self.rate_limit_stale = defaults.rate_limit_stale,
                    _ => self.identity_headers = defaults.identity_headers,
                },
                ConfigError::InvalidFallbackRedirect(_) => {
                    self.fallback_redirect = defaults.fallback_redirect
                }
                ConfigError::Unparsable { .. } => break,
            }
        }
        self
    }
}

/// Per-call admission options.
///
/// Unset or zero fields resolve to the [`GuardConfig`] defaults, so a caller
/// can never disable the limiter by passing a bad value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitOptions {
    pub window: Option<Duration>,
    pub max_requests: Option<u32>,
}

impl RateLimitOptions {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window: Some(Duration::from_millis(window_ms)),
            max_requests: Some(max_requests),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    /// Effective `(window, max_requests)` for this call.
    pub fn resolve(&self, config: &GuardConfig) -> (Duration, u32) {
        let window = self
            .window
            .filter(|w| !w.is_zero())
            .unwrap_or(config.default_window);
        let max_requests = self
            .max_requests
            .filter(|m| *m > 0)
            .unwrap_or(config.default_max_requests);
        (window, max_requests)
    }
}

/// `/path` but not the protocol-relative `//host`.
pub fn is_local_path(location: &str) -> bool {
    location.starts_with('/') && !location.starts_with("//") && !location.contains('\\')
}

fn env_parse<T: FromStr>(var: &'static str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                error = %ConfigError::Unparsable { var, value: raw },
                "Ignoring environment override"
            );
            None
        }
    }
}

fn env_millis(var: &'static str) -> Option<Duration> {
    env_parse::<u64>(var).map(Duration::from_millis)
}
