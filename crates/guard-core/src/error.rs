//! Error types for the guard core.
//!
//! Admission and replay lookups never fail; the only fallible surface is
//! configuration validation, and even that is clamped rather than raised on
//! the request path.

/// A configuration value that cannot be used as given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    NonPositive { field: &'static str },

    #[error("invalid value for {var}: {value:?}")]
    Unparsable { var: &'static str, value: String },

    #[error("fallback redirect must be an absolute path, got {0:?}")]
    InvalidFallbackRedirect(String),
}
