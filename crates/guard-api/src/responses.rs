//! Transport responses for guard outcomes.
//!
//! - [`response_rate_limited`] is the single definition of the 429 shape, so
//!   every protected endpoint rejects the same way.
//! - [`replay_to_response`] turns a stored [`ReplayPayload`] back into the
//!   response the original request received.
//!
//! ## 429 body
//!
//! ```json
//! {
//!   "error": {
//!     "code": "RATE_LIMITED",
//!     "message": "Request rate limit exceeded",
//!     "details": { "scope": "api:quiz:submit" }
//!   }
//! }
//! ```
//!
//! `details` is omitted when no scope is given. The `Retry-After` header
//! carries the wait in seconds (RFC 6585).

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName, HeaderValue},
        StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use request_guard_core::config::DEFAULT_FALLBACK_REDIRECT;
use request_guard_core::ReplayPayload;
use serde::Serialize;
use tracing::warn;

pub const RATE_LIMITED_CODE: &str = "RATE_LIMITED";
pub const RATE_LIMITED_MESSAGE: &str = "Request rate limit exceeded";

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ScopeDetails<'a>>,
}

#[derive(Debug, Serialize)]
struct ScopeDetails<'a> {
    scope: &'a str,
}

/// Standard "too many requests" response.
pub fn response_rate_limited(retry_after_secs: u64, scope: Option<&str>) -> Response {
    let body = ErrorEnvelope {
        error: ErrorBody {
            code: RATE_LIMITED_CODE,
            message: RATE_LIMITED_MESSAGE,
            details: scope.map(|scope| ScopeDetails { scope }),
        },
    };

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, HeaderValue::from(retry_after_secs))],
        Json(body),
    )
        .into_response()
}

/// Why a stored redirect location cannot be replayed as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedirectError {
    #[error("redirect location is empty")]
    Empty,

    #[error("redirect location is not a valid URI: {0:?}")]
    InvalidUri(String),

    #[error("redirect location {0:?} is neither a local path nor an http(s) URL")]
    UnsupportedTarget(String),
}

/// Check that `location` is safe to put in a `Location` header.
///
/// Accepted: absolute `http`/`https` URLs and relative references
/// (`/quiz/3`, `quiz/3`, `?step=2`, `../done`). Protocol-relative targets
/// (`//host`), backslashes and any other scheme are rejected.
pub fn validate_redirect_location(location: &str) -> Result<HeaderValue, RedirectError> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(RedirectError::Empty);
    }

    match uri_scheme(trimmed) {
        Some(scheme) if !is_scheme(scheme) => {
            return Err(RedirectError::InvalidUri(location.to_string()));
        }
        Some(scheme)
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") =>
        {
            let uri: Uri = trimmed
                .parse()
                .map_err(|_| RedirectError::InvalidUri(location.to_string()))?;
            if uri.authority().is_none() {
                return Err(RedirectError::InvalidUri(location.to_string()));
            }
        }
        Some(_) => return Err(RedirectError::UnsupportedTarget(location.to_string())),
        None => {
            if trimmed.starts_with("//") || trimmed.contains('\\') {
                return Err(RedirectError::UnsupportedTarget(location.to_string()));
            }
            if !trimmed.bytes().all(is_uri_reference_byte) {
                return Err(RedirectError::InvalidUri(location.to_string()));
            }
        }
    }

    HeaderValue::from_str(trimmed).map_err(|_| RedirectError::InvalidUri(location.to_string()))
}

/// Scheme of an absolute URI, if `value` starts with one (RFC 3986 §3.1).
/// A relative reference cannot have a colon in its first path segment, so a
/// colon before any `/`, `?` or `#` always introduces a scheme.
fn uri_scheme(value: &str) -> Option<&str> {
    let end = value.find([':', '/', '?', '#'])?;
    if value.as_bytes()[end] != b':' {
        return None;
    }
    Some(&value[..end])
}

fn is_scheme(scheme: &str) -> bool {
    let mut bytes = scheme.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

/// Bytes a URI reference may carry unescaped.
fn is_uri_reference_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !matches!(b, b'"' | b'<' | b'>' | b'{' | b'}' | b'|' | b'^' | b'`')
}

/// Rebuild the response for a stored payload, redirecting to `/login` when a
/// stored location is unusable.
pub fn replay_to_response(payload: &ReplayPayload) -> Response {
    replay_to_response_with_fallback(payload, DEFAULT_FALLBACK_REDIRECT)
}

/// [`replay_to_response`] with an explicit fallback redirect target.
///
/// Never fails. A bad stored location is logged and replaced with
/// `fallback`; a non-redirect status on a redirect payload becomes
/// `303 See Other`; an out-of-range JSON status becomes 500.
pub fn replay_to_response_with_fallback(payload: &ReplayPayload, fallback: &str) -> Response {
    match payload {
        ReplayPayload::Json {
            status,
            body,
            headers,
        } => {
            let mut response = Response::new(Body::from(body.to_string()));
            *response.status_mut() = StatusCode::from_u16(*status).unwrap_or_else(|_| {
                warn!(status = *status, "Stored replay status is invalid, replaying as 500");
                StatusCode::INTERNAL_SERVER_ERROR
            });

            let response_headers = response.headers_mut();
            for (name, value) in headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response_headers.append(name, value);
                    }
                    _ => warn!(header = %name, "Skipping invalid stored replay header"),
                }
            }
            response
        }
        ReplayPayload::Redirect { status, location } => {
            let status = StatusCode::from_u16(*status)
                .ok()
                .filter(|s| matches!(s.as_u16(), 301 | 302 | 303 | 307 | 308))
                .unwrap_or(StatusCode::SEE_OTHER);

            let location = validate_redirect_location(location).unwrap_or_else(|err| {
                warn!(error = %err, fallback = %fallback, "Replaying redirect to fallback");
                HeaderValue::from_str(fallback)
                    .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FALLBACK_REDIRECT))
            });

            (status, [(header::LOCATION, location)]).into_response()
        }
    }
}
