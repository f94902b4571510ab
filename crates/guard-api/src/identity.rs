//! Client identification for rate limiting and replay isolation.
//!
//! The identifier is a best-effort bucketing key taken from proxy headers,
//! in precedence order:
//!
//! 1. First entry of `X-Forwarded-For`
//! 2. `X-Real-IP`
//! 3. `CF-Connecting-IP`
//! 4. `User-Agent`
//! 5. The sentinel [`ANONYMOUS_CLIENT`]
//!
//! ## Security
//!
//! These headers are client-controlled and trivially spoofed. The identifier
//! dampens abuse from well-behaved proxies' clients; it is not an
//! authentication mechanism. Deployments behind a different proxy chain can
//! reorder the headers with [`HeaderPrecedence`] or plug in any
//! `Fn(&HeaderMap) -> String` through [`IdentifyClient`].

use axum::http::{header::HeaderName, HeaderMap};
use request_guard_core::config::DEFAULT_IDENTITY_HEADERS;
use tracing::{debug, warn};

/// Identifier used when no header yields a value.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Derives the client identifier for a request.
pub trait IdentifyClient: Send + Sync {
    fn client_id(&self, headers: &HeaderMap) -> String;
}

impl<F> IdentifyClient for F
where
    F: Fn(&HeaderMap) -> String + Send + Sync,
{
    fn client_id(&self, headers: &HeaderMap) -> String {
        self(headers)
    }
}

/// Ordered list of headers to consult for the client identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPrecedence {
    headers: Vec<HeaderName>,
}

impl Default for HeaderPrecedence {
    fn default() -> Self {
        Self::from_names(DEFAULT_IDENTITY_HEADERS)
    }
}

impl HeaderPrecedence {
    pub fn new(headers: Vec<HeaderName>) -> Self {
        Self { headers }
    }

    /// Parse header names, skipping invalid ones. Falls back to the default
    /// order if nothing usable remains.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<HeaderName> = names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                match HeaderName::from_bytes(name.trim().as_bytes()) {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(header = %name, "Ignoring invalid identity header name");
                        None
                    }
                }
            })
            .collect();

        if headers.is_empty() {
            return Self::new(
                DEFAULT_IDENTITY_HEADERS
                    .into_iter()
                    .map(HeaderName::from_static)
                    .collect(),
            );
        }
        Self::new(headers)
    }

    pub fn headers(&self) -> &[HeaderName] {
        &self.headers
    }
}

impl IdentifyClient for HeaderPrecedence {
    fn client_id(&self, headers: &HeaderMap) -> String {
        for name in &self.headers {
            let Some(raw) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };

            // Only the forwarded-for chain is a list; user agents contain commas.
            let candidate = if name == "x-forwarded-for" {
                raw.split(',').next().unwrap_or_default()
            } else {
                raw
            }
            .trim();

            if !candidate.is_empty() {
                debug!(header = %name, client_id = %candidate, "Resolved client identity");
                return candidate.to_string();
            }
        }

        debug!("No identity header present, using anonymous client");
        ANONYMOUS_CLIENT.to_string()
    }
}
