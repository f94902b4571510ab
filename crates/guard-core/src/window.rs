//! Fixed-window admission counters.
//!
//! One [`RateWindow`] is kept per `scope:client` key. A window admits up to
//! `max_requests` requests; once its length has elapsed the next request
//! replaces it with a fresh window.
//!
//! ## Boundary bursts
//!
//! This is a fixed-window counter, not a sliding log or token bucket. A client
//! that spends its whole budget at the end of one window and again at the
//! start of the next is admitted up to `2 * max_requests` times within one
//! window length. That is the accepted cost of O(1) memory and O(1) decisions
//! per key; callers rely on the current admission behavior, so do not swap
//! the algorithm without changing them too.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Counter state for one `scope:client` key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateWindow {
    pub(crate) window_start: Instant,
    pub(crate) count: u32,
    /// Length the window was opened with; lets the janitor keep long windows.
    pub(crate) window: Duration,
}

impl RateWindow {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            window_start: now,
            count: 1,
            window,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole seconds until the window reopens; set only on refusal, never 0.
    pub retry_after: Option<u64>,
    pub limit: u32,
    pub remaining: u32,
    /// Time left in the current window.
    pub reset_after: Duration,
}

/// Admission counters for every `scope:client` pair.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, RateWindow>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide admission for `key` at `now`.
    ///
    /// The whole read-modify-write happens under the key's shard lock, so two
    /// concurrent calls for one key can never both observe the same count.
    /// A refusal leaves the stored window untouched.
    pub fn check(
        &self,
        key: &str,
        window: Duration,
        max_requests: u32,
        now: Instant,
    ) -> RateLimitDecision {
        match self.windows.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateWindow::open(now, window));
                debug!(rate_limit_key = %key, "Opened rate window");
                admitted(1, max_requests, window)
            }
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                let elapsed = now.saturating_duration_since(state.window_start);

                if elapsed >= window {
                    *state = RateWindow::open(now, window);
                    debug!(rate_limit_key = %key, "Rate window reset");
                    return admitted(1, max_requests, window);
                }

                let reset_after = window - elapsed;
                if state.count < max_requests {
                    state.count += 1;
                    state.window = window;
                    return admitted(state.count, max_requests, reset_after);
                }

                let retry_after = retry_after_secs(reset_after);
                warn!(
                    rate_limit_key = %key,
                    count = state.count,
                    limit = max_requests,
                    retry_after,
                    "Rate limit exceeded"
                );
                RateLimitDecision {
                    allowed: false,
                    retry_after: Some(retry_after),
                    limit: max_requests,
                    remaining: 0,
                    reset_after,
                }
            }
        }
    }

    /// Drop windows that started more than `stale` ago (or more than their
    /// own length ago, if that is longer). Returns how many were removed.
    pub fn sweep(&self, now: Instant, stale: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| {
            now.saturating_duration_since(state.window_start) <= stale.max(state.window)
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).map(|w| *w)
    }
}

fn admitted(count: u32, max_requests: u32, reset_after: Duration) -> RateLimitDecision {
    RateLimitDecision {
        allowed: true,
        retry_after: None,
        limit: max_requests,
        remaining: max_requests.saturating_sub(count),
        reset_after,
    }
}

/// `ceil(remaining / 1s)`, floored at 1.
fn retry_after_secs(remaining: Duration) -> u64 {
    let millis = remaining.as_millis();
    let secs = millis.div_ceil(1000);
    u64::try_from(secs).unwrap_or(u64::MAX).max(1)
}
