//! Access-triggered store cleanup.
//!
//! There is no background task. Every admission check and every cache write
//! first calls [`StoreJanitor::cleanup_stores`], which sweeps both stores at
//! most once per cleanup interval and returns immediately otherwise.

use crate::replay::ReplayCache;
use crate::window::SlidingWindowLimiter;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub windows_removed: usize,
    pub replays_removed: usize,
}

/// Interval gate plus the staleness bounds for each store.
#[derive(Debug)]
pub struct StoreJanitor {
    interval: Duration,
    rate_limit_stale: Duration,
    replay_stale: Duration,
    /// `None` until the first sweep, so a fresh instance sweeps on first use.
    last_sweep: Mutex<Option<Instant>>,
}

impl StoreJanitor {
    pub fn new(interval: Duration, rate_limit_stale: Duration, replay_stale: Duration) -> Self {
        Self {
            interval,
            rate_limit_stale,
            replay_stale,
            last_sweep: Mutex::new(None),
        }
    }

    /// Sweep both stores if the interval has elapsed since the last sweep.
    ///
    /// Returns `None` when the gate is closed or another caller is already
    /// sweeping; callers never wait on a sweep.
    pub fn cleanup_stores(
        &self,
        now: Instant,
        windows: &SlidingWindowLimiter,
        replays: &ReplayCache,
    ) -> Option<SweepReport> {
        let mut last_sweep = self.last_sweep.try_lock()?;
        if let Some(previous) = *last_sweep {
            if now.saturating_duration_since(previous) < self.interval {
                return None;
            }
        }
        *last_sweep = Some(now);

        let report = SweepReport {
            windows_removed: windows.sweep(now, self.rate_limit_stale),
            replays_removed: replays.sweep(now, self.replay_stale),
        };

        if report.windows_removed + report.replays_removed > 0 {
            info!(
                windows_removed = report.windows_removed,
                replays_removed = report.replays_removed,
                "Swept stale guard entries"
            );
        } else {
            debug!("Guard sweep found nothing stale");
        }
        Some(report)
    }
}
