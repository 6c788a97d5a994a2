#![forbid(unsafe_code)]

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Value indicating no refresh has been recorded yet.
const NO_REFRESH: u64 = 0;

/// Shared reload throttle for trackers that watch the same manifest.
///
/// Many representations of one stream each run their own tracker; without
/// coordination every scheduled tick would refetch the same manifest. One
/// limiter instance is injected into every tracker of a stream, and
/// [`try_claim`](Self::try_claim) lets exactly one of them perform a given
/// refresh while the peers skip theirs.
#[derive(Debug)]
pub struct ReloadRateLimiter {
    /// Nanoseconds since `reference_instant` of the last refresh, or
    /// `NO_REFRESH` if none.
    last_refresh_nanos: AtomicU64,
    reference_instant: Instant,
}

impl ReloadRateLimiter {
    pub fn new() -> Self {
        Self {
            last_refresh_nanos: AtomicU64::new(NO_REFRESH),
            reference_instant: Instant::now(),
        }
    }

    /// Nanos since reference, never 0 so it stays distinguishable from
    /// `NO_REFRESH`.
    fn now_nanos(&self) -> u64 {
        let nanos = self.reference_instant.elapsed().as_nanos() as u64;
        nanos.max(1)
    }

    /// Claim a refresh slot if no peer refreshed within `min_period`.
    ///
    /// Compare-exchange semantics: with several trackers racing on the same
    /// tick, exactly one wins the claim.
    pub fn try_claim(&self, min_period: Duration) -> bool {
        let now = self.now_nanos();
        let min_nanos = min_period.as_nanos() as u64;
        loop {
            let last = self.last_refresh_nanos.load(Ordering::Acquire);
            if last != NO_REFRESH && now < last.saturating_add(min_nanos) {
                return false;
            }
            match self.last_refresh_nanos.compare_exchange(
                last,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Record a refresh performed outside the claimed schedule (forced
    /// reloads).
    pub fn publish(&self) {
        self.last_refresh_nanos
            .store(self.now_nanos(), Ordering::Release);
    }

    /// Time since the last recorded refresh, if any.
    pub fn last_refresh_age(&self) -> Option<Duration> {
        let last = self.last_refresh_nanos.load(Ordering::Acquire);
        if last == NO_REFRESH {
            return None;
        }
        let now = self.now_nanos();
        Some(Duration::from_nanos(now.saturating_sub(last)))
    }
}

impl Default for ReloadRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
