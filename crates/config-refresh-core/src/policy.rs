//! Refresh cadence decisions.
//!
//! [`RefreshPolicy::is_due`] is a pure function of elapsed time. Each sentinel
//! carries a [`CacheExpiration`] that applies it, so consumer reads never
//! influence how often the remote source is contacted.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for "never" when a deadline is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Returns `now + delay`, saturating instead of panicking on overflow.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Decides whether a refresh attempt is due.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshPolicy;

impl RefreshPolicy {
    /// Returns `true` once `interval` has elapsed since `last_check`.
    ///
    /// A sentinel that was never checked is always due, and a zero interval
    /// means "always due" so a misconfiguration polls frequently rather than
    /// never.
    pub fn is_due(now: Instant, last_check: Option<Instant>, interval: Duration) -> bool {
        if interval.is_zero() {
            return true;
        }
        match last_check {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }
}

/// Last-check timestamp plus expiration interval for one sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheExpiration {
    interval: Duration,
    last_check: Option<Instant>,
}

impl CacheExpiration {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_check: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_check(&self) -> Option<Instant> {
        self.last_check
    }

    pub fn is_due(&self, now: Instant) -> bool {
        RefreshPolicy::is_due(now, self.last_check, self.interval)
    }

    /// Records a check that started at `now`, whatever its outcome.
    ///
    /// The timestamp never moves backwards.
    pub fn mark_checked(&mut self, now: Instant) {
        self.last_check = Some(self.last_check.map_or(now, |last| last.max(now)));
    }

    /// Time left until the expiration elapses (zero when already due).
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_check {
            Some(last) if !self.interval.is_zero() => {
                deadline_after(last, self.interval).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        }
    }
}
