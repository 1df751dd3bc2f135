//! Mutable coordinator bookkeeping.
//!
//! Tracks the sentinels' last observed values and cache expirations, the
//! current phase of the refresh state machine, and failure counters used to
//! pick log levels. The state lives behind a mutex owned by
//! `CoordinatorShared`; only the refresh path mutates it.

use std::time::Duration;

use tokio::time::Instant;

use super::config::CoordinatorConfig;
use super::RefreshError;
use crate::entry::SentinelKey;
use crate::policy::CacheExpiration;
use crate::source::FetchError;

/// Consecutive failures of one kind logged at `warn` before the level changes.
pub(super) const MAX_WARN_LOGGED_FAILURES: u32 = 5;

/// Phase of the refresh state machine.
///
/// `Idle -> Checking -> (Unchanged | Applying) -> Idle`, with `Failed` as a
/// transient state that returns to `Idle` once the attempt is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Checking,
    Applying,
    Unchanged,
    Failed,
}

impl RefreshPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Applying => "applying",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

/// Last known value of a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelObservation {
    /// Never successfully checked; compares unequal to every fetch result.
    Unobserved,
    /// The sentinel was absent from the source.
    Missing,
    Value(String),
}

impl SentinelObservation {
    pub(crate) fn from_fetch(value: Option<String>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Missing,
        }
    }

    /// Exact-equality comparison against a freshly fetched value.
    pub(crate) fn matches(&self, fetched: Option<&str>) -> bool {
        match (self, fetched) {
            (Self::Missing, None) => true,
            (Self::Value(known), Some(current)) => known == current,
            _ => false,
        }
    }
}

/// Per-sentinel bookkeeping.
#[derive(Debug, Clone)]
pub(super) struct SentinelState {
    pub(super) key: SentinelKey,
    pub(super) expiration: CacheExpiration,
    pub(super) observed: SentinelObservation,
}

/// Diagnostic view of a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelSnapshot {
    pub key: SentinelKey,
    pub observed: SentinelObservation,
    pub last_check: Option<Instant>,
}

/// Diagnostic view of the coordinator state.
#[derive(Debug, Clone)]
pub struct CoordinatorSnapshot {
    pub phase: RefreshPhase,
    pub sentinels: Vec<SentinelSnapshot>,
    /// Most recent refresh error message (if any).
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub last_success: Option<Instant>,
    pub last_attempt: Option<Instant>,
}

/// Log level classification for refresh failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RefreshErrorLevel {
    Debug,
    Warn,
    Error,
}

#[derive(Debug)]
pub(super) struct CoordinatorState {
    pub(super) sentinels: Vec<SentinelState>,
    pub(super) phase: RefreshPhase,
    pub(super) last_success: Option<Instant>,
    pub(super) last_attempt: Option<Instant>,
    pub(super) last_error: Option<String>,
    pub(super) consecutive_errors: u32,
    /// Consecutive failures sharing `last_error_kind`.
    pub(super) same_kind_errors: u32,
    pub(super) last_error_kind: Option<String>,
}

impl CoordinatorState {
    pub(super) fn new(config: &CoordinatorConfig) -> Self {
        let sentinels = config
            .sentinels
            .iter()
            .map(|registration| SentinelState {
                key: registration.key.clone(),
                expiration: CacheExpiration::new(config.expiration_for(registration)),
                observed: SentinelObservation::Unobserved,
            })
            .collect();
        Self {
            sentinels,
            phase: RefreshPhase::Idle,
            last_success: None,
            last_attempt: None,
            last_error: None,
            consecutive_errors: 0,
            same_kind_errors: 0,
            last_error_kind: None,
        }
    }

    /// Indices of sentinels whose cache expiration has elapsed at `now`.
    pub(super) fn due_sentinels(&self, now: Instant) -> Vec<usize> {
        self.sentinels
            .iter()
            .enumerate()
            .filter(|(_, sentinel)| sentinel.expiration.is_due(now))
            .map(|(index, _)| index)
            .collect()
    }

    pub(super) fn all_sentinels(&self) -> Vec<usize> {
        (0..self.sentinels.len()).collect()
    }

    /// Key and last observation for each requested sentinel.
    pub(super) fn checks_for(&self, indices: &[usize]) -> Vec<(usize, SentinelKey, SentinelObservation)> {
        indices
            .iter()
            .filter_map(|&index| {
                self.sentinels
                    .get(index)
                    .map(|sentinel| (index, sentinel.key.clone(), sentinel.observed.clone()))
            })
            .collect()
    }

    /// Stamps the last-check time on `indices`, whatever the attempt outcome.
    pub(super) fn mark_checked(&mut self, indices: &[usize], now: Instant) {
        for &index in indices {
            if let Some(sentinel) = self.sentinels.get_mut(index) {
                sentinel.expiration.mark_checked(now);
            }
        }
        self.last_attempt = Some(now);
    }

    pub(super) fn commit_observations(&mut self, observations: Vec<(usize, SentinelObservation)>) {
        for (index, observed) in observations {
            if let Some(sentinel) = self.sentinels.get_mut(index) {
                sentinel.observed = observed;
            }
        }
    }

    /// Time until the earliest sentinel becomes due.
    pub(super) fn next_due_in(&self, now: Instant) -> Option<Duration> {
        self.sentinels
            .iter()
            .map(|sentinel| sentinel.expiration.remaining(now))
            .min()
    }

    pub(super) fn handle_refresh_success(&mut self, now: Instant) {
        self.last_success = Some(now);
        self.last_error = None;
        self.consecutive_errors = 0;
        self.same_kind_errors = 0;
        self.last_error_kind = None;
    }

    /// Records a failed attempt and returns the level it should be logged at.
    pub(super) fn handle_refresh_error(&mut self, error: &RefreshError) -> RefreshErrorLevel {
        self.last_error = Some(error.to_string());
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        let kind = classify_error_kind(error);
        if self.last_error_kind.as_deref() == Some(kind.as_str()) {
            self.same_kind_errors = self.same_kind_errors.saturating_add(1);
        } else {
            // New error family observed, restart escalation for this kind.
            self.same_kind_errors = 1;
            self.last_error_kind = Some(kind);
        }

        self.determine_error_level(error)
    }

    fn determine_error_level(&self, error: &RefreshError) -> RefreshErrorLevel {
        match error {
            RefreshError::Fetch(FetchError::Unauthorized(_)) => {
                if self.same_kind_errors > MAX_WARN_LOGGED_FAILURES {
                    RefreshErrorLevel::Debug
                } else {
                    RefreshErrorLevel::Warn
                }
            }
            _ => {
                if self.same_kind_errors >= MAX_WARN_LOGGED_FAILURES {
                    RefreshErrorLevel::Error
                } else {
                    RefreshErrorLevel::Warn
                }
            }
        }
    }

    pub(super) fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            phase: self.phase,
            sentinels: self
                .sentinels
                .iter()
                .map(|sentinel| SentinelSnapshot {
                    key: sentinel.key.clone(),
                    observed: sentinel.observed.clone(),
                    last_check: sentinel.expiration.last_check(),
                })
                .collect(),
            last_error: self.last_error.clone(),
            consecutive_errors: self.consecutive_errors,
            last_success: self.last_success,
            last_attempt: self.last_attempt,
        }
    }
}

/// Groups refresh errors into families for log escalation.
pub(super) fn classify_error_kind(error: &RefreshError) -> String {
    match error {
        RefreshError::Fetch(inner) => format!("fetch:{}", inner.kind()),
        RefreshError::Snapshot(_) => "snapshot".to_string(),
        RefreshError::Startup { source, .. } => classify_error_kind(source),
    }
}
