//! Static configuration for the refresh coordinator.
//!
//! Values are supplied once at startup and never re-read. `sanitise()` is
//! applied by the coordinator constructor so embedders inherit the same
//! safety limits even when they build the struct by hand.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use crate::entry::{LabelFilter, SentinelKey};

/// Default wall-clock interval between loop ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);
/// Smallest tick interval accepted when limits are enforced.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Longest tick interval, cache expiration or startup timeout accepted.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default per-sentinel cache expiration.
pub const DEFAULT_CACHE_EXPIRATION: Duration = Duration::from_secs(30);
/// Default delay between startup load attempts.
pub const DEFAULT_STARTUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What to do when the initial load cannot complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupPolicy {
    /// Fail startup; serving with an empty snapshot is not acceptable.
    #[default]
    Required,
    /// Log a warning and keep serving the empty snapshot until a tick succeeds.
    Optional,
}

/// A sentinel watched by the coordinator, optionally with its own expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelRegistration {
    pub key: SentinelKey,
    /// Overrides [`CoordinatorConfig::cache_expiration`] for this sentinel.
    pub cache_expiration: Option<Duration>,
}

impl SentinelRegistration {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: SentinelKey::new(key, label),
            cache_expiration: None,
        }
    }

    pub fn with_cache_expiration(mut self, expiration: Duration) -> Self {
        self.cache_expiration = Some(expiration);
        self
    }
}

/// Configuration values controlling the refresh coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Label filter passed to every full fetch.
    pub label_filter: LabelFilter,
    /// Sentinels whose changes trigger a full refresh.
    pub sentinels: Vec<SentinelRegistration>,
    /// Wall-clock interval between loop ticks.
    pub tick_interval: Duration,
    /// Default time a sentinel observation stays fresh.
    pub cache_expiration: Duration,
    pub startup_policy: StartupPolicy,
    /// How long `initialize` keeps retrying; zero means a single attempt.
    pub startup_timeout: Duration,
    pub startup_retry_delay: Duration,
    /// When false, `sanitise` leaves intervals untouched (tests only).
    pub enforce_limits: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            label_filter: LabelFilter::Any,
            sentinels: Vec::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            cache_expiration: DEFAULT_CACHE_EXPIRATION,
            startup_policy: StartupPolicy::Required,
            startup_timeout: Duration::ZERO,
            startup_retry_delay: DEFAULT_STARTUP_RETRY_DELAY,
            enforce_limits: true,
        }
    }
}

impl CoordinatorConfig {
    /// Builds a config watching a single sentinel.
    pub fn with_sentinel(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            sentinels: vec![SentinelRegistration::new(key, label)],
            ..Default::default()
        }
    }

    /// Expiration applied to `registration`.
    pub(crate) fn expiration_for(&self, registration: &SentinelRegistration) -> Duration {
        registration
            .cache_expiration
            .unwrap_or(self.cache_expiration)
    }

    /// Clamps intervals and removes duplicate sentinel registrations.
    pub(crate) fn sanitise(mut self) -> Self {
        let mut seen = HashSet::new();
        self.sentinels.retain(|registration| {
            let fresh = seen.insert(registration.key.clone());
            if !fresh {
                warn!(
                    sentinel = %registration.key,
                    "config-refresh: duplicate sentinel registration ignored"
                );
            }
            fresh
        });

        if self.sentinels.is_empty() {
            warn!("config-refresh: no sentinel registered; the snapshot will only change on manual refresh");
        }

        // Applied even without limits: larger values overflow deadline
        // arithmetic and a zero period cannot drive a ticker.
        if self.tick_interval.is_zero() {
            self.tick_interval = MIN_TICK_INTERVAL;
        }
        self.tick_interval = clamp_to_max("tick interval", self.tick_interval);
        self.cache_expiration = clamp_to_max("cache expiration", self.cache_expiration);
        self.startup_timeout = clamp_to_max("startup timeout", self.startup_timeout);
        self.startup_retry_delay = clamp_to_max("startup retry delay", self.startup_retry_delay);
        for registration in &mut self.sentinels {
            registration.cache_expiration = registration
                .cache_expiration
                .map(|expiration| clamp_to_max("cache expiration", expiration));
        }

        if !self.enforce_limits {
            return self;
        }

        if self.tick_interval < MIN_TICK_INTERVAL {
            warn!(
                "config-refresh: tick interval {:?} is below the minimum {:?}; clamping",
                self.tick_interval, MIN_TICK_INTERVAL
            );
            self.tick_interval = MIN_TICK_INTERVAL;
        }

        if self.startup_retry_delay.is_zero() && !self.startup_timeout.is_zero() {
            warn!(
                "config-refresh: startup retry delay must be > 0; defaulting to {:?}",
                DEFAULT_STARTUP_RETRY_DELAY
            );
            self.startup_retry_delay = DEFAULT_STARTUP_RETRY_DELAY;
        }

        self
    }
}

fn clamp_to_max(name: &str, value: Duration) -> Duration {
    if value > MAX_INTERVAL {
        warn!(
            "config-refresh: {name} {:?} exceeds the maximum {:?}; clamping",
            value, MAX_INTERVAL
        );
        MAX_INTERVAL
    } else {
        value
    }
}
