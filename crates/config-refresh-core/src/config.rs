//! Environment-driven helpers for bootstrapping the refresh coordinator.
//!
//! Derives a [`RefreshEnv`] from the host process environment and converts it
//! into the static [`CoordinatorConfig`]. Malformed numbers fall back to the
//! defaults; structural problems are reported by [`RefreshEnv::validate`].

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::coordinator::{
    CoordinatorConfig, SentinelRegistration, StartupPolicy, DEFAULT_CACHE_EXPIRATION,
    DEFAULT_TICK_INTERVAL,
};
use crate::entry::LabelFilter;

/// Path of the JSON document served by the file source.
const ENV_SOURCE: &str = "CONFIG_REFRESH_SOURCE";
/// Label filter applied to full fetches (`*`, `\0` or an exact label).
const ENV_LABEL: &str = "CONFIG_REFRESH_LABEL";
const ENV_SENTINEL_KEY: &str = "CONFIG_REFRESH_SENTINEL_KEY";
const ENV_SENTINEL_LABEL: &str = "CONFIG_REFRESH_SENTINEL_LABEL";
const ENV_TICK_INTERVAL_SECS: &str = "CONFIG_REFRESH_TICK_INTERVAL_SECS";
const ENV_CACHE_EXPIRATION_SECS: &str = "CONFIG_REFRESH_CACHE_EXPIRATION_SECS";
/// Keeps serving an empty snapshot when the initial load fails.
const ENV_STARTUP_OPTIONAL: &str = "CONFIG_REFRESH_STARTUP_OPTIONAL";
const ENV_STARTUP_TIMEOUT_SECS: &str = "CONFIG_REFRESH_STARTUP_TIMEOUT_SECS";
/// Key logged by the agent after every published snapshot.
const ENV_WATCH_KEY: &str = "CONFIG_REFRESH_WATCH_KEY";
const ENV_LOG_LEVEL: &str = "CONFIG_REFRESH_LOG_LEVEL";

const DEFAULT_LABEL: &str = "*";
const DEFAULT_SENTINEL_KEY: &str = "Sentinel";
const DEFAULT_WATCH_KEY: &str = "SomeRandomConfiguration";
const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Rejected environment settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CONFIG_REFRESH_SOURCE must name the source document")]
    MissingSource,
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Captures environment-derived options used to bootstrap the coordinator.
#[derive(Debug, Clone)]
pub struct RefreshEnv {
    /// Connection to the remote store: path of the JSON source document.
    pub source: Option<PathBuf>,
    pub label_filter: LabelFilter,
    pub sentinel_key: String,
    /// Label of the sentinel; defaults to the filter's label when it selects exactly one.
    pub sentinel_label: String,
    pub tick_interval: Duration,
    pub cache_expiration: Duration,
    pub startup_policy: StartupPolicy,
    pub startup_timeout: Duration,
    pub watch_key: String,
    /// Lowercase level name for the log filter.
    pub log_level: String,
}

impl RefreshEnv {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |name: &str| map.get(name).map(String::as_str);

        let source = get(ENV_SOURCE)
            .and_then(sanitize_non_empty)
            .map(PathBuf::from);
        // An explicitly empty label means "no label", so only absence falls back to `*`.
        let label_filter = LabelFilter::parse(get(ENV_LABEL).unwrap_or(DEFAULT_LABEL));
        let sentinel_key = get(ENV_SENTINEL_KEY)
            .and_then(sanitize_non_empty)
            .unwrap_or_else(|| DEFAULT_SENTINEL_KEY.to_string());
        let sentinel_label = get(ENV_SENTINEL_LABEL)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| label_filter.single_label().unwrap_or("").to_string());
        let tick_interval = parse_secs(get(ENV_TICK_INTERVAL_SECS), DEFAULT_TICK_INTERVAL);
        let cache_expiration =
            parse_secs(get(ENV_CACHE_EXPIRATION_SECS), DEFAULT_CACHE_EXPIRATION);
        let startup_policy = if parse_bool(get(ENV_STARTUP_OPTIONAL), false) {
            StartupPolicy::Optional
        } else {
            StartupPolicy::Required
        };
        let startup_timeout = parse_secs(get(ENV_STARTUP_TIMEOUT_SECS), Duration::ZERO);
        let watch_key = get(ENV_WATCH_KEY)
            .and_then(sanitize_non_empty)
            .unwrap_or_else(|| DEFAULT_WATCH_KEY.to_string());
        let log_level = get(ENV_LOG_LEVEL)
            .and_then(sanitize_non_empty)
            .map(|level| level.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            source,
            label_filter,
            sentinel_key,
            sentinel_label,
            tick_interval,
            cache_expiration,
            startup_policy,
            startup_timeout,
            watch_key,
            log_level,
        }
    }

    /// Rejects settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.is_none() {
            return Err(ConfigError::MissingSource);
        }
        if self.sentinel_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: ENV_SENTINEL_KEY,
                reason: "sentinel key must not be empty".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                name: ENV_LOG_LEVEL,
                reason: format!("unknown level '{}'", self.log_level),
            });
        }
        Ok(())
    }

    /// Converts the settings into the coordinator's static configuration.
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            label_filter: self.label_filter.clone(),
            sentinels: vec![SentinelRegistration::new(
                self.sentinel_key.clone(),
                self.sentinel_label.clone(),
            )],
            tick_interval: self.tick_interval,
            cache_expiration: self.cache_expiration,
            startup_policy: self.startup_policy,
            startup_timeout: self.startup_timeout,
            ..CoordinatorConfig::default()
        }
    }
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a whole number of seconds, falling back to `default` when absent or malformed.
fn parse_secs(value: Option<&str>, default: Duration) -> Duration {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}
