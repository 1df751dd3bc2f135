//! Shared fixtures and utilities for refresh coordinator tests.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use super::{CoordinatorConfig, RefreshCoordinator, SentinelRegistration};
use crate::entry::{ConfigEntry, LabelFilter};
use crate::source::InMemorySource;
use crate::telemetry::CountingTelemetry;

pub(crate) const SENTINEL_KEY: &str = "Sentinel";
pub(crate) const WATCHED_KEY: &str = "SomeRandomConfiguration";

/// Entry set published by the source at sentinel value `sentinel`.
pub(crate) fn entries_at(sentinel: &str, watched: &str) -> Vec<ConfigEntry> {
    vec![
        ConfigEntry::new(SENTINEL_KEY, sentinel, ""),
        ConfigEntry::new(WATCHED_KEY, watched, ""),
        ConfigEntry::new("Colors:Background", "white", ""),
    ]
}

/// Coordinator config with one sentinel and matching tick/expiration intervals.
pub(crate) fn test_config(interval: Duration) -> CoordinatorConfig {
    CoordinatorConfig {
        label_filter: LabelFilter::Any,
        sentinels: vec![SentinelRegistration::new(SENTINEL_KEY, "")],
        tick_interval: interval,
        cache_expiration: interval,
        enforce_limits: false,
        ..CoordinatorConfig::default()
    }
}

/// Coordinator, scripted source and counting telemetry wired together.
pub(crate) struct Harness {
    pub(crate) coordinator: RefreshCoordinator,
    pub(crate) source: Arc<InMemorySource>,
    pub(crate) telemetry: CountingTelemetry,
}

/// Builds a harness whose source starts at sentinel `v1`.
pub(crate) async fn harness(config: CoordinatorConfig) -> Harness {
    let source = Arc::new(InMemorySource::with_entries(entries_at("v1", "hello")));
    let coordinator = RefreshCoordinator::new(source.clone(), config);
    let telemetry = CountingTelemetry::default();
    coordinator.set_telemetry(Arc::new(telemetry.clone())).await;
    Harness {
        coordinator,
        source,
        telemetry,
    }
}

/// Harness that already completed its initial load.
pub(crate) async fn initialized_harness(config: CoordinatorConfig) -> Harness {
    let harness = harness(config).await;
    harness
        .coordinator
        .initialize()
        .await
        .expect("initial load should succeed");
    harness
}
