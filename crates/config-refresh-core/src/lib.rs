//! Public entry points for the config-refresh core crate.
//!
//! The crate keeps an in-process snapshot of key/value configuration in sync
//! with a remote store. A background coordinator polls one or more sentinel
//! entries and re-fetches the full entry set only when a sentinel changes;
//! readers go through a [`SnapshotStore`] and never block on refresh activity.

pub mod config;
pub mod coordinator;
pub mod entry;
pub mod policy;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod telemetry;

pub use config::{ConfigError, RefreshEnv};
pub use coordinator::{
    CoordinatorConfig, CoordinatorSnapshot, InitialLoad, RefreshCoordinator, RefreshError,
    RefreshOutcome, RefreshPhase, RefreshTelemetry, SentinelObservation, SentinelRegistration,
    SentinelSnapshot, StartupPolicy,
};
pub use entry::{ConfigEntry, FeatureFlag, LabelFilter, SentinelKey};
pub use policy::{CacheExpiration, RefreshPolicy};
pub use snapshot::{LookupError, Snapshot, SnapshotError, SnapshotStore};
pub use source::{FetchError, FileSource, InMemorySource, RemoteSource, SourceDocument};
pub use status::{LastOutcome, RefreshStatus, StatusSnapshot};
pub use telemetry::{CompositeTelemetry, CountingTelemetry, TelemetryCounters, TelemetrySnapshot};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Ensures an embedder can wire a coordinator through the crate root alone.
    #[tokio::test]
    async fn coordinator_types_are_reexported() {
        let mut env = RefreshEnv::from_env_iter::<Vec<(String, String)>, _, _>(Vec::new());
        env.source = Some("config.json".into());
        assert!(env.validate().is_ok());

        let source = Arc::new(InMemorySource::with_entries([
            ConfigEntry::new("Sentinel", "1", ""),
            ConfigEntry::new("SomeRandomConfiguration", "hello", ""),
        ]));
        let coordinator = RefreshCoordinator::new(source, env.to_coordinator_config());
        let loaded = coordinator.initialize().await.expect("initial load");
        assert_eq!(
            loaded,
            InitialLoad::Loaded {
                version: 1,
                entries: 2
            }
        );
        assert_eq!(
            coordinator
                .store()
                .get("SomeRandomConfiguration", "")
                .as_deref(),
            Ok("hello")
        );
    }

    /// Verifies the status helpers exported at the crate root remain usable.
    #[tokio::test]
    async fn status_helpers_work_via_reexports() {
        let status = RefreshStatus::new();
        let json = status.to_json().await;
        assert_eq!(
            json.get("lastOutcome").and_then(|v| v.as_str()),
            Some("pending")
        );
    }
}
