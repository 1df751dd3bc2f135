//! Immutable configuration snapshots and the atomically swapped store.
//!
//! The store holds a single `Arc<Snapshot>` behind an [`ArcSwap`]. Readers
//! load the pointer and work against a complete, internally consistent entry
//! set; the coordinator publishes a new snapshot wholesale and never mutates
//! one in place. Readers therefore never wait on refresh activity and cannot
//! observe a partially applied entry set.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::time::Instant;

use crate::entry::{ConfigEntry, FEATURE_FLAG_PREFIX};

/// Raised when an entry set cannot form a valid snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// The same `(key, label)` pair appeared twice in one entry set.
    #[error("duplicate entry for key '{key}' with label '{label}'")]
    DuplicateEntry { key: String, label: String },
}

/// Returned to consumers when a lookup misses the current snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no value for key '{key}' with label '{label}'")]
    NotFound { key: String, label: String },
}

/// Complete set of entries valid at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// label -> key -> entry
    entries: HashMap<String, HashMap<String, ConfigEntry>>,
    len: usize,
    version: u64,
    loaded_at: Instant,
}

impl Snapshot {
    /// Returns the empty snapshot a store starts with (version 0).
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            len: 0,
            version: 0,
            loaded_at: Instant::now(),
        }
    }

    /// Builds a snapshot, rejecting duplicate `(key, label)` pairs.
    pub fn from_entries<I>(entries: I) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = ConfigEntry>,
    {
        let mut by_label: HashMap<String, HashMap<String, ConfigEntry>> = HashMap::new();
        let mut len = 0;
        for entry in entries {
            let scope = by_label.entry(entry.label.clone()).or_default();
            if scope.contains_key(&entry.key) {
                return Err(SnapshotError::DuplicateEntry {
                    key: entry.key,
                    label: entry.label,
                });
            }
            scope.insert(entry.key.clone(), entry);
            len += 1;
        }
        Ok(Self {
            entries: by_label,
            len,
            version: 0,
            loaded_at: Instant::now(),
        })
    }

    /// Looks up the entry stored for `(key, label)`.
    pub fn entry(&self, key: &str, label: &str) -> Option<&ConfigEntry> {
        self.entries.get(label).and_then(|scope| scope.get(key))
    }

    /// Looks up the value stored for `(key, label)`.
    pub fn get(&self, key: &str, label: &str) -> Option<&str> {
        self.entry(key, label).map(|entry| entry.value.as_str())
    }

    /// Returns the value from the first label in `labels` that defines `key`.
    pub fn resolve<'a, L>(&'a self, key: &str, labels: L) -> Option<&'a str>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        labels
            .into_iter()
            .find_map(|label| self.get(key, label.as_ref()))
    }

    /// Returns whether the named feature flag is enabled under `label`.
    ///
    /// Missing or malformed flags read as disabled.
    pub fn is_feature_enabled(&self, name: &str, label: &str) -> bool {
        let key = format!("{FEATURE_FLAG_PREFIX}{name}");
        self.entry(&key, label)
            .and_then(ConfigEntry::feature_flag)
            .map(|flag| flag.enabled)
            .unwrap_or(false)
    }

    /// Iterates over every entry in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.values().flat_map(|scope| scope.values())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Publication counter assigned by the store (0 for the initial empty snapshot).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Instant the snapshot was built.
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shared handle to the current snapshot.
///
/// Cloning the store is cheap; every clone observes the same snapshot.
/// Consumers only get the read side. Publishing is crate-private and driven
/// by the refresh coordinator, so publications are serialized:
///
/// ```compile_fail
/// let store = config_refresh_core::SnapshotStore::new();
/// store.replace_entries(Vec::<config_refresh_core::ConfigEntry>::new());
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    current: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotStore {
    /// Creates a store holding the empty snapshot.
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Snapshot::empty())),
        }
    }

    /// Atomically publishes `snapshot`, returning the version assigned to it.
    pub(crate) fn replace(&self, mut snapshot: Snapshot) -> u64 {
        let version = self.current.load().version + 1;
        snapshot.version = version;
        self.current.store(Arc::new(snapshot));
        version
    }

    /// Builds a snapshot from `entries` and publishes it. On error the current
    /// snapshot stays in place.
    pub(crate) fn replace_entries<I>(&self, entries: I) -> Result<u64, SnapshotError>
    where
        I: IntoIterator<Item = ConfigEntry>,
    {
        Ok(self.replace(Snapshot::from_entries(entries)?))
    }

    /// Returns the current snapshot. Multi-key reads should go through one
    /// loaded snapshot to stay consistent.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Reads a single value from the current snapshot.
    pub fn get(&self, key: &str, label: &str) -> Result<String, LookupError> {
        self.current
            .load()
            .get(key, label)
            .map(str::to_owned)
            .ok_or_else(|| LookupError::NotFound {
                key: key.to_string(),
                label: label.to_string(),
            })
    }

    /// Label-precedence lookup against the current snapshot.
    pub fn resolve<L>(&self, key: &str, labels: L) -> Option<String>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        self.current.load().resolve(key, labels).map(str::to_owned)
    }

    /// Feature-flag lookup against the current snapshot.
    pub fn is_feature_enabled(&self, name: &str, label: &str) -> bool {
        self.current.load().is_feature_enabled(name, label)
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<ConfigEntry> {
        vec![
            ConfigEntry::new("Foo", "base", ""),
            ConfigEntry::new("Foo", "prod", "production"),
            ConfigEntry::new("Bar", "only-base", ""),
        ]
    }

    #[test]
    fn store_starts_empty_at_version_zero() {
        let store = SnapshotStore::new();
        assert_eq!(store.version(), 0);
        assert!(store.load().is_empty());
        assert_eq!(
            store.get("Foo", ""),
            Err(LookupError::NotFound {
                key: "Foo".into(),
                label: "".into()
            })
        );
    }

    #[test]
    fn duplicate_key_label_pairs_are_rejected() {
        let result = Snapshot::from_entries(vec![
            ConfigEntry::new("Foo", "a", "prod"),
            ConfigEntry::new("Foo", "b", "prod"),
        ]);
        assert_eq!(
            result.unwrap_err(),
            SnapshotError::DuplicateEntry {
                key: "Foo".into(),
                label: "prod".into()
            }
        );
    }

    #[test]
    fn same_key_under_different_labels_is_allowed() {
        let snapshot = Snapshot::from_entries(entries()).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("Foo", ""), Some("base"));
        assert_eq!(snapshot.get("Foo", "production"), Some("prod"));
        assert_eq!(snapshot.get("Foo", "staging"), None);
    }

    #[test]
    fn replace_swaps_whole_snapshot_and_bumps_version() {
        let store = SnapshotStore::new();
        let reader = store.clone();
        let before = reader.load();

        let version = store.replace(Snapshot::from_entries(entries()).unwrap());
        assert_eq!(version, 1);
        assert_eq!(reader.get("Foo", "").unwrap(), "base");
        // A snapshot loaded earlier keeps its own contents.
        assert!(before.is_empty());

        let version = store.replace(
            Snapshot::from_entries(vec![ConfigEntry::new("Foo", "next", "")]).unwrap(),
        );
        assert_eq!(version, 2);
        assert_eq!(reader.get("Foo", "").unwrap(), "next");
        assert!(reader.get("Bar", "").is_err());
    }

    #[test]
    fn resolve_honours_label_precedence() {
        let snapshot = Snapshot::from_entries(entries()).unwrap();
        assert_eq!(snapshot.resolve("Foo", ["production", ""]), Some("prod"));
        assert_eq!(snapshot.resolve("Bar", ["production", ""]), Some("only-base"));
        assert_eq!(snapshot.resolve("Baz", ["production", ""]), None);
    }

    #[test]
    fn feature_flags_read_through_snapshot() {
        let store = SnapshotStore::new();
        store.replace(
            Snapshot::from_entries(vec![
                ConfigEntry::feature_flag_entry("Beta", true, ""),
                ConfigEntry::feature_flag_entry("Legacy", false, ""),
            ])
            .unwrap(),
        );
        assert!(store.is_feature_enabled("Beta", ""));
        assert!(!store.is_feature_enabled("Legacy", ""));
        assert!(!store.is_feature_enabled("Missing", ""));
        assert!(!store.is_feature_enabled("Beta", "prod"));
    }

    #[test]
    fn failed_replace_keeps_current_snapshot() {
        let store = SnapshotStore::new();
        store.replace_entries(entries()).unwrap();
        let err = store
            .replace_entries(vec![
                ConfigEntry::new("Foo", "a", ""),
                ConfigEntry::new("Foo", "b", ""),
            ])
            .unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateEntry { .. }));
        assert_eq!(store.version(), 1);
        assert_eq!(store.get("Foo", "").unwrap(), "base");
    }

    #[test]
    fn readers_never_observe_a_mixed_snapshot() {
        let store = SnapshotStore::new();
        store
            .replace_entries(vec![
                ConfigEntry::new("A", "0", ""),
                ConfigEntry::new("B", "0", ""),
            ])
            .unwrap();

        let reader = store.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..10_000 {
                let snapshot = reader.load();
                assert_eq!(snapshot.get("A", ""), snapshot.get("B", ""));
            }
        });
        for generation in 1..1_000 {
            let value = generation.to_string();
            store
                .replace_entries(vec![
                    ConfigEntry::new("A", value.clone(), ""),
                    ConfigEntry::new("B", value, ""),
                ])
                .unwrap();
        }
        handle.join().unwrap();
    }
}
