//! Lightweight status helpers used to expose refresh health (last outcome,
//! snapshot version, failure streak and last error) to embedders.
//!
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::coordinator::{RefreshError, RefreshOutcome};

/// Outcome of the most recent refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOutcome {
    /// No attempt has completed yet.
    Pending,
    Changed,
    Unchanged,
    Failed,
}

impl LastOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

/// Tracks the outcome of refresh attempts for status reporting.
#[derive(Debug)]
pub struct RefreshStatus {
    snapshot_version: AtomicU64,
    consecutive_failures: AtomicU32,
    last_outcome: RwLock<LastOutcome>,
    last_error: RwLock<Option<String>>,
}

impl RefreshStatus {
    /// Creates a reference-counted status handle with no recorded attempt.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot_version: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_outcome: RwLock::new(LastOutcome::Pending),
            last_error: RwLock::new(None),
        })
    }

    /// Version of the snapshot published by the last successful attempt.
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub async fn last_outcome(&self) -> LastOutcome {
        *self.last_outcome.read().await
    }

    /// Returns the last refresh error recorded (cleared by the next success).
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub(crate) async fn record_success(&self, outcome: &RefreshOutcome, snapshot_version: u64) {
        self.snapshot_version
            .store(snapshot_version, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_outcome.write().await = match outcome {
            RefreshOutcome::Changed { .. } => LastOutcome::Changed,
            RefreshOutcome::Unchanged => LastOutcome::Unchanged,
        };
        *self.last_error.write().await = None;
    }

    pub(crate) async fn record_error(&self, error: &RefreshError) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_outcome.write().await = LastOutcome::Failed;
        *self.last_error.write().await = Some(error.to_string());
    }

    /// Returns a status snapshot suitable for logging/exporting.
    pub async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            last_outcome: self.last_outcome().await,
            snapshot_version: self.snapshot_version(),
            consecutive_failures: self.consecutive_failures(),
            last_error: self.last_error().await,
        }
    }

    pub async fn to_json(&self) -> Value {
        self.snapshot().await.to_json()
    }
}

/// Plain representation of [`RefreshStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub last_outcome: LastOutcome,
    pub snapshot_version: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Renders the snapshot as a JSON map with camelCase keys.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "lastOutcome".into(),
            Value::String(self.last_outcome.as_str().into()),
        );
        map.insert("snapshotVersion".into(), Value::from(self.snapshot_version));
        map.insert(
            "consecutiveFailures".into(),
            Value::from(self.consecutive_failures),
        );
        map.insert(
            "lastError".into(),
            match &self.last_error {
                Some(err) => Value::String(err.clone()),
                None => Value::Null,
            },
        );
        map
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchError;
    use serde_json::json;

    #[tokio::test]
    async fn status_tracks_failures_until_success() {
        let status = RefreshStatus::new();
        assert_eq!(status.last_outcome().await, LastOutcome::Pending);

        let error = RefreshError::Fetch(FetchError::Timeout);
        status.record_error(&error).await;
        status.record_error(&error).await;
        assert_eq!(status.consecutive_failures(), 2);
        assert_eq!(status.last_outcome().await, LastOutcome::Failed);
        assert!(status.last_error().await.is_some());

        status
            .record_success(
                &RefreshOutcome::Changed {
                    version: 3,
                    entries: 2,
                },
                3,
            )
            .await;
        assert_eq!(status.consecutive_failures(), 0);
        assert_eq!(status.snapshot_version(), 3);
        assert!(status.last_error().await.is_none());
    }

    #[tokio::test]
    /// Verifies the exported JSON layout.
    async fn status_snapshot_renders_json() {
        let status = RefreshStatus::new();
        status
            .record_error(&RefreshError::Fetch(FetchError::Unavailable("503".into())))
            .await;
        let json = status.to_json().await;
        assert_eq!(
            json,
            json!({
                "lastOutcome": "failed",
                "snapshotVersion": 0,
                "consecutiveFailures": 1,
                "lastError": "fetch failed: remote source unavailable: 503",
            })
        );
    }
}
