//! Refresh coordinator public API.
//!
//! [`RefreshCoordinator`] owns the published snapshot and the background loop
//! that keeps it in sync with a [`RemoteSource`]. Consumers read through the
//! [`SnapshotStore`] handle and never see a partially applied refresh.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{CoordinatorConfig, StartupPolicy};
use super::refresh::{CoordinatorShared, LoopHandle, RefreshScope};
use super::state::{CoordinatorSnapshot, CoordinatorState, RefreshPhase};
use super::telemetry::{NoopTelemetry, RefreshTelemetry};
use crate::policy::deadline_after;
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::source::{FetchError, RemoteSource};
use crate::status::RefreshStatus;

/// Error surfaced by refresh attempts.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The source could not answer a sentinel or full fetch.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The fetched entries could not form a valid snapshot.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    /// The initial load did not succeed within the startup window.
    #[error("initial load failed after {attempts} attempt(s): {source}")]
    Startup {
        attempts: u32,
        #[source]
        source: Box<RefreshError>,
    },
}

/// Result of a successful refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A sentinel changed and a new snapshot was published.
    Changed { version: u64, entries: usize },
    /// Every checked sentinel matched its last observation.
    Unchanged,
}

impl RefreshOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Result of [`RefreshCoordinator::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialLoad {
    Loaded { version: u64, entries: usize },
    /// The load failed under [`StartupPolicy::Optional`]; the empty snapshot stays published.
    Empty,
}

/// Keeps a local configuration snapshot in sync with a remote source.
#[derive(Debug, Clone)]
pub struct RefreshCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl RefreshCoordinator {
    /// Builds a coordinator over `source`. The configuration is sanitised up-front.
    pub fn new(source: Arc<dyn RemoteSource>, config: CoordinatorConfig) -> Self {
        let config = config.sanitise();
        let state = CoordinatorState::new(&config);
        let shared = CoordinatorShared {
            source,
            store: SnapshotStore::new(),
            state: Mutex::new(state),
            attempt_lock: Mutex::new(()),
            telemetry: RwLock::new(Arc::new(NoopTelemetry)),
            status: RefreshStatus::new(),
            config,
            running: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Read handle onto the published snapshot.
    pub fn store(&self) -> SnapshotStore {
        self.shared.store.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Status handle shared with embedders.
    pub fn status_handle(&self) -> Arc<RefreshStatus> {
        self.shared.status.clone()
    }

    /// Replaces the telemetry hook used for subsequent refreshes.
    pub async fn set_telemetry(&self, telemetry: Arc<dyn RefreshTelemetry>) {
        *self.shared.telemetry.write().await = telemetry;
    }

    /// Performs the initial load: observes every sentinel, then fetches the full set.
    ///
    /// Attempts repeat every `startup_retry_delay` until one succeeds or
    /// `startup_timeout` elapses. What happens next depends on the
    /// [`StartupPolicy`].
    pub async fn initialize(&self) -> Result<InitialLoad, RefreshError> {
        let config = &self.shared.config;
        let deadline = deadline_after(Instant::now(), config.startup_timeout);
        let mut attempts: u32 = 0;

        let last_error = loop {
            attempts = attempts.saturating_add(1);
            let result = {
                let _attempt = self.shared.attempt_lock.lock().await;
                let result = self.shared.initial_load().await;
                self.shared.set_phase(RefreshPhase::Idle).await;
                result
            };
            match result {
                Ok(outcome) => {
                    self.shared.record_refresh_success(&outcome).await;
                    return Ok(match outcome {
                        RefreshOutcome::Changed { version, entries } => {
                            InitialLoad::Loaded { version, entries }
                        }
                        // initial_load always publishes.
                        RefreshOutcome::Unchanged => InitialLoad::Loaded {
                            version: self.shared.store.version(),
                            entries: self.shared.store.load().len(),
                        },
                    });
                }
                Err(err) => {
                    let now = Instant::now();
                    if deadline_after(now, config.startup_retry_delay) > deadline {
                        break err;
                    }
                    debug!(
                        attempt = attempts,
                        %err,
                        "config-refresh: initial load failed; retrying in {:?}",
                        config.startup_retry_delay
                    );
                    sleep(config.startup_retry_delay).await;
                }
            }
        };

        let error = RefreshError::Startup {
            attempts,
            source: Box::new(last_error),
        };
        self.shared.handle_refresh_error(&error).await;
        match config.startup_policy {
            StartupPolicy::Required => Err(error),
            StartupPolicy::Optional => {
                warn!(
                    %error,
                    "config-refresh: continuing with an empty snapshot; the refresh loop will retry"
                );
                Ok(InitialLoad::Empty)
            }
        }
    }

    /// Spawns the background refresh loop.
    ///
    /// Returns `false` without spawning when a loop is already running.
    pub async fn start(&self) -> bool {
        let mut running = self.shared.running.lock().await;
        if let Some(handle) = running.as_ref() {
            if !handle.join.is_finished() {
                debug!("config-refresh: refresh loop already running");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(
            self.shared
                .clone()
                .run_refresh_loop(cancel.clone()),
        );
        *running = Some(LoopHandle { cancel, join });
        info!(
            sentinels = self.shared.config.sentinels.len(),
            "config-refresh: refresh loop started"
        );
        true
    }

    /// Stops the loop and waits for an in-flight attempt to finish.
    ///
    /// A no-op when the loop is not running.
    pub async fn stop(&self) {
        let handle = self.shared.running.lock().await.take();
        let Some(LoopHandle { cancel, join }) = handle else {
            return;
        };
        cancel.cancel();
        if let Err(err) = join.await {
            warn!("config-refresh: refresh loop task ended abnormally: {err}");
        }
        info!("config-refresh: refresh loop stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.shared
            .running
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.join.is_finished())
    }

    /// Checks every sentinel immediately, ignoring cache expirations.
    pub async fn try_refresh_once(&self) -> Result<RefreshOutcome, RefreshError> {
        self.shared.refresh_and_record(RefreshScope::All).await
    }

    pub async fn phase(&self) -> RefreshPhase {
        self.shared.state.lock().await.phase
    }

    /// Diagnostic copy of the coordinator state.
    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        self.shared.state.lock().await.snapshot()
    }

    /// Time until the earliest sentinel becomes due, or `None` with no sentinels.
    pub async fn next_due_in(&self) -> Option<std::time::Duration> {
        self.shared.next_due_in().await
    }

    #[cfg(test)]
    pub(crate) async fn run_tick(&self) -> super::refresh::TickOutcome {
        self.shared.run_tick(Instant::now()).await
    }
}
