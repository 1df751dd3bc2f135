//! Refresh loop orchestration.
//!
//! Hosts the shared coordinator internals: the periodic tick loop, the
//! sentinel comparison and full-fetch path, the initial load, and the
//! bookkeeping that turns each outcome into state, status, telemetry and a
//! log line. Higher-level APIs in `core.rs` delegate to these helpers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::state::{CoordinatorState, RefreshErrorLevel, RefreshPhase, SentinelObservation};
use super::telemetry::RefreshTelemetry;
use super::{RefreshError, RefreshOutcome};
use crate::policy::deadline_after;
use crate::snapshot::SnapshotStore;
use crate::source::RemoteSource;
use crate::status::RefreshStatus;

/// Which sentinels an attempt checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshScope {
    /// Only sentinels whose cache expiration elapsed at the given tick instant.
    Due(Instant),
    /// Every sentinel, regardless of expiration.
    All,
}

/// Result of one loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Skipped,
    Changed,
    Unchanged,
    Failed,
}

/// Handle to the spawned loop task.
pub(crate) struct LoopHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) join: JoinHandle<()>,
}

/// Shared coordinator internals used by the loop task and API calls.
pub(crate) struct CoordinatorShared {
    pub(crate) source: Arc<dyn RemoteSource>,
    /// Snapshot published to consumers; only this coordinator replaces it.
    pub(crate) store: SnapshotStore,
    pub(super) state: Mutex<CoordinatorState>,
    /// Serializes refresh attempts, including their bookkeeping, so only one
    /// fetch/replace runs at a time.
    pub(super) attempt_lock: Mutex<()>,
    pub(crate) telemetry: RwLock<Arc<dyn RefreshTelemetry>>,
    pub(crate) status: Arc<RefreshStatus>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) running: Mutex<Option<LoopHandle>>,
}

impl std::fmt::Debug for CoordinatorShared {
    /// Keeps debug output concise by only printing static config details.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorShared")
            .field("config", &self.config)
            .finish()
    }
}

impl CoordinatorShared {
    /// Runs the tick loop until `cancel` fires.
    ///
    /// Cancellation is only observed while waiting for the next tick, so an
    /// attempt that already started always runs to completion. Each tick is
    /// evaluated at its scheduled instant, which keeps expirations aligned
    /// with the tick grid however long the previous attempt took.
    pub(crate) async fn run_refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.tick_interval;
        let mut ticker = interval_at(deadline_after(Instant::now(), period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "config-refresh: refresh loop started with tick interval {:?}",
            period
        );
        loop {
            let scheduled = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("config-refresh: refresh loop shutting down");
                    break;
                }
                scheduled = ticker.tick() => scheduled,
            };
            self.run_tick(scheduled).await;
        }
    }

    /// Executes the tick scheduled at `now`: skip when nothing is due,
    /// otherwise attempt a refresh.
    ///
    /// The due check runs under the attempt lock, so a manual refresh that
    /// finished while this tick waited turns it into a skip.
    pub(crate) async fn run_tick(&self, now: Instant) -> TickOutcome {
        let _attempt = self.attempt_lock.lock().await;
        let due = {
            let guard = self.state.lock().await;
            !guard.due_sentinels(now).is_empty()
        };
        if !due {
            debug!("config-refresh: no sentinel due; skipping tick");
            self.telemetry.read().await.clone().on_tick_skipped();
            return TickOutcome::Skipped;
        }

        match self.attempt_and_record(RefreshScope::Due(now)).await {
            Ok(RefreshOutcome::Changed { .. }) => TickOutcome::Changed,
            Ok(RefreshOutcome::Unchanged) => TickOutcome::Unchanged,
            Err(_) => TickOutcome::Failed,
        }
    }

    /// Performs an attempt and records its outcome in state, status, telemetry and logs.
    pub(crate) async fn refresh_and_record(
        &self,
        scope: RefreshScope,
    ) -> Result<RefreshOutcome, RefreshError> {
        let _attempt = self.attempt_lock.lock().await;
        self.attempt_and_record(scope).await
    }

    /// Body of [`Self::refresh_and_record`]; the caller holds `attempt_lock`.
    async fn attempt_and_record(&self, scope: RefreshScope) -> Result<RefreshOutcome, RefreshError> {
        let result = self.perform_refresh(scope).await;
        match &result {
            Ok(outcome) => self.record_refresh_success(outcome).await,
            Err(err) => self.handle_refresh_error(err).await,
        }
        self.set_phase(RefreshPhase::Idle).await;
        result
    }

    /// Checks sentinels in `scope` and, if any changed, fetches and publishes a new snapshot.
    ///
    /// Sentinel observations are committed only after the new snapshot is
    /// published, so a failed full fetch is retried on the next due tick.
    /// Checked sentinels are stamped with the instant the attempt started.
    /// The caller holds `attempt_lock`.
    async fn perform_refresh(&self, scope: RefreshScope) -> Result<RefreshOutcome, RefreshError> {
        let (started, checks) = {
            let mut guard = self.state.lock().await;
            let (started, indices) = match scope {
                RefreshScope::Due(now) => (now, guard.due_sentinels(now)),
                RefreshScope::All => (Instant::now(), guard.all_sentinels()),
            };
            guard.phase = RefreshPhase::Checking;
            (started, guard.checks_for(&indices))
        };
        let checked: Vec<usize> = checks.iter().map(|(index, _, _)| *index).collect();

        let mut observations = Vec::with_capacity(checks.len());
        let mut changed = Vec::new();
        for (index, key, previous) in checks {
            let current = match self.source.fetch_sentinel(&key).await {
                Ok(value) => value,
                Err(err) => {
                    self.finish_attempt(&checked, started, RefreshPhase::Failed).await;
                    return Err(err.into());
                }
            };
            if !previous.matches(current.as_deref()) {
                debug!(
                    sentinel = %key,
                    "config-refresh: sentinel changed since last observation"
                );
                changed.push(key);
            }
            observations.push((index, SentinelObservation::from_fetch(current)));
        }

        if changed.is_empty() {
            self.finish_attempt(&checked, started, RefreshPhase::Unchanged).await;
            return Ok(RefreshOutcome::Unchanged);
        }

        self.set_phase(RefreshPhase::Applying).await;
        let published = match self.fetch_and_publish().await {
            Ok(published) => published,
            Err(err) => {
                self.finish_attempt(&checked, started, RefreshPhase::Failed).await;
                return Err(err);
            }
        };

        {
            let mut guard = self.state.lock().await;
            guard.commit_observations(observations);
        }
        self.finish_attempt(&checked, started, RefreshPhase::Applying).await;
        Ok(published)
    }

    /// Initial population: observe every sentinel, then fetch and publish.
    ///
    /// The caller holds `attempt_lock`.
    pub(crate) async fn initial_load(&self) -> Result<RefreshOutcome, RefreshError> {
        let started = Instant::now();
        let checks = {
            let mut guard = self.state.lock().await;
            guard.phase = RefreshPhase::Checking;
            let indices = guard.all_sentinels();
            guard.checks_for(&indices)
        };
        let checked: Vec<usize> = checks.iter().map(|(index, _, _)| *index).collect();

        let mut observations = Vec::with_capacity(checks.len());
        for (index, key, _) in checks {
            match self.source.fetch_sentinel(&key).await {
                Ok(value) => observations.push((index, SentinelObservation::from_fetch(value))),
                Err(err) => {
                    self.finish_attempt(&checked, started, RefreshPhase::Failed).await;
                    return Err(err.into());
                }
            }
        }

        self.set_phase(RefreshPhase::Applying).await;
        let published = match self.fetch_and_publish().await {
            Ok(published) => published,
            Err(err) => {
                self.finish_attempt(&checked, started, RefreshPhase::Failed).await;
                return Err(err);
            }
        };
        {
            let mut guard = self.state.lock().await;
            guard.commit_observations(observations);
        }
        self.finish_attempt(&checked, started, RefreshPhase::Applying).await;
        Ok(published)
    }

    /// Fetches the full entry set for the configured filter and swaps it in.
    async fn fetch_and_publish(&self) -> Result<RefreshOutcome, RefreshError> {
        debug!(
            filter = %self.config.label_filter,
            "config-refresh: fetching full entry set"
        );
        let entries = self.source.fetch_all(&self.config.label_filter).await?;
        let version = self.store.replace_entries(entries)?;
        let entries = self.store.load().len();
        Ok(RefreshOutcome::Changed { version, entries })
    }

    /// Stamps the checked sentinels with `started` and moves the state machine to `phase`.
    async fn finish_attempt(&self, checked: &[usize], started: Instant, phase: RefreshPhase) {
        let mut guard = self.state.lock().await;
        guard.mark_checked(checked, started);
        guard.phase = phase;
    }

    pub(crate) async fn set_phase(&self, phase: RefreshPhase) {
        self.state.lock().await.phase = phase;
    }

    /// Records a successful attempt and emits the per-tick status line.
    pub(crate) async fn record_refresh_success(&self, outcome: &RefreshOutcome) {
        {
            let mut guard = self.state.lock().await;
            guard.handle_refresh_success(Instant::now());
        }
        let telemetry = self.telemetry.read().await.clone();
        match *outcome {
            RefreshOutcome::Changed { version, entries } => {
                info!(entries, version, "config-refresh: refreshed");
                telemetry.on_refresh_changed(entries, version);
            }
            RefreshOutcome::Unchanged => {
                debug!("config-refresh: no change");
                telemetry.on_refresh_unchanged();
            }
        }
        self.status
            .record_success(outcome, self.store.version())
            .await;
    }

    /// Records a failed attempt; the loop keeps running and retries next tick.
    pub(crate) async fn handle_refresh_error(&self, error: &RefreshError) {
        let level = {
            let mut guard = self.state.lock().await;
            guard.handle_refresh_error(error)
        };

        match level {
            RefreshErrorLevel::Debug => {
                debug!(%error, "config-refresh: refresh failed");
            }
            RefreshErrorLevel::Warn => {
                warn!(%error, "config-refresh: refresh failed");
            }
            RefreshErrorLevel::Error => {
                error!(%error, "config-refresh: refresh failed");
            }
        }

        let telemetry = self.telemetry.read().await.clone();
        telemetry.on_refresh_error(error);
        self.status.record_error(error).await;
    }

    /// Time until the earliest sentinel becomes due.
    pub(crate) async fn next_due_in(&self) -> Option<Duration> {
        self.state.lock().await.next_due_in(Instant::now())
    }
}
