//! Telemetry helpers for the refresh coordinator.
//!
//! Provides drop-in implementations of [`RefreshTelemetry`]. Consumers can use
//! the counting primitives to expose their own metrics, or fan events out to
//! several hooks with [`CompositeTelemetry`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::coordinator::{RefreshError, RefreshTelemetry};

/// Aggregated telemetry counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    refresh_changed: AtomicU64,
    refresh_unchanged: AtomicU64,
    refresh_error: AtomicU64,
    tick_skipped: AtomicU64,
    last_entries: AtomicU64,
    last_version: AtomicU64,
}

impl TelemetryCounters {
    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            refresh_changed: self.refresh_changed.load(Ordering::Relaxed),
            refresh_unchanged: self.refresh_unchanged.load(Ordering::Relaxed),
            refresh_error: self.refresh_error.load(Ordering::Relaxed),
            tick_skipped: self.tick_skipped.load(Ordering::Relaxed),
            last_entries: self.last_entries.load(Ordering::Relaxed),
            last_version: self.last_version.load(Ordering::Relaxed),
        }
    }
}

/// Plain data representation of [`TelemetryCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    /// Refreshes that published a new snapshot.
    pub refresh_changed: u64,
    /// Refreshes where every checked sentinel matched.
    pub refresh_unchanged: u64,
    pub refresh_error: u64,
    /// Ticks that ended without contacting the source.
    pub tick_skipped: u64,
    /// Entry count of the most recently published snapshot.
    pub last_entries: u64,
    /// Version of the most recently published snapshot.
    pub last_version: u64,
}

impl fmt::Display for TelemetrySnapshot {
    /// Formats the snapshot metrics into a comma-separated list for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "refresh_changed={}, refresh_unchanged={}, refresh_error={}, tick_skipped={}, last_entries={}, last_version={}",
            self.refresh_changed,
            self.refresh_unchanged,
            self.refresh_error,
            self.tick_skipped,
            self.last_entries,
            self.last_version
        )
    }
}

/// Telemetry implementation that maintains atomic counters for every signal.
#[derive(Debug, Clone)]
pub struct CountingTelemetry {
    counters: Arc<TelemetryCounters>,
}

impl CountingTelemetry {
    pub fn new(counters: Arc<TelemetryCounters>) -> Self {
        Self { counters }
    }

    pub fn counters(&self) -> Arc<TelemetryCounters> {
        self.counters.clone()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.counters.snapshot()
    }
}

impl Default for CountingTelemetry {
    fn default() -> Self {
        Self::new(Arc::new(TelemetryCounters::default()))
    }
}

impl RefreshTelemetry for CountingTelemetry {
    fn on_refresh_changed(&self, entries: usize, version: u64) {
        self.counters
            .refresh_changed
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .last_entries
            .store(entries as u64, Ordering::Relaxed);
        self.counters
            .last_version
            .store(version, Ordering::Relaxed);
    }

    fn on_refresh_unchanged(&self) {
        self.counters
            .refresh_unchanged
            .fetch_add(1, Ordering::Relaxed);
    }

    fn on_refresh_error(&self, _error: &RefreshError) {
        self.counters.refresh_error.fetch_add(1, Ordering::Relaxed);
    }

    fn on_tick_skipped(&self) {
        self.counters.tick_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans telemetry events out to several hooks in registration order.
#[derive(Clone, Default)]
pub struct CompositeTelemetry {
    sinks: Vec<Arc<dyn RefreshTelemetry>>,
}

impl fmt::Debug for CompositeTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTelemetry")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl CompositeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn RefreshTelemetry>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl RefreshTelemetry for CompositeTelemetry {
    fn on_refresh_changed(&self, entries: usize, version: u64) {
        for sink in &self.sinks {
            sink.on_refresh_changed(entries, version);
        }
    }

    fn on_refresh_unchanged(&self) {
        for sink in &self.sinks {
            sink.on_refresh_unchanged();
        }
    }

    fn on_refresh_error(&self, error: &RefreshError) {
        for sink in &self.sinks {
            sink.on_refresh_error(error);
        }
    }

    fn on_tick_skipped(&self) {
        for sink in &self.sinks {
            sink.on_tick_skipped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchError;

    #[test]
    fn counting_telemetry_tracks_events() {
        let telemetry = CountingTelemetry::default();
        telemetry.on_refresh_changed(4, 2);
        telemetry.on_refresh_unchanged();
        telemetry.on_refresh_unchanged();
        telemetry.on_refresh_error(&RefreshError::Fetch(FetchError::Timeout));
        telemetry.on_tick_skipped();

        let snapshot = telemetry.snapshot();
        assert_eq!(
            snapshot,
            TelemetrySnapshot {
                refresh_changed: 1,
                refresh_unchanged: 2,
                refresh_error: 1,
                tick_skipped: 1,
                last_entries: 4,
                last_version: 2,
            }
        );
        assert_eq!(
            snapshot.to_string(),
            "refresh_changed=1, refresh_unchanged=2, refresh_error=1, tick_skipped=1, last_entries=4, last_version=2"
        );
    }

    #[test]
    fn composite_forwards_to_every_sink() {
        let first = CountingTelemetry::default();
        let second = CountingTelemetry::default();
        let composite = CompositeTelemetry::new()
            .with(Arc::new(first.clone()))
            .with(Arc::new(second.clone()));
        composite.on_tick_skipped();
        composite.on_refresh_changed(1, 1);
        assert_eq!(first.snapshot().tick_skipped, 1);
        assert_eq!(second.snapshot().refresh_changed, 1);
    }
}
