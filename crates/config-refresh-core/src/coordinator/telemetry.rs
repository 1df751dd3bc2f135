//! Coordinator telemetry hooks.
//!
//! Embedders implement [`RefreshTelemetry`] to observe tick outcomes without
//! reaching into coordinator internals. Every method defaults to a no-op.

use super::RefreshError;

/// Telemetry hook invoked on refresh events.
pub trait RefreshTelemetry: Send + Sync {
    /// Called after a changed sentinel led to a new snapshot being published.
    fn on_refresh_changed(&self, _entries: usize, _version: u64) {}
    /// Called when every checked sentinel matched its last observed value.
    fn on_refresh_unchanged(&self) {}
    /// Called when a refresh attempt fails.
    fn on_refresh_error(&self, _error: &RefreshError) {}
    /// Called when a tick ends without contacting the source because nothing was due.
    fn on_tick_skipped(&self) {}
}

/// Default telemetry implementation that performs no-ops.
#[derive(Debug, Default)]
pub(crate) struct NoopTelemetry;

impl RefreshTelemetry for NoopTelemetry {}
