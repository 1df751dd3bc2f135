//! Refresh coordinator module facade.
//!
//! Re-exports the coordinator API while wiring the submodules that implement
//! static configuration, state bookkeeping, the scheduling loop and telemetry.

pub(crate) mod config;
mod core;
pub(crate) mod refresh;
pub(crate) mod state;
pub(crate) mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    CoordinatorConfig, SentinelRegistration, StartupPolicy, DEFAULT_CACHE_EXPIRATION,
    DEFAULT_STARTUP_RETRY_DELAY, DEFAULT_TICK_INTERVAL, MAX_INTERVAL, MIN_TICK_INTERVAL,
};
pub use self::core::*;
pub use state::{CoordinatorSnapshot, RefreshPhase, SentinelObservation, SentinelSnapshot};
pub use telemetry::RefreshTelemetry;
