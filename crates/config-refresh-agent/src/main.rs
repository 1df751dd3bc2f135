// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use config_refresh_core::{
    CompositeTelemetry, CountingTelemetry, FileSource, InitialLoad, RefreshCoordinator,
    RefreshEnv, RefreshTelemetry, SnapshotStore,
};

/// Logs the watched key every time a new snapshot is published.
struct WatchedKeyLogger {
    store: SnapshotStore,
    key: String,
    label: String,
}

impl RefreshTelemetry for WatchedKeyLogger {
    fn on_refresh_changed(&self, _entries: usize, version: u64) {
        match self.store.get(&self.key, &self.label) {
            Ok(value) => info!(version, "{} = {}", self.key, value),
            Err(err) => warn!(version, "{err}"),
        }
    }
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let env = RefreshEnv::from_os_env();

    let env_filter = format!("h2=off,hyper=off,{}", env.log_level);
    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("could not parse log level in configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    if let Err(err) = env.validate() {
        error!("Invalid configuration: {err}");
        return ExitCode::FAILURE;
    }
    let Some(path) = env.source.clone() else {
        return ExitCode::FAILURE;
    };

    let source = Arc::new(FileSource::new(path));
    let coordinator = RefreshCoordinator::new(source, env.to_coordinator_config());

    let counters = CountingTelemetry::default();
    let telemetry = CompositeTelemetry::new()
        .with(Arc::new(counters.clone()))
        .with(Arc::new(WatchedKeyLogger {
            store: coordinator.store(),
            key: env.watch_key.clone(),
            label: env.label_filter.single_label().unwrap_or("").to_string(),
        }));
    coordinator.set_telemetry(Arc::new(telemetry)).await;

    match coordinator.initialize().await {
        Ok(InitialLoad::Loaded { version, entries }) => {
            debug!("Initial snapshot v{version} loaded with {entries} entries");
        }
        Ok(InitialLoad::Empty) => {
            warn!("Starting with an empty configuration snapshot");
        }
        Err(err) => {
            error!("Unable to load configuration on startup: {err}");
            return ExitCode::FAILURE;
        }
    }

    coordinator.start().await;

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {err}");
    }

    info!("Shutting down configuration refresh agent");
    coordinator.stop().await;
    info!(
        "Refresh telemetry: {}; status: {}",
        counters.snapshot(),
        coordinator.status_handle().to_json().await
    );
    ExitCode::SUCCESS
}
