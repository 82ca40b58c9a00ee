// SPDX-License-Identifier: Apache-2.0

// Data Warden - local database-access daemon
// Core library

pub mod commands;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod observability;
pub mod rpc;

use std::sync::Arc;

use tracing::{error, info, warn};

use config::DaemonConfig;
use engine::drivers::MySqlDriver;
use engine::{ConnectionManager, DriverRegistry, MetadataCache, QueryManager};
use rpc::Dispatcher;

/// Everything the handlers share. Each component owns its own lock.
pub struct AppState {
    pub registry: Arc<DriverRegistry>,
    pub connections: ConnectionManager,
    pub cache: MetadataCache,
    pub queries: QueryManager,
}

impl AppState {
    pub fn new() -> Self {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(MySqlDriver::new()));
        Self::with_registry(registry)
    }

    /// State backed by an arbitrary set of drivers.
    pub fn with_registry(registry: DriverRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            connections: ConnectionManager::new(Arc::clone(&registry)),
            registry,
            cache: MetadataCache::new(),
            queries: QueryManager::new(),
        }
    }

    /// Logs a final metrics summary and closes every connection.
    pub async fn shutdown(&self) {
        let snapshot = metrics::snapshot(self.connections.len().await, self.queries.len());
        info!(
            queries_total = snapshot.queries_total,
            queries_failed = snapshot.queries_failed,
            queries_cancelled = snapshot.queries_cancelled,
            queries_timed_out = snapshot.queries_timed_out,
            cache_hits = snapshot.cache_hits,
            cache_misses = snapshot.cache_misses,
            open_connections = snapshot.open_connections,
            "Session metrics"
        );
        self.connections.close_all().await;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the daemon on stdin/stdout until end of input or a shutdown signal.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let config = DaemonConfig::from_env();
    let _log_guard = observability::init_tracing(&config);

    let state = Arc::new(AppState::new());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        drivers = ?state.registry.list(),
        "Data Warden starting"
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state)));
    let serving = rpc::serve(
        dispatcher,
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.shutdown_grace,
    );

    let exit_code = tokio::select! {
        result = serving => match result {
            Ok(()) => {
                info!("Input closed, shutting down");
                0
            }
            Err(err) => {
                error!(error = %err, "Fatal input error, shutting down");
                1
            }
        },
        signal = shutdown_signal() => {
            info!(signal, "Received shutdown signal");
            0
        }
    };

    state.shutdown().await;
    info!(exit_code, "Data Warden stopped");
    exit_code
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                return tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                };
            }
            Err(err) => warn!(error = %err, "Could not install SIGTERM handler"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not listen for ctrl-c, relying on end of input");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
