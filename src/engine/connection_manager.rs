// SPDX-License-Identifier: Apache-2.0

//! Connection Manager
//!
//! Owns every live database handle, keyed by the client's connection id.
//! This is the single source of truth for connection state: at most one
//! handle per id, and replaced or removed handles are always closed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use warden_core::{
    ConnectionConfig, ConnectionTestResult, DatabaseHandle, EngineError, EngineResult,
};

use crate::engine::DriverRegistry;

pub struct ConnectionManager {
    registry: Arc<DriverRegistry>,
    handles: RwLock<HashMap<String, Arc<dyn DatabaseHandle>>>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Dials, probes the server version, and closes again.
    ///
    /// Failures are part of the result: the client renders them inline.
    #[instrument(
        skip(self, config),
        fields(connection_id = %config.id, driver = %config.driver, host = %config.host, port = config.port)
    )]
    pub async fn test_connection(&self, config: &ConnectionConfig) -> ConnectionTestResult {
        let handle = match self.open(config).await {
            Ok(handle) => handle,
            Err(err) => return ConnectionTestResult::failed(err.to_string()),
        };

        let result = match handle.version().await {
            Ok(version) => ConnectionTestResult::ok(version),
            Err(err) => {
                ConnectionTestResult::failed(format!("Connected but failed to get version: {err}"))
            }
        };
        handle.close().await;
        result
    }

    /// Opens a handle for `config.id`, replacing and closing any previous one.
    ///
    /// Returns true when an existing handle was replaced.
    #[instrument(
        skip(self, config),
        fields(
            connection_id = %config.id,
            driver = %config.driver,
            host = %config.host,
            port = config.port,
            username = %config.username,
            has_password = !config.password.is_empty()
        )
    )]
    pub async fn connect(&self, config: &ConnectionConfig) -> EngineResult<bool> {
        let handle = self.open(config).await?;

        let previous = {
            let mut handles = self.handles.write().await;
            handles.insert(config.id.clone(), handle)
        };

        let replaced = previous.is_some();
        if let Some(previous) = previous {
            previous.close().await;
            info!("Closed previous handle for reused connection id");
        }
        info!("Connection established");
        Ok(replaced)
    }

    /// Closes and forgets a handle. Unknown ids are an error.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, connection_id: &str) -> EngineResult<()> {
        let handle = {
            let mut handles = self.handles.write().await;
            handles
                .remove(connection_id)
                .ok_or_else(|| EngineError::connection_not_found(connection_id))?
        };

        handle.close().await;
        info!("Connection closed");
        Ok(())
    }

    /// Looks up the live handle for a connection id.
    pub async fn get(&self, connection_id: &str) -> EngineResult<Arc<dyn DatabaseHandle>> {
        let handles = self.handles.read().await;
        handles
            .get(connection_id)
            .cloned()
            .ok_or_else(|| EngineError::connection_not_found(connection_id))
    }

    /// Closes every handle. Used at shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn DatabaseHandle>)> = {
            let mut handles = self.handles.write().await;
            handles.drain().collect()
        };

        info!(count = drained.len(), "Shutting down, closing all connections");
        for (id, handle) in drained {
            handle.close().await;
            info!(connection_id = %id, "Closed connection");
        }
    }

    pub async fn contains(&self, connection_id: &str) -> bool {
        self.handles.read().await.contains_key(connection_id)
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    async fn open(&self, config: &ConnectionConfig) -> EngineResult<Arc<dyn DatabaseHandle>> {
        let driver = self.registry.resolve(&config.driver)?;
        driver.open(config).await
    }
}
