// SPDX-License-Identifier: Apache-2.0

//! Connection Commands
//!
//! Commands for managing database connections.

use serde::Serialize;
use tracing::debug;

use warden_core::{ConnectionConfig, ConnectionTestResult, EngineResult};

use super::{ConnectionIdParams, SuccessResponse};
use crate::AppState;

/// Response for `healthCheck`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
}

/// Tests a database connection without registering it
pub async fn test_connection(state: &AppState, config: ConnectionConfig) -> ConnectionTestResult {
    state.connections.test_connection(&config).await
}

/// Opens (or reopens) the connection for `config.id`
pub async fn connect(state: &AppState, config: ConnectionConfig) -> EngineResult<SuccessResponse> {
    let replaced = state.connections.connect(&config).await?;

    let dropped = state.cache.invalidate_connection(&config.id);
    debug!(connection_id = %config.id, replaced, dropped, "Metadata cache reset after connect");

    Ok(SuccessResponse::ok())
}

pub async fn disconnect(
    state: &AppState,
    params: ConnectionIdParams,
) -> EngineResult<SuccessResponse> {
    state.connections.disconnect(&params.connection_id).await?;
    state.cache.invalidate_connection(&params.connection_id);
    Ok(SuccessResponse::ok())
}

pub async fn health_check(
    state: &AppState,
    params: ConnectionIdParams,
) -> EngineResult<HealthResponse> {
    let handle = state.connections.get(&params.connection_id).await?;
    handle.health_check().await?;
    Ok(HealthResponse { healthy: true })
}
