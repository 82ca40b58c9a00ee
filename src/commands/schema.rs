// SPDX-License-Identifier: Apache-2.0

//! Schema Commands
//!
//! Introspection of databases, tables and columns. Listings are served from
//! the metadata cache while fresh; column listings always hit the server.

use serde::Deserialize;

use warden_core::{AllTables, Column, Database, EngineResult, Table};

use super::ConnectionIdParams;
use crate::engine::cache::{self, ALL_TABLES_TTL, DEFAULT_TTL};
use crate::AppState;

/// `{connectionId, database}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseParams {
    pub connection_id: String,
    pub database: String,
}

/// `{connectionId, database, table}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParams {
    pub connection_id: String,
    pub database: String,
    pub table: String,
}

pub async fn list_databases(
    state: &AppState,
    params: ConnectionIdParams,
) -> EngineResult<Vec<Database>> {
    let key = cache::list_databases_key(&params.connection_id);
    if let Some(databases) = state.cache.get::<Vec<Database>>(&key) {
        return Ok(databases);
    }

    let generation = state.cache.generation(&params.connection_id);
    let handle = state.connections.get(&params.connection_id).await?;
    let databases = handle.list_databases().await?;
    state.cache.store(
        &params.connection_id,
        generation,
        key,
        databases.clone(),
        DEFAULT_TTL,
    );
    Ok(databases)
}

pub async fn list_tables(state: &AppState, params: DatabaseParams) -> EngineResult<Vec<Table>> {
    let key = cache::list_tables_key(&params.connection_id, &params.database);
    if let Some(tables) = state.cache.get::<Vec<Table>>(&key) {
        return Ok(tables);
    }

    let generation = state.cache.generation(&params.connection_id);
    let handle = state.connections.get(&params.connection_id).await?;
    let tables = handle.list_tables(&params.database).await?;
    state.cache.store(
        &params.connection_id,
        generation,
        key,
        tables.clone(),
        DEFAULT_TTL,
    );
    Ok(tables)
}

/// Tables of every user schema. Schemas that fail to list are left out.
pub async fn list_all_tables(
    state: &AppState,
    params: ConnectionIdParams,
) -> EngineResult<AllTables> {
    let key = cache::list_all_tables_key(&params.connection_id);
    if let Some(all) = state.cache.get::<AllTables>(&key) {
        return Ok(all);
    }

    let generation = state.cache.generation(&params.connection_id);
    let handle = state.connections.get(&params.connection_id).await?;
    let all = handle.list_all_tables().await?;
    state.cache.store(
        &params.connection_id,
        generation,
        key,
        all.clone(),
        ALL_TABLES_TTL,
    );
    Ok(all)
}

pub async fn list_columns(state: &AppState, params: TableParams) -> EngineResult<Vec<Column>> {
    let handle = state.connections.get(&params.connection_id).await?;
    handle.list_columns(&params.database, &params.table).await
}
