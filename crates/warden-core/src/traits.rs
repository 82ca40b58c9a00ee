// SPDX-License-Identifier: Apache-2.0

//! Driver traits
//!
//! A [`DataEngine`] knows how to dial one kind of database and hands back a
//! [`DatabaseHandle`]: a pooled, concurrency-safe connection bound to one
//! client connection id. Everything the RPC surface does against a database
//! goes through a handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::EngineResult;
use crate::types::{
    is_system_schema, AllTables, Column, ConnectionConfig, Database, QueryRequest, QueryResult,
    Table,
};

#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Descriptor `type` this driver answers to (e.g. "mysql")
    fn driver_id(&self) -> &'static str;

    /// Human-readable driver name
    fn driver_name(&self) -> &'static str;

    /// Opens a pool and verifies it with a round trip.
    ///
    /// Errors are already classified into actionable messages.
    async fn open(&self, config: &ConnectionConfig) -> EngineResult<Arc<dyn DatabaseHandle>>;
}

#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Server version string
    async fn version(&self) -> EngineResult<String>;

    /// Bounded liveness ping
    async fn health_check(&self) -> EngineResult<()>;

    async fn list_databases(&self) -> EngineResult<Vec<Database>>;

    async fn list_tables(&self, database: &str) -> EngineResult<Vec<Table>>;

    async fn list_columns(&self, database: &str, table: &str) -> EngineResult<Vec<Column>>;

    /// Runs `request.effective_sql()`.
    ///
    /// `cancel` must be checked before the statement is sent and while waiting
    /// for each row; either trip returns a cancelled error.
    async fn execute(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> EngineResult<QueryResult>;

    /// Closes the pool. Idempotent.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// Tables of every non-system schema.
    ///
    /// A schema that cannot be listed (typically missing privileges) is logged
    /// and left out; only failing to list the schemas themselves is an error.
    async fn list_all_tables(&self) -> EngineResult<AllTables> {
        let databases = self.list_databases().await?;

        let mut all = BTreeMap::new();
        for database in databases {
            if is_system_schema(&database.name) {
                continue;
            }
            match self.list_tables(&database.name).await {
                Ok(tables) => {
                    all.insert(database.name, tables);
                }
                Err(err) => {
                    warn!(database = %database.name, error = %err, "Failed to load tables, skipping schema");
                }
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    struct FixedHandle {
        databases: Vec<&'static str>,
        forbidden: &'static str,
    }

    #[async_trait]
    impl DatabaseHandle for FixedHandle {
        async fn version(&self) -> EngineResult<String> {
            Ok("8.0.36".into())
        }

        async fn health_check(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn list_databases(&self) -> EngineResult<Vec<Database>> {
            Ok(self.databases.iter().map(|name| Database::new(*name)).collect())
        }

        async fn list_tables(&self, database: &str) -> EngineResult<Vec<Table>> {
            if database == self.forbidden {
                return Err(EngineError::execution(
                    "failed to list tables",
                    "SELECT command denied to user",
                ));
            }
            Ok(vec![Table {
                name: format!("{database}_t"),
                row_count: 1,
                engine: "InnoDB".into(),
                data_length: 16384,
                index_length: 0,
            }])
        }

        async fn list_columns(&self, _database: &str, _table: &str) -> EngineResult<Vec<Column>> {
            Ok(vec![])
        }

        async fn execute(
            &self,
            _request: &QueryRequest,
            _cancel: CancellationToken,
        ) -> EngineResult<QueryResult> {
            Ok(QueryResult::from_affected(0, 0))
        }

        async fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn all_tables_skips_system_and_failing_schemas() {
        let handle = FixedHandle {
            databases: vec!["information_schema", "mysql", "shop", "secret", "sys", "Sys"],
            forbidden: "secret",
        };

        let all = handle.list_all_tables().await.unwrap();
        let names: Vec<&str> = all.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Sys", "shop"]);
        assert_eq!(all["shop"][0].name, "shop_t");
    }
}
