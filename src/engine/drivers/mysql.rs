// SPDX-License-Identifier: Apache-2.0

//! MySQL Driver
//!
//! Implements the DataEngine trait for MySQL/MariaDB databases using SQLx.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{
    MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode,
};
use sqlx::{Column as _, Connection as _, Either, Executor, Row, TypeInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::{
    CancelStage, Column, ConnectionConfig, DataEngine, DatabaseHandle, Database, EngineError,
    EngineResult, QueryRequest, QueryResult, Table, Value,
};

use crate::engine::classify::{classify_connect_error, classify_health_error, DialTarget};
use crate::metrics;

const MAX_CONNECTIONS: u32 = 25;
const MIN_IDLE_CONNECTIONS: u32 = 2;
const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// MySQL driver implementation
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    /// `localhost` resolves to `::1` first on some systems while MySQL often
    /// listens on IPv4 only.
    fn dial_host(host: &str) -> &str {
        if host == "localhost" {
            "127.0.0.1"
        } else {
            host
        }
    }

    fn build_options(config: &ConnectionConfig, host: &str) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(config.port)
            .username(&config.username)
            .password(config.password.expose())
            .ssl_mode(if config.ssl {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Disabled
            });

        if !config.database.is_empty() {
            options = options.database(&config.database);
        }
        options
    }
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataEngine for MySqlDriver {
    fn driver_id(&self) -> &'static str {
        "mysql"
    }

    fn driver_name(&self) -> &'static str {
        "MySQL / MariaDB"
    }

    async fn open(&self, config: &ConnectionConfig) -> EngineResult<Arc<dyn DatabaseHandle>> {
        let host = Self::dial_host(&config.host);
        let target = DialTarget::new(config, host);
        let options = Self::build_options(config, host);

        // The pool retries refused dials until its acquire timeout, which would
        // hide the real cause. Probe with a single connection first.
        let probe = async {
            let mut conn = MySqlConnection::connect_with(&options).await?;
            conn.ping().await?;
            conn.close().await
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(error = %err, "MySQL dial failed");
                return Err(classify_connect_error(&err.to_string(), &target));
            }
            Err(_) => return Err(classify_connect_error("connect timed out", &target)),
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_IDLE_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .max_lifetime(MAX_LIFETIME)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_lazy_with(options);

        Ok(Arc::new(MySqlHandle { pool }))
    }
}

/// A pooled MySQL connection bound to one client connection id
pub struct MySqlHandle {
    pool: MySqlPool,
}

impl MySqlHandle {
    fn column_names(row: &MySqlRow) -> Vec<String> {
        row.columns().iter().map(|col| col.name().to_string()).collect()
    }

    fn convert_row(row: &MySqlRow) -> Vec<Value> {
        (0..row.len()).map(|idx| Self::extract_value(row, idx)).collect()
    }

    /// Extracts a cell, dispatching on the declared column type. Anything the
    /// typed decoders reject (zero dates, out-of-range TIME, BIT, spatial)
    /// falls back to the raw bytes.
    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get_raw(idx) {
            Ok(raw) if sqlx::ValueRef::is_null(&raw) => return Value::Null,
            Ok(_) => {}
            Err(_) => return Value::Null,
        }

        let type_name = row.column(idx).type_info().name();
        Self::extract_typed(row, idx, type_name).unwrap_or_else(|| Self::extract_bytes(row, idx))
    }

    fn extract_typed(row: &MySqlRow, idx: usize, type_name: &str) -> Option<Value> {
        match type_name {
            // TINYINT(1) is reported as BOOLEAN but may hold any TINYINT value
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                row.try_get_unchecked::<i64, _>(idx).ok().map(Value::Int)
            }
            name if name.ends_with(" UNSIGNED") => {
                row.try_get_unchecked::<u64, _>(idx).ok().map(Value::UInt)
            }
            "FLOAT" | "DOUBLE" => row.try_get_unchecked::<f64, _>(idx).ok().map(Value::Float),
            "DECIMAL" => row
                .try_get_unchecked::<rust_decimal::Decimal, _>(idx)
                .ok()
                .map(|d| Value::Text(d.to_string())),
            "DATE" => row
                .try_get_unchecked::<chrono::NaiveDate, _>(idx)
                .ok()
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
            "TIME" => row
                .try_get_unchecked::<chrono::NaiveTime, _>(idx)
                .ok()
                .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string())),
            "DATETIME" | "TIMESTAMP" => row
                .try_get_unchecked::<chrono::NaiveDateTime, _>(idx)
                .ok()
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
            "JSON" => row
                .try_get_unchecked::<Vec<u8>, _>(idx)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
                .map(Value::Json),
            _ => None,
        }
    }

    fn extract_bytes(row: &MySqlRow, idx: usize) -> Value {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|bytes| Value::from_bytes(&bytes))
            .unwrap_or(Value::Null)
    }

    /// Column names of a statement whose result set came back empty.
    async fn describe_columns(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<String>> {
        let describe = async {
            (&self.pool).describe(sql).await.map(|described| {
                described
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect::<Vec<_>>()
            })
        };
        bounded_describe(describe, cancel, READ_TIMEOUT).await
    }
}

/// Runs a describe under the same cancellation and read-timeout rules as the
/// statement itself. A describe that fails or times out yields no columns.
async fn bounded_describe<F>(
    describe: F,
    cancel: &CancellationToken,
    limit: Duration,
) -> EngineResult<Vec<String>>
where
    F: std::future::Future<Output = Result<Vec<String>, sqlx::Error>>,
{
    if cancel.is_cancelled() {
        return Err(EngineError::cancelled(CancelStage::DuringExecution));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::cancelled(CancelStage::DuringExecution)),
        described = tokio::time::timeout(limit, describe) => match described {
            Ok(Ok(columns)) => Ok(columns),
            Ok(Err(err)) => {
                debug!(error = %err, "Could not describe empty result set");
                Ok(Vec::new())
            }
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Describe timed out");
                Ok(Vec::new())
            }
        },
    }
}

/// Collects the rows of a possibly multi-statement script.
///
/// Every result set after the first replaces the one before it, so the
/// returned rows always match the returned columns. Affected counts of
/// statements without a result set are summed.
#[derive(Default)]
struct ResultSets {
    columns: Option<Vec<String>>,
    rows: Vec<Vec<Value>>,
    rows_affected: u64,
    current_closed: bool,
    seen_row: bool,
}

impl ResultSets {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn push_row(&mut self, columns: impl FnOnce() -> Vec<String>, row: Vec<Value>) {
        if self.columns.is_none() || self.current_closed {
            self.columns = Some(columns());
            self.rows.clear();
            self.current_closed = false;
        }
        self.seen_row = true;
        self.rows.push(row);
    }

    fn finish_statement(&mut self, rows_affected: u64) {
        if self.columns.is_some() {
            self.current_closed = true;
        }
        self.rows_affected += rows_affected;
    }

    fn cancel_stage(&self) -> CancelStage {
        if self.seen_row {
            CancelStage::DuringFetch
        } else {
            CancelStage::DuringExecution
        }
    }
}

#[async_trait]
impl DatabaseHandle for MySqlHandle {
    async fn version(&self) -> EngineResult<String> {
        sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::execution("failed to get version", e))
    }

    async fn health_check(&self) -> EngineResult<()> {
        let ping = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        };

        match tokio::time::timeout(HEALTH_TIMEOUT, ping).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(classify_health_error(&err.to_string())),
            Err(_) => Err(EngineError::connection_lost(format!(
                "health check failed: no response within {}s",
                HEALTH_TIMEOUT.as_secs()
            ))),
        }
    }

    async fn list_databases(&self) -> EngineResult<Vec<Database>> {
        // Cast to CHAR to avoid BINARY type mismatch with Rust String
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT CAST(SCHEMA_NAME AS CHAR) AS schema_name
            FROM information_schema.SCHEMATA
            ORDER BY SCHEMA_NAME
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::execution("failed to list databases", e))?;

        Ok(rows.into_iter().map(|(name,)| Database::new(name)).collect())
    }

    async fn list_tables(&self, database: &str) -> EngineResult<Vec<Table>> {
        // Statistics-based figures: TABLE_ROWS is an estimate for InnoDB
        let rows: Vec<(String, Option<String>, Option<u64>, Option<u64>, Option<u64>)> =
            sqlx::query_as(
                r#"
                SELECT
                    CAST(TABLE_NAME AS CHAR) AS table_name,
                    CAST(ENGINE AS CHAR) AS engine,
                    CAST(TABLE_ROWS AS UNSIGNED) AS table_rows,
                    CAST(DATA_LENGTH AS UNSIGNED) AS data_length,
                    CAST(INDEX_LENGTH AS UNSIGNED) AS index_length
                FROM information_schema.TABLES
                WHERE TABLE_SCHEMA = ?
                ORDER BY TABLE_NAME
                "#,
            )
            .bind(database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::execution("failed to list tables", e))?;

        let tables = rows
            .into_iter()
            .map(|(name, engine, row_count, data_length, index_length)| Table {
                name,
                row_count: row_count.unwrap_or(0),
                engine: engine.unwrap_or_default(),
                data_length: data_length.unwrap_or(0),
                index_length: index_length.unwrap_or(0),
            })
            .collect();

        Ok(tables)
    }

    async fn list_columns(&self, database: &str, table: &str) -> EngineResult<Vec<Column>> {
        let rows: Vec<(String, String, String, String, Option<String>, String, String)> =
            sqlx::query_as(
                r#"
                SELECT
                    CAST(COLUMN_NAME AS CHAR) AS column_name,
                    CAST(COLUMN_TYPE AS CHAR) AS column_type,
                    CAST(IS_NULLABLE AS CHAR) AS is_nullable,
                    CAST(COLUMN_KEY AS CHAR) AS column_key,
                    CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
                    CAST(EXTRA AS CHAR) AS extra,
                    CAST(COLUMN_COMMENT AS CHAR) AS column_comment
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION
                "#,
            )
            .bind(database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::execution("failed to list columns", e))?;

        let columns = rows
            .into_iter()
            .map(
                |(name, data_type, is_nullable, key, default, extra, comment)| Column {
                    name,
                    data_type,
                    nullable: is_nullable == "YES",
                    key,
                    default,
                    extra,
                    comment,
                },
            )
            .collect();

        Ok(columns)
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> EngineResult<QueryResult> {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled(CancelStage::BeforeExecution));
        }

        let sql = request.effective_sql();
        let start = Instant::now();
        let mut sets = ResultSets::with_capacity(request.row_capacity());

        let mut stream = (&self.pool).fetch_many(sql.as_ref());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::cancelled(sets.cancel_stage())),
                next = tokio::time::timeout(READ_TIMEOUT, stream.try_next()) => next,
            };

            let item = match next {
                Ok(Ok(Some(item))) => item,
                Ok(Ok(None)) => break,
                Ok(Err(err)) => return Err(EngineError::execution("failed to execute query", err)),
                Err(_) => {
                    metrics::record_timeout();
                    warn!(timeout_ms = READ_TIMEOUT.as_millis() as u64, "Query read timed out");
                    return Err(EngineError::timeout(
                        "query read",
                        READ_TIMEOUT.as_millis() as u64,
                    ));
                }
            };

            match item {
                Either::Left(done) => sets.finish_statement(done.rows_affected()),
                Either::Right(row) => {
                    sets.push_row(|| Self::column_names(&row), Self::convert_row(&row))
                }
            }
        }
        drop(stream);

        let ResultSets {
            columns,
            rows,
            rows_affected,
            ..
        } = sets;

        match columns {
            Some(columns) => Ok(QueryResult::from_rows(
                columns,
                rows,
                start.elapsed().as_millis() as u64,
            )),
            None if rows_affected == 0 => {
                // Either an empty result set or a statement that touched nothing
                let described = self.describe_columns(sql.as_ref(), &cancel).await?;
                let elapsed = start.elapsed().as_millis() as u64;
                if described.is_empty() {
                    Ok(QueryResult::from_affected(0, elapsed))
                } else {
                    Ok(QueryResult::from_rows(described, Vec::new(), elapsed))
                }
            }
            None => Ok(QueryResult::from_affected(
                rows_affected,
                start.elapsed().as_millis() as u64,
            )),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
