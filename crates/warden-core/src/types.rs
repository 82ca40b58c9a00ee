// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the drivers and the RPC surface
//!
//! Field names follow the client's camelCase wire format.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sensitive::Sensitive;
use crate::value::Value;

pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Schemas skipped by the all-tables aggregate. Compared case-sensitively.
pub const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&name)
}

/// Connection descriptor supplied by the client.
///
/// Every field is optional on the wire; a descriptor missing `type` is
/// rejected later as an unsupported driver rather than as malformed params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Sensitive<String>,
    pub database: String,
    pub ssl: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            driver: String::new(),
            host: String::new(),
            port: DEFAULT_MYSQL_PORT,
            username: String::new(),
            password: Sensitive::default(),
            database: String::new(),
            ssl: false,
        }
    }
}

/// Outcome of `testConnection`. Failures are reported here, not as RPC errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(version: String) -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
            version: Some(version),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Table descriptor. Counts and sizes come from engine statistics and are
/// approximate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,
    pub data_length: u64,
    pub index_length: u64,
}

/// Tables of every user schema, keyed by schema name.
pub type AllTables = BTreeMap<String, Vec<Table>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// `executeQuery` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub connection_id: String,
    pub sql: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl QueryRequest {
    /// SQL actually sent to the server. See [`apply_pagination`].
    pub fn effective_sql(&self) -> Cow<'_, str> {
        apply_pagination(&self.sql, self.limit, self.offset)
    }

    /// Initial row buffer size. Only a hint.
    pub fn row_capacity(&self) -> usize {
        const DEFAULT_ROW_CAPACITY: usize = 100;
        const MAX_ROW_CAPACITY: usize = 10_000;

        if self.limit > 0 {
            (self.limit as usize).min(MAX_ROW_CAPACITY)
        } else {
            DEFAULT_ROW_CAPACITY
        }
    }
}

/// Appends ` LIMIT n` (and ` OFFSET m` when `m > 0`) when the caller opted in
/// with a positive limit. A non-positive limit leaves the SQL untouched.
///
/// This is plain text concatenation: the caller owns the statement shape.
pub fn apply_pagination(sql: &str, limit: i64, offset: i64) -> Cow<'_, str> {
    if limit <= 0 {
        return Cow::Borrowed(sql);
    }
    if offset > 0 {
        Cow::Owned(format!("{sql} LIMIT {limit} OFFSET {offset}"))
    } else {
        Cow::Owned(format!("{sql} LIMIT {limit}"))
    }
}

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    /// Positional rows; every row has exactly `columns.len()` cells
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    /// Milliseconds
    pub execution_time: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_rows: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl QueryResult {
    /// Builds the result for a statement that produced a result set.
    /// `rows_affected` mirrors the row count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>, execution_time: u64) -> Self {
        let count = rows.len() as u64;
        Self {
            columns,
            rows,
            rows_affected: count,
            execution_time,
            total_rows: count,
        }
    }

    /// Builds the result for a statement without a result set (DML/DDL).
    pub fn from_affected(rows_affected: u64, execution_time: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected,
            execution_time,
            total_rows: 0,
        }
    }
}
