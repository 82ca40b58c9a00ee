// SPDX-License-Identifier: Apache-2.0

//! Query Commands
//!
//! Commands for executing and cancelling queries.

use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, field, instrument};

use warden_core::{EngineResult, QueryRequest, QueryResult};

use super::SuccessResponse;
use crate::metrics;
use crate::AppState;

/// Leading keywords of statements that change what introspection returns
const SCHEMA_CHANGING_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER", "RENAME", "TRUNCATE"];

/// `{requestId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelParams {
    pub request_id: String,
}

/// Executes a query, registered under the RPC request id so `cancelQuery`
/// can reach it.
#[instrument(
    skip(state, request),
    fields(
        connection_id = %request.connection_id,
        sql_len = request.sql.len(),
        elapsed_ms = field::Empty
    )
)]
pub async fn execute_query(
    state: &AppState,
    request_id: &str,
    request: QueryRequest,
) -> EngineResult<QueryResult> {
    let handle = state.connections.get(&request.connection_id).await?;

    let started = Instant::now();
    let result = {
        let guard = state.queries.register(request_id, &request.sql);
        handle.execute(&request, guard.token()).await
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::Span::current().record("elapsed_ms", elapsed_ms);

    match &result {
        Ok(_) => {
            metrics::record_query(elapsed_ms, true);
            if is_schema_change(&request.sql) {
                let dropped = state.cache.invalidate_connection(&request.connection_id);
                debug!(dropped, "Schema changed, metadata cache invalidated");
            }
        }
        // counted by cancel_query
        Err(err) if err.is_cancelled() => debug!(error = %err, "Query cancelled"),
        Err(err) => {
            metrics::record_query(elapsed_ms, false);
            debug!(error = %err, "Query failed");
        }
    }

    result
}

/// Signals a running query to stop. Does not wait for it.
pub async fn cancel_query(
    state: &AppState,
    params: CancelParams,
) -> EngineResult<SuccessResponse> {
    state.queries.cancel(&params.request_id)?;
    metrics::record_cancel();
    Ok(SuccessResponse::ok())
}

/// True when the statement's first keyword alters schema objects.
fn is_schema_change(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    SCHEMA_CHANGING_KEYWORDS
        .iter()
        .any(|candidate| keyword.eq_ignore_ascii_case(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_change_detection() {
        assert!(is_schema_change("CREATE TABLE t (id INT)"));
        assert!(is_schema_change("  drop table t"));
        assert!(is_schema_change("\nAlter table t add c int"));
        assert!(is_schema_change("TRUNCATE t"));
        assert!(is_schema_change("rename table a to b"));

        assert!(!is_schema_change("SELECT * FROM created_at_log"));
        assert!(!is_schema_change("INSERT INTO t VALUES (1)"));
        assert!(!is_schema_change("CREATED"));
        assert!(!is_schema_change(""));
    }
}
