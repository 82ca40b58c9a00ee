// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the Data Warden backend
//!
//! Every driver-level failure is mapped to one of these variants before it
//! leaves the engine layer. The wire layer only ever sees the rendered message
//! and the stable [`EngineError::kind`] tag.

use std::fmt;

use thiserror::Error;

/// Point at which a running query observed its cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelStage {
    BeforeExecution,
    DuringExecution,
    DuringFetch,
}

impl fmt::Display for CancelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeExecution => f.write_str("before execution"),
            Self::DuringExecution => f.write_str("during execution"),
            Self::DuringFetch => f.write_str("during fetch"),
        }
    }
}

/// Unified error type for all engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection could not be established. The message is already actionable.
    #[error("{message}")]
    ConnectionFailed { message: String },

    #[error("{message}")]
    AuthenticationFailed { message: String },

    /// An established connection stopped answering.
    #[error("{message}")]
    ConnectionLost { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("unsupported database type: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    #[error("query not found or already completed: {request_id}")]
    QueryNotFound { request_id: String },

    #[error("query cancelled {stage}")]
    Cancelled { stage: CancelStage },

    #[error("{message}")]
    ExecutionError { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: msg.into() }
    }

    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost { message: msg.into() }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
        }
    }

    pub fn connection_not_found(id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: id.into(),
        }
    }

    pub fn query_not_found(id: impl Into<String>) -> Self {
        Self::QueryNotFound {
            request_id: id.into(),
        }
    }

    pub fn cancelled(stage: CancelStage) -> Self {
        Self::Cancelled { stage }
    }

    /// Wraps a lower-level failure with the operation that produced it,
    /// e.g. `execution("failed to list tables", err)`.
    pub fn execution(context: &str, err: impl fmt::Display) -> Self {
        Self::ExecutionError {
            message: format!("{context}: {err}"),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Stable machine-readable tag sent as `error.data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::Timeout { .. } => "timeout",
            Self::UnsupportedDriver { .. } => "unsupported_driver",
            Self::ConnectionNotFound { .. } => "connection_not_found",
            Self::QueryNotFound { .. } => "query_not_found",
            Self::Cancelled { .. } => "cancelled",
            Self::ExecutionError { .. } => "execution_failed",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_render_lookup_key() {
        assert_eq!(
            EngineError::connection_not_found("conn-1").to_string(),
            "connection not found: conn-1"
        );
        assert_eq!(
            EngineError::query_not_found("req-9").to_string(),
            "query not found or already completed: req-9"
        );
    }

    #[test]
    fn cancellation_is_distinguishable_from_execution_failure() {
        let cancelled = EngineError::cancelled(CancelStage::DuringFetch);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.kind(), "cancelled");
        assert_eq!(cancelled.to_string(), "query cancelled during fetch");

        let failed = EngineError::execution("failed to execute query", "syntax error near 'FORM'");
        assert!(!failed.is_cancelled());
        assert_eq!(failed.kind(), "execution_failed");
        assert_eq!(
            failed.to_string(),
            "failed to execute query: syntax error near 'FORM'"
        );
    }

    #[test]
    fn timeout_names_operation() {
        let err = EngineError::timeout("health check", 5000);
        assert_eq!(err.to_string(), "health check timed out after 5000ms");
    }
}
