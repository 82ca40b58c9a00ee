// SPDX-License-Identifier: Apache-2.0

//! Method routing.
//!
//! Turns one decoded [`Request`] into one [`Response`]. Params stay raw until
//! the method is known, so an unknown method is reported before any param
//! validation. Handler panics are caught here and never reach the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::{debug, error, instrument};

use warden_core::protocol::{Request, Response, RpcError};
use warden_core::{EngineError, EngineResult};

use crate::commands::{connection, metrics, query, schema};
use crate::AppState;

pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    #[instrument(skip(self, request), fields(method = %request.method, request_id = %request.id))]
    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            id, method, params, ..
        } = request;
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.dispatch(&id, &method, params.as_deref()))
            .catch_unwind()
            .await;

        let result = outcome.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!(%message, "Handler panicked");
            Err(EngineError::internal(message).into())
        });

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                debug!(elapsed_ms, "Request completed");
                Response::success(id, value)
            }
            Err(err) => {
                debug!(elapsed_ms, code = err.code, error = %err.message, "Request failed");
                Response::failure(id, err)
            }
        }
    }

    async fn dispatch(
        &self,
        id: &str,
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<serde_json::Value, RpcError> {
        let state = self.state.as_ref();

        match method {
            "ping" => Ok(serde_json::json!({ "status": "ok" })),

            // Connection lifecycle
            "testConnection" => {
                to_json(connection::test_connection(state, parse_params(params)?).await)
            }
            "connect" => respond(connection::connect(state, parse_params(params)?).await),
            "disconnect" => respond(connection::disconnect(state, parse_params(params)?).await),
            "healthCheck" => respond(connection::health_check(state, parse_params(params)?).await),

            // Introspection
            "listDatabases" => respond(schema::list_databases(state, parse_params(params)?).await),
            "listTables" => respond(schema::list_tables(state, parse_params(params)?).await),
            "listAllTables" => {
                respond(schema::list_all_tables(state, parse_params(params)?).await)
            }
            "listColumns" => respond(schema::list_columns(state, parse_params(params)?).await),

            // Queries
            "executeQuery" => {
                respond(query::execute_query(state, id, parse_params(params)?).await)
            }
            "cancelQuery" => respond(query::cancel_query(state, parse_params(params)?).await),

            "getMetrics" => to_json(metrics::get_metrics(state).await),

            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// Decodes method params. Absent params decode as JSON `null`.
fn parse_params<T: DeserializeOwned>(params: Option<&RawValue>) -> Result<T, RpcError> {
    let raw = params.map(RawValue::get).unwrap_or("null");
    serde_json::from_str(raw).map_err(RpcError::invalid_params)
}

fn respond<T: Serialize>(result: EngineResult<T>) -> Result<serde_json::Value, RpcError> {
    to_json(result?)
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::internal(format!("failed to encode result: {e}")).into())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        #[allow(dead_code)]
        connection_id: String,
    }

    fn raw(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn missing_params_decode_as_null() {
        let err = parse_params::<Probe>(None).unwrap_err();
        assert_eq!(err.code, warden_core::protocol::INVALID_PARAMS);
        assert!(err.message.starts_with("invalid parameters: invalid type: null"));
    }

    #[test]
    fn missing_field_is_invalid_params() {
        let params = raw(r#"{"database":"shop"}"#);
        let err = parse_params::<Probe>(Some(&params)).unwrap_err();
        assert!(err
            .message
            .starts_with("invalid parameters: missing field `connectionId`"));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "handler panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "handler panicked: bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
