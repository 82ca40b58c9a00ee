// SPDX-License-Identifier: Apache-2.0

// RPC Commands Module
// One function per wire method; the dispatcher decodes params and routes here.

pub mod connection;
pub mod metrics;
pub mod query;
pub mod schema;

use serde::{Deserialize, Serialize};

/// `{connectionId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIdParams {
    pub connection_id: String,
}

/// `{success: true}`
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
