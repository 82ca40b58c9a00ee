// SPDX-License-Identifier: Apache-2.0

//! Metrics command.

use crate::metrics::{self, MetricsSnapshot};
use crate::AppState;

/// Returns the current counters plus live connection and query gauges.
pub async fn get_metrics(state: &AppState) -> MetricsSnapshot {
    metrics::snapshot(state.connections.len().await, state.queries.len())
}
