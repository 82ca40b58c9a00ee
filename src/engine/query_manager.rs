// SPDX-License-Identifier: Apache-2.0

//! Query Manager
//!
//! Tracks in-flight `executeQuery` calls by the client's request id so that an
//! independent `cancelQuery` can reach them. A record lives exactly as long as
//! the [`QueryGuard`] returned by [`QueryManager::register`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use warden_core::{EngineError, EngineResult};

struct RunningQuery {
    cancel: CancellationToken,
    sql: String,
    started_at: Instant,
    generation: u64,
}

pub struct QueryManager {
    running: Mutex<HashMap<String, RunningQuery>>,
    next_generation: AtomicU64,
}

impl QueryManager {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Registers a running query and returns the guard that owns the record.
    ///
    /// A duplicate request id replaces the earlier record; the earlier guard
    /// will then leave the newer record alone when it drops.
    pub fn register(&self, request_id: &str, sql: &str) -> QueryGuard<'_> {
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let previous = self.running.lock().insert(
            request_id.to_string(),
            RunningQuery {
                cancel: cancel.clone(),
                sql: sql.to_string(),
                started_at: Instant::now(),
                generation,
            },
        );
        if previous.is_some() {
            debug!(request_id, "Request id reused while a query was still registered");
        }

        QueryGuard {
            manager: self,
            request_id: request_id.to_string(),
            generation,
            cancel,
        }
    }

    /// Signals cancellation and returns without waiting for the query to stop.
    pub fn cancel(&self, request_id: &str) -> EngineResult<()> {
        let running = self.running.lock();
        let query = running
            .get(request_id)
            .ok_or_else(|| EngineError::query_not_found(request_id))?;

        info!(
            request_id,
            sql = %query.sql,
            elapsed_ms = query.started_at.elapsed().as_millis() as u64,
            "Cancelling query"
        );
        query.cancel.cancel();
        Ok(())
    }

    pub fn is_running(&self, request_id: &str) -> bool {
        self.running.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.running.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.lock().is_empty()
    }

    fn finish(&self, request_id: &str, generation: u64) {
        let mut running = self.running.lock();
        if running
            .get(request_id)
            .is_some_and(|query| query.generation == generation)
        {
            running.remove(request_id);
        }
    }
}

impl Default for QueryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its record on drop, whichever way the query call ends.
pub struct QueryGuard<'a> {
    manager: &'a QueryManager,
    request_id: String,
    generation: u64,
    cancel: CancellationToken,
}

impl QueryGuard<'_> {
    /// Token handed to the driver
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.manager.finish(&self.request_id, self.generation);
    }
}
