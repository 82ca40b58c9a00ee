// SPDX-License-Identifier: Apache-2.0

//! Metadata Cache
//!
//! Time-boxed store for introspection results. Each entry carries its own
//! TTL; an expired entry reads exactly like a missing one. There is no
//! background sweeper: stale entries are rejected on lookup and overwritten
//! by the next store for the same key.
//!
//! Every connection id has a generation that moves forward on each
//! invalidation. A fetch that started before an invalidation carries the old
//! generation and its result is not stored.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::metrics;

/// TTL applied when an entry is stored with a zero TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// The all-tables aggregate fans out over every schema, so it lives longer.
pub const ALL_TABLES_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        let ttl = if self.ttl.is_zero() { DEFAULT_TTL } else { self.ttl };
        now.saturating_duration_since(self.stored_at) <= ttl
    }
}

/// Entries and generations share one lock so a store can never interleave
/// with an invalidation of the same connection.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    generations: HashMap<String, u64>,
}

pub struct MetadataCache {
    state: RwLock<CacheState>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Returns a clone of the cached value if it is still fresh and of type `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let hit = {
            let state = self.state.read();
            state
                .entries
                .get(key)
                .filter(|entry| entry.is_fresh(now))
                .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
        };

        metrics::record_cache_lookup(hit.is_some());
        if hit.is_some() {
            debug!(key, "Cache hit");
        }
        hit
    }

    /// Current generation of `connection_id`. Read it before fetching.
    pub fn generation(&self, connection_id: &str) -> u64 {
        self.state
            .read()
            .generations
            .get(connection_id)
            .copied()
            .unwrap_or(0)
    }

    /// Stores `value` unless `connection_id` was invalidated since
    /// `generation` was read. A zero `ttl` means [`DEFAULT_TTL`].
    ///
    /// Returns whether the value was stored.
    pub fn store<T>(
        &self,
        connection_id: &str,
        generation: u64,
        key: impl Into<String>,
        value: T,
        ttl: Duration,
    ) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut state = self.state.write();
        let current = state.generations.get(connection_id).copied().unwrap_or(0);
        if current != generation {
            debug!(connection_id, "Discarding metadata fetched before invalidation");
            return false;
        }

        let entry = CacheEntry {
            value: Arc::new(value),
            stored_at: Instant::now(),
            ttl,
        };
        state.entries.insert(key.into(), entry);
        true
    }

    /// Drops every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        before - state.entries.len()
    }

    /// Drops all metadata cached for one connection id and moves its
    /// generation forward.
    pub fn invalidate_connection(&self, connection_id: &str) -> usize {
        let databases = list_databases_key(connection_id);
        let all_tables = list_all_tables_key(connection_id);
        let tables_prefix = format!("listTables:{connection_id}:");

        let mut state = self.state.write();
        *state
            .generations
            .entry(connection_id.to_string())
            .or_insert(0) += 1;

        let before = state.entries.len();
        state.entries.retain(|key, _| {
            *key != databases && *key != all_tables && !key.starts_with(&tables_prefix)
        });
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!(connection_id, removed, "Invalidated cached metadata");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn list_databases_key(connection_id: &str) -> String {
    format!("listDatabases:{connection_id}")
}

pub fn list_tables_key(connection_id: &str, database: &str) -> String {
    format!("listTables:{connection_id}:{database}")
}

pub fn list_all_tables_key(connection_id: &str) -> String {
    format!("listAllTables:{connection_id}")
}
