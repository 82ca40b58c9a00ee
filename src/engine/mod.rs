// SPDX-License-Identifier: Apache-2.0

// Data Engine Module
// Connection, cache and query bookkeeping behind the RPC surface

pub mod cache;
pub mod classify;
pub mod connection_manager;
pub mod drivers;
pub mod query_manager;
pub mod registry;

pub use cache::MetadataCache;
pub use connection_manager::ConnectionManager;
pub use query_manager::{QueryGuard, QueryManager};
pub use registry::DriverRegistry;
