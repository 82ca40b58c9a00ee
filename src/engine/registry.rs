// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Maps a connection descriptor's `type` to the driver that can open it.

use std::collections::HashMap;
use std::sync::Arc;

use warden_core::{DataEngine, EngineError, EngineResult};

/// Registry that holds all available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DataEngine>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registers a new driver
    ///
    /// The driver's `driver_id()` is used as the key.
    pub fn register(&mut self, driver: Arc<dyn DataEngine>) {
        let id = driver.driver_id().to_string();
        self.drivers.insert(id, driver);
    }

    /// Gets a driver by its ID
    pub fn get(&self, driver_id: &str) -> Option<Arc<dyn DataEngine>> {
        self.drivers.get(driver_id).cloned()
    }

    /// Like [`get`](Self::get), but an unknown type is an error.
    pub fn resolve(&self, driver_id: &str) -> EngineResult<Arc<dyn DataEngine>> {
        self.get(driver_id)
            .ok_or_else(|| EngineError::unsupported_driver(driver_id))
    }

    /// Lists `(id, display name)` of every registered driver, sorted by id
    pub fn list(&self) -> Vec<(&str, &'static str)> {
        let mut drivers: Vec<(&str, &'static str)> = self
            .drivers
            .iter()
            .map(|(id, driver)| (id.as_str(), driver.driver_name()))
            .collect();
        drivers.sort_unstable();
        drivers
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
