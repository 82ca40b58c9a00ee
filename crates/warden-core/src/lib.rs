// SPDX-License-Identifier: Apache-2.0

//! Data Warden core: wire protocol, shared types, driver traits, errors

pub mod error;
pub mod protocol;
pub mod sensitive;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{CancelStage, EngineError, EngineResult};
pub use sensitive::Sensitive;
pub use traits::{DataEngine, DatabaseHandle};
pub use types::*;
pub use value::Value;
