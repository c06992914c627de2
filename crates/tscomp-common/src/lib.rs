//! tscomp Common - Shared types, errors, and configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::{CostConfig, PlannerConfig};
pub use error::{Result, TscompError};
pub use types::{AttrNumber, RelId, Relids, RelidsIter};
