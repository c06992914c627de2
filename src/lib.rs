//! tscomp - compression-aware planning and execution for time-series chunks
//!
//! Planning rewrites a scan over an uncompressed chunk into candidate paths
//! over its compressed batches ([`planner::generate_paths`]). The chosen path
//! becomes a [`planner::DecompressChunkPlan`] that [`executor::execute`] runs
//! against a [`storage::BatchSource`].

pub use tscomp_catalog as catalog;
pub use tscomp_common as common;
pub use tscomp_executor as executor;
pub use tscomp_planner as planner;
pub use tscomp_sql as sql;
pub use tscomp_storage as storage;

pub use tscomp_common::{PlannerConfig, Result, TscompError};
