//! tscomp Executor - Decompression of compressed chunks
//!
//! Runs a [`DecompressChunkPlan`] against a [`BatchSource`] and yields the
//! chunk rows as a pull-based stream.

mod decompress;
pub mod merge;
pub mod row;
pub mod scan;

pub use merge::BatchMergeExec;
pub use row::{collect_record_batch, output_schema, DecompressedRow, RowStream};
pub use scan::DecompressScan;

use std::sync::Arc;
use tracing::debug;
use tscomp_common::Result;
use tscomp_planner::{DecompressChunkPlan, DecompressStrategy};
use tscomp_storage::BatchSource;

/// Start executing `plan` over the batches of `source`
pub fn execute(plan: &DecompressChunkPlan, source: Arc<dyn BatchSource>) -> Result<RowStream> {
    debug!("executing {} decompression of chunk {}", plan.strategy, plan.chunk_id);
    match plan.strategy {
        DecompressStrategy::SortedMerge => {
            Ok(Box::new(BatchMergeExec::try_new(plan.clone(), source)?))
        }
        DecompressStrategy::Plain | DecompressStrategy::Pushdown => {
            Ok(Box::new(DecompressScan::try_new(plan.clone(), source)?))
        }
    }
}
