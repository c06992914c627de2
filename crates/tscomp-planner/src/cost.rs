//! Cost Model
//!
//! Costs are in the planner's abstract units: one sequential page fetch
//! costs `seq_page_cost`. Every estimate carries a startup part (work done
//! before the first row) and a total.
//!
//! Decompression:
//! - plain: per-output-row charge on top of the compressed scan, startup is
//!   the cost of fetching one batch
//! - sorted merge: the batches are sorted first, then a penalty quadratic in
//!   the number of batches approximates the heap of open batches

use crate::paths::Path;
use tscomp_common::CostConfig;

/// Size of a heap tuple header plus alignment, as charged per sorted tuple
const TUPLE_OVERHEAD_BYTES: f64 = 24.0;
const MERGE_ORDER_MIN: f64 = 6.0;
const MERGE_ORDER_MAX: f64 = 500.0;
/// Append nodes charge this fraction of `cpu_tuple_cost` per row
const APPEND_CPU_COST_MULTIPLIER: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cost {
    pub startup: f64,
    pub total: f64,
}

impl Cost {
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }
}

/// Row estimate together with its cost
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Estimate {
    pub rows: f64,
    pub cost: Cost,
}

#[derive(Debug, Clone, Default)]
pub struct CostModel {
    pub config: CostConfig,
}

impl CostModel {
    pub fn new(config: CostConfig) -> Self {
        Self { config }
    }

    /// Decompress every batch of `sub` in scan order.
    pub fn decompress_plain(&self, sub_rows: f64, sub_cost: Cost) -> Estimate {
        let rows = sub_rows * self.config.batch_size;
        let startup = if sub_rows > 0.0 {
            sub_cost.total / sub_rows
        } else {
            0.0
        };
        Estimate {
            rows,
            cost: Cost::new(
                startup,
                sub_cost.total + rows * self.config.decompress_cpu_tuple_cost,
            ),
        }
    }

    /// Sort the batch descriptors, then heap-merge the batches.
    pub fn decompress_sorted_merge(&self, sub_rows: f64, sub_cost: Cost, width: usize) -> Estimate {
        let sort = self.sort(sub_cost.total, sub_rows, width);
        Estimate {
            rows: sub_rows * self.config.batch_size,
            cost: Cost::new(
                sort.total,
                sort.total + sub_rows.powi(2) * self.config.heap_merge_cpu_tuple_cost,
            ),
        }
    }

    /// Cost of sorting `tuples` rows of `width` bytes produced at `input_cost`.
    ///
    /// In memory this is a quicksort of `n log2 n` comparisons. Once the
    /// data exceeds `work_mem_kb` it becomes a polyphase merge whose page
    /// traffic is charged at a mix of sequential and random fetches.
    pub fn sort(&self, input_cost: f64, tuples: f64, width: usize) -> Cost {
        let cfg = &self.config;
        let tuples = tuples.max(2.0);
        let comparison_cost = 2.0 * cfg.cpu_operator_cost;
        let input_bytes = tuples * (align8(width as f64) + TUPLE_OVERHEAD_BYTES);
        let sort_mem_bytes = cfg.work_mem_kb * 1024.0;

        let mut startup = input_cost + comparison_cost * tuples * tuples.log2();

        if input_bytes > sort_mem_bytes {
            let npages = (input_bytes / cfg.block_size).ceil();
            let nruns = input_bytes / sort_mem_bytes;
            let merge_order = (sort_mem_bytes / (cfg.block_size * 33.0))
                .clamp(MERGE_ORDER_MIN, MERGE_ORDER_MAX);
            let log_runs = if nruns > merge_order {
                (nruns.ln() / merge_order.ln()).ceil()
            } else {
                1.0
            };
            let page_accesses = 2.0 * npages * log_runs;
            startup += page_accesses * (cfg.seq_page_cost * 0.75 + cfg.random_page_cost * 0.25);
        }

        Cost::new(startup, startup + cfg.cpu_operator_cost * tuples)
    }

    /// Concatenate children; startup is that of the first child.
    pub fn append(&self, children: &[Path]) -> Estimate {
        let rows: f64 = children.iter().map(|c| c.rows()).sum();
        let startup = children.first().map(|c| c.startup_cost()).unwrap_or(0.0);
        let total: f64 = children.iter().map(|c| c.total_cost()).sum::<f64>()
            + self.config.cpu_tuple_cost * APPEND_CPU_COST_MULTIPLIER * rows;
        Estimate {
            rows,
            cost: Cost::new(startup, total),
        }
    }

    /// Merge `streams` ordered inputs with a binary heap.
    pub fn merge_append(&self, streams: usize, input: Cost, tuples: f64) -> Cost {
        let cfg = &self.config;
        let n = (streams as f64).max(2.0);
        let log_n = n.log2();
        let comparison_cost = 2.0 * cfg.cpu_operator_cost;

        let startup = input.startup + comparison_cost * n * log_n;
        let run = tuples * comparison_cost * log_n
            + cfg.cpu_tuple_cost * APPEND_CPU_COST_MULTIPLIER * tuples;
        Cost::new(startup, startup + run + (input.total - input.startup))
    }
}

fn align8(bytes: f64) -> f64 {
    (bytes / 8.0).ceil() * 8.0
}
