//! Compressed batches
//!
//! A batch holds the rows of one segment group, at most one batch size of
//! them. Segment-key values are stored once per batch; the other columns
//! form the payload, sorted by the order keys.

use arrow_array::RecordBatch;
use datafusion::scalar::ScalarValue;
use tscomp_common::{Result, TscompError};

/// Statistics of one order-key column over a batch
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKeyStats {
    /// Smallest non-null value; null when the column holds only nulls
    pub min: ScalarValue,
    /// Largest non-null value; null when the column holds only nulls
    pub max: ScalarValue,
    pub has_nulls: bool,
}

/// Everything known about a batch without reading its payload
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDescriptor {
    /// Position of the batch in its source
    pub index: usize,
    pub sequence_num: i32,
    pub row_count: usize,
    /// Segment-key values by column name
    pub segment_values: Vec<(String, ScalarValue)>,
    /// Indexed by order-key position minus one
    pub order_key_stats: Vec<OrderKeyStats>,
}

impl BatchDescriptor {
    pub fn segment_value(&self, column: &str) -> Option<&ScalarValue> {
        self.segment_values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn stats(&self, position: u16) -> Result<&OrderKeyStats> {
        usize::from(position)
            .checked_sub(1)
            .and_then(|idx| self.order_key_stats.get(idx))
            .ok_or_else(|| {
                TscompError::Storage(format!(
                    "batch {} has no statistics for order key {}",
                    self.index, position
                ))
            })
    }
}

/// A batch together with its payload
#[derive(Debug, Clone)]
pub struct CompressedBatch {
    pub descriptor: BatchDescriptor,
    pub payload: RecordBatch,
}

impl CompressedBatch {
    pub fn row_count(&self) -> usize {
        self.descriptor.row_count
    }

    pub fn sequence_num(&self) -> i32 {
        self.descriptor.sequence_num
    }
}
