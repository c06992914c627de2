//! Decompression of a single batch

use crate::row::DecompressedRow;
use arrow_array::{ArrayRef, RecordBatch};
use datafusion::scalar::ScalarValue;
use std::collections::VecDeque;
use tscomp_common::{Result, TscompError};
use tscomp_planner::DecompressChunkPlan;
use tscomp_storage::{BatchDescriptor, BatchSource};

enum ColumnSource {
    /// Segment-key value, the same for every row of the batch
    Constant(ScalarValue),
    Payload(ArrayRef),
}

/// A batch whose payload has been read. Rows are handed out in stored
/// order, or back to front for a reverse scan.
pub(crate) struct OpenBatch {
    pub descriptor: BatchDescriptor,
    pub payload: RecordBatch,
    columns: Vec<ColumnSource>,
    reverse: bool,
    consumed: usize,
    /// Rows decompressed up front in bulk mode
    decompressed: Option<VecDeque<DecompressedRow>>,
}

impl OpenBatch {
    pub fn open(
        source: &dyn BatchSource,
        descriptor: BatchDescriptor,
        plan: &DecompressChunkPlan,
    ) -> Result<Self> {
        let payload = source.read_payload(descriptor.index)?;
        if payload.num_rows() != descriptor.row_count {
            return Err(TscompError::Storage(format!(
                "batch {} holds {} rows, expected {}",
                descriptor.index,
                payload.num_rows(),
                descriptor.row_count
            )));
        }

        let columns = plan
            .output_columns
            .iter()
            .map(|name| {
                if plan.segment_columns.contains(name) {
                    let value = descriptor.segment_value(name).ok_or_else(|| {
                        TscompError::Storage(format!(
                            "batch {} has no value for segment column {}",
                            descriptor.index, name
                        ))
                    })?;
                    return Ok(ColumnSource::Constant(value.clone()));
                }
                payload
                    .column_by_name(name)
                    .map(|array| ColumnSource::Payload(array.clone()))
                    .ok_or_else(|| TscompError::schema_mismatch(name.as_str(), "compressed batch"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut batch = Self {
            descriptor,
            payload,
            columns,
            reverse: plan.reverse,
            consumed: 0,
            decompressed: None,
        };
        if plan.enable_bulk_decompression {
            let rows = (0..batch.descriptor.row_count)
                .map(|i| batch.decompress_row(batch.position(i)))
                .collect::<Result<VecDeque<_>>>()?;
            batch.decompressed = Some(rows);
        }
        Ok(batch)
    }

    /// Payload row of the `i`-th row handed out
    fn position(&self, i: usize) -> usize {
        if self.reverse {
            self.descriptor.row_count - 1 - i
        } else {
            i
        }
    }

    fn decompress_row(&self, position: usize) -> Result<DecompressedRow> {
        let values = self
            .columns
            .iter()
            .map(|column| match column {
                ColumnSource::Constant(value) => Ok(value.clone()),
                ColumnSource::Payload(array) => Ok(ScalarValue::try_from_array(array, position)?),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DecompressedRow {
            values,
            sequence_num: self.descriptor.sequence_num,
            batch_index: self.descriptor.index,
        })
    }

    /// Next row with its payload position
    pub fn next_row(&mut self) -> Result<Option<(usize, DecompressedRow)>> {
        if self.consumed >= self.descriptor.row_count {
            return Ok(None);
        }
        let position = self.position(self.consumed);
        let row = match self.decompressed.as_mut() {
            Some(rows) => rows.pop_front().ok_or_else(|| {
                TscompError::Internal(format!(
                    "batch {} ran out of decompressed rows",
                    self.descriptor.index
                ))
            })?,
            None => self.decompress_row(position)?,
        };
        self.consumed += 1;
        Ok(Some((position, row)))
    }
}
