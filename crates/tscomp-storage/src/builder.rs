//! Batch builder
//!
//! Groups chunk rows by their segment-key values, splits each group into
//! batches of at most `max_batch_rows` rows and derives the per-batch
//! metadata the planner and the merge executor rely on.

use crate::batch::{BatchDescriptor, CompressedBatch, OrderKeyStats};
use arrow::compute::{lexsort_to_indices, partition, take_record_batch, SortColumn, SortOptions};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::{Field, Schema, SchemaRef};
use datafusion::scalar::ScalarValue;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use tscomp_catalog::{ColumnRole, CompressionSettings};
use tscomp_common::{Result, TscompError};

pub const DEFAULT_MAX_BATCH_ROWS: usize = 1000;
/// Distance between consecutive sequence numbers, leaving room for batches
/// inserted later
pub const SEQUENCE_NUM_GAP: i32 = 10;

pub struct BatchBuilder {
    settings: Arc<CompressionSettings>,
    schema: SchemaRef,
    payload_schema: SchemaRef,
    max_batch_rows: usize,
    next_sequence_num: i32,
}

impl BatchBuilder {
    /// `schema` is the schema of the uncompressed chunk rows.
    pub fn try_new(settings: Arc<CompressionSettings>, schema: SchemaRef) -> Result<Self> {
        settings.validate()?;

        let mut payload_fields: Vec<Field> = vec![];
        for column in &settings.columns {
            let field = schema
                .field_with_name(&column.name)
                .map_err(|_| TscompError::schema_mismatch(column.name.as_str(), "chunk rows"))?;
            if !column.is_segment_key() {
                payload_fields.push(field.clone());
            }
        }

        Ok(Self {
            settings,
            schema,
            payload_schema: Arc::new(Schema::new(payload_fields)),
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            next_sequence_num: SEQUENCE_NUM_GAP,
        })
    }

    pub fn with_max_batch_rows(mut self, max_batch_rows: usize) -> Self {
        self.max_batch_rows = max_batch_rows.max(1);
        self
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Columns stored in the payload, in settings order
    pub fn payload_schema(&self) -> SchemaRef {
        self.payload_schema.clone()
    }

    /// Compress `rows` into batches, ordered by segment values and then by
    /// the order keys. Sequence numbers continue from previous calls.
    pub fn compress(&mut self, rows: &RecordBatch) -> Result<Vec<CompressedBatch>> {
        if rows.num_rows() == 0 {
            return Ok(vec![]);
        }

        let mut sort_columns = vec![];
        for column in self.settings.segment_keys() {
            sort_columns.push(SortColumn {
                values: self.column(rows, &column.name)?,
                options: Some(SortOptions::default()),
            });
        }
        sort_columns.extend(self.order_key_sort_columns(rows)?);
        let sorted = take_record_batch(rows, &lexsort_to_indices(&sort_columns, None)?)?;

        let segment_arrays = self
            .settings
            .segment_keys()
            .map(|c| self.column(&sorted, &c.name))
            .collect::<Result<Vec<_>>>()?;
        let groups = if segment_arrays.is_empty() {
            vec![0..sorted.num_rows()]
        } else {
            partition(&segment_arrays)?.ranges()
        };

        let mut batches = vec![];
        for group in groups {
            let mut offset = group.start;
            while offset < group.end {
                let len = self.max_batch_rows.min(group.end - offset);
                batches.push(self.build_batch(&sorted.slice(offset, len))?);
                offset += len;
            }
        }

        debug!(
            "compressed {} rows into {} batches",
            rows.num_rows(),
            batches.len()
        );
        Ok(batches)
    }

    /// Build one batch from rows of a single segment group, assigning the
    /// next sequence number.
    pub fn build_batch(&mut self, rows: &RecordBatch) -> Result<CompressedBatch> {
        let batch = self.build_batch_with_sequence_num(rows, self.next_sequence_num)?;
        self.next_sequence_num += SEQUENCE_NUM_GAP;
        Ok(batch)
    }

    pub fn build_batch_with_sequence_num(
        &self,
        rows: &RecordBatch,
        sequence_num: i32,
    ) -> Result<CompressedBatch> {
        let row_count = rows.num_rows();
        if row_count == 0 {
            return Err(TscompError::Storage("cannot build an empty batch".to_string()));
        }

        let mut segment_values = vec![];
        for column in self.settings.segment_keys() {
            let array = self.column(rows, &column.name)?;
            let value = ScalarValue::try_from_array(&array, 0)?;
            for row in 1..row_count {
                if ScalarValue::try_from_array(&array, row)? != value {
                    return Err(TscompError::Storage(format!(
                        "segment column {} is not constant within the batch",
                        column.name
                    )));
                }
            }
            segment_values.push((column.name.clone(), value));
        }

        let sort_columns = self.order_key_sort_columns(rows)?;
        let sorted = if sort_columns.is_empty() {
            rows.clone()
        } else {
            take_record_batch(rows, &lexsort_to_indices(&sort_columns, None)?)?
        };

        let payload_columns = self
            .payload_schema
            .fields()
            .iter()
            .map(|f| self.column(&sorted, f.name()))
            .collect::<Result<Vec<_>>>()?;
        let payload = RecordBatch::try_new(self.payload_schema.clone(), payload_columns)?;

        let order_key_stats = self
            .settings
            .order_keys()
            .iter()
            .map(|c| order_key_stats(&self.column(&sorted, &c.name)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompressedBatch {
            descriptor: BatchDescriptor {
                index: 0,
                sequence_num,
                row_count,
                segment_values,
                order_key_stats,
            },
            payload,
        })
    }

    fn order_key_sort_columns(&self, rows: &RecordBatch) -> Result<Vec<SortColumn>> {
        self.settings
            .order_keys()
            .iter()
            .map(|column| {
                let ColumnRole::OrderKey {
                    ascending,
                    nulls_first,
                    ..
                } = column.role
                else {
                    return Err(TscompError::InvalidOrderingRequest(format!(
                        "{} is not an order key",
                        column.name
                    )));
                };
                Ok(SortColumn {
                    values: self.column(rows, &column.name)?,
                    options: Some(SortOptions {
                        descending: !ascending,
                        nulls_first,
                    }),
                })
            })
            .collect()
    }

    fn column(&self, rows: &RecordBatch, name: &str) -> Result<ArrayRef> {
        rows.column_by_name(name)
            .cloned()
            .ok_or_else(|| TscompError::schema_mismatch(name, "chunk rows"))
    }
}

/// Min and max over the non-null values of `array`
pub fn order_key_stats(array: &ArrayRef) -> Result<OrderKeyStats> {
    let mut min: Option<ScalarValue> = None;
    let mut max: Option<ScalarValue> = None;
    for row in 0..array.len() {
        if array.is_null(row) {
            continue;
        }
        let value = ScalarValue::try_from_array(array, row)?;
        if min
            .as_ref()
            .map_or(true, |m| value.partial_cmp(m) == Some(Ordering::Less))
        {
            min = Some(value.clone());
        }
        if max
            .as_ref()
            .map_or(true, |m| value.partial_cmp(m) == Some(Ordering::Greater))
        {
            max = Some(value);
        }
    }

    let null = ScalarValue::try_from(array.data_type())?;
    Ok(OrderKeyStats {
        min: min.unwrap_or_else(|| null.clone()),
        max: max.unwrap_or(null),
        has_nulls: array.null_count() > 0,
    })
}
