//! Shared fixtures: chunk (time, device_id, value) segmented by device_id
//! and ordered by time ascending, nulls last.

#![allow(dead_code)]

use arrow_array::{Float64Array, Int32Array, Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use datafusion::scalar::ScalarValue;
use std::sync::Arc;
use tscomp_catalog::{ColumnCompressionInfo, CompressionSettings};
use tscomp_common::{Result, TscompError};
use tscomp_executor::DecompressedRow;
use tscomp_planner::{DecompressChunkPlan, DecompressStrategy, OrderKeyDescriptor};
use tscomp_storage::{BatchBuilder, BatchDescriptor, BatchSource, CompressedBatch, InMemoryBatchStore};

pub fn chunk_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("time", DataType::Int64, true),
        Field::new("device_id", DataType::Int32, false),
        Field::new("value", DataType::Float64, false),
    ]))
}

pub fn builder() -> BatchBuilder {
    let settings = CompressionSettings::try_new(
        1,
        vec![
            ColumnCompressionInfo::order_key("time", 1, true, false),
            ColumnCompressionInfo::segment_key("device_id"),
            ColumnCompressionInfo::plain("value"),
        ],
    )
    .unwrap();
    BatchBuilder::try_new(Arc::new(settings), chunk_schema()).unwrap()
}

/// Rows with `value` equal to the time, or -1.0 for a null time
pub fn rows(times: &[Option<i64>], device_id: i32) -> RecordBatch {
    let values: Vec<f64> = times.iter().map(|t| t.map_or(-1.0, |t| t as f64)).collect();
    RecordBatch::try_new(
        chunk_schema(),
        vec![
            Arc::new(Int64Array::from(times.to_vec())),
            Arc::new(Int32Array::from(vec![device_id; times.len()])),
            Arc::new(Float64Array::from(values)),
        ],
    )
    .unwrap()
}

pub fn range(from: i64, to: i64) -> Vec<Option<i64>> {
    (from..=to).map(Some).collect()
}

/// Single batch with an explicit sequence number
pub fn batch(times: &[Option<i64>], device_id: i32, sequence_num: i32) -> CompressedBatch {
    builder()
        .build_batch_with_sequence_num(&rows(times, device_id), sequence_num)
        .unwrap()
}

pub fn store(batches: Vec<CompressedBatch>) -> Arc<InMemoryBatchStore> {
    Arc::new(InMemoryBatchStore::new(chunk_schema()).with_batches(batches))
}

/// Batches [0,10] seq 10, [5,15] seq 20 and [20,30] seq 30
pub fn overlapping_store() -> Arc<InMemoryBatchStore> {
    store(vec![
        batch(&range(0, 10), 1, 10),
        batch(&range(5, 15), 2, 20),
        batch(&range(20, 30), 1, 30),
    ])
}

pub fn plan(strategy: DecompressStrategy, reverse: bool) -> DecompressChunkPlan {
    let order_keys = match strategy {
        DecompressStrategy::SortedMerge => vec![OrderKeyDescriptor {
            column: "time".to_string(),
            position: 1,
            ascending: true,
            nulls_first: false,
        }],
        _ => vec![],
    };
    DecompressChunkPlan {
        chunk_id: 1,
        strategy,
        reverse,
        output_columns: vec![
            "time".to_string(),
            "device_id".to_string(),
            "value".to_string(),
        ],
        segment_columns: vec!["device_id".to_string()],
        order_keys,
        batch_sort_keys: vec![],
        enable_bulk_decompression: false,
        needs_sequence_num: strategy == DecompressStrategy::SortedMerge,
    }
}

pub fn time_of(row: &DecompressedRow) -> Option<i64> {
    match row.value(0) {
        Some(ScalarValue::Int64(t)) => *t,
        other => panic!("unexpected time value {:?}", other),
    }
}

pub fn device_of(row: &DecompressedRow) -> i32 {
    match row.value(1) {
        Some(ScalarValue::Int32(Some(d))) => *d,
        other => panic!("unexpected device value {:?}", other),
    }
}

/// Source whose payload read of one batch fails
pub struct FailingSource {
    pub inner: Arc<InMemoryBatchStore>,
    pub fail_at: usize,
}

impl BatchSource for FailingSource {
    fn schema(&self) -> SchemaRef {
        self.inner.schema()
    }

    fn descriptors(&self) -> Result<Vec<BatchDescriptor>> {
        self.inner.descriptors()
    }

    fn read_payload(&self, index: usize) -> Result<RecordBatch> {
        if index == self.fail_at {
            return Err(TscompError::Storage(format!("batch {} is unreadable", index)));
        }
        self.inner.read_payload(index)
    }
}
