//! Batch sources
//!
//! The executor reads descriptors first and fetches a payload only when a
//! batch gets decompressed.

use crate::batch::{BatchDescriptor, CompressedBatch};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use std::sync::atomic::{AtomicUsize, Ordering};
use tscomp_common::{Result, TscompError};

/// Read access to the batches of one compressed chunk
pub trait BatchSource: Send + Sync {
    /// Schema of the uncompressed chunk rows
    fn schema(&self) -> SchemaRef;

    /// Descriptors of all batches in storage order
    fn descriptors(&self) -> Result<Vec<BatchDescriptor>>;

    /// Payload of the batch at `index`
    fn read_payload(&self, index: usize) -> Result<RecordBatch>;
}

/// Batches held in memory, counting payload reads
#[derive(Debug)]
pub struct InMemoryBatchStore {
    schema: SchemaRef,
    batches: Vec<CompressedBatch>,
    payload_reads: AtomicUsize,
}

impl InMemoryBatchStore {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: vec![],
            payload_reads: AtomicUsize::new(0),
        }
    }

    /// Append a batch, returning its index
    pub fn push(&mut self, mut batch: CompressedBatch) -> usize {
        let index = self.batches.len();
        batch.descriptor.index = index;
        self.batches.push(batch);
        index
    }

    pub fn with_batches(mut self, batches: impl IntoIterator<Item = CompressedBatch>) -> Self {
        for batch in batches {
            self.push(batch);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(|b| b.row_count()).sum()
    }

    pub fn payload_reads(&self) -> usize {
        self.payload_reads.load(Ordering::Relaxed)
    }
}

impl BatchSource for InMemoryBatchStore {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn descriptors(&self) -> Result<Vec<BatchDescriptor>> {
        Ok(self.batches.iter().map(|b| b.descriptor.clone()).collect())
    }

    fn read_payload(&self, index: usize) -> Result<RecordBatch> {
        let batch = self
            .batches
            .get(index)
            .ok_or_else(|| TscompError::Storage(format!("batch {} not found", index)))?;
        self.payload_reads.fetch_add(1, Ordering::Relaxed);
        Ok(batch.payload.clone())
    }
}
