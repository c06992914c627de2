//! tscomp Storage - Compressed batches and batch sources

pub mod batch;
pub mod builder;
pub mod store;

pub use batch::{BatchDescriptor, CompressedBatch, OrderKeyStats};
pub use builder::{order_key_stats, BatchBuilder, DEFAULT_MAX_BATCH_ROWS, SEQUENCE_NUM_GAP};
pub use store::{BatchSource, InMemoryBatchStore};
