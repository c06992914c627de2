//! Catalog traits

use crate::relation::RelationSchema;
use crate::settings::CompressionSettings;
use std::sync::Arc;
use tscomp_common::Result;

/// Compression state flags of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkStatus {
    pub compressed: bool,
    /// Batches were appended out of order; order keys cannot be trusted
    pub unordered: bool,
    /// Some rows still live in the uncompressed chunk
    pub partial: bool,
}

impl ChunkStatus {
    pub fn compressed() -> Self {
        Self {
            compressed: true,
            ..Self::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        self.compressed && self.partial
    }
}

/// Catalog entry of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEntry {
    pub chunk_id: i32,
    pub hypertable_id: i32,
    pub schema: RelationSchema,
    pub compressed_schema: RelationSchema,
    pub status: ChunkStatus,
}

/// Compression metadata view consumed by the planner
pub trait CompressionCatalog: Send + Sync {
    /// Settings shared by all chunks of a hypertable
    fn settings(&self, hypertable_id: i32) -> Result<Arc<CompressionSettings>>;

    /// Chunk entry, including the layout of its compressed relation
    fn chunk(&self, chunk_id: i32) -> Result<ChunkEntry>;

    /// Register settings for a hypertable, replacing earlier ones
    fn register_settings(&self, settings: CompressionSettings) -> Result<()>;

    /// Register a chunk of a hypertable whose settings are known
    fn register_chunk(
        &self,
        chunk_id: i32,
        hypertable_id: i32,
        schema: RelationSchema,
        status: ChunkStatus,
    ) -> Result<ChunkEntry>;

    fn set_chunk_status(&self, chunk_id: i32, status: ChunkStatus) -> Result<()>;

    fn settings_for_chunk(&self, chunk_id: i32) -> Result<Arc<CompressionSettings>> {
        let entry = self.chunk(chunk_id)?;
        self.settings(entry.hypertable_id)
    }
}
