//! In-memory compression catalog

use crate::relation::{compressed_relation_for, RelationSchema};
use crate::settings::CompressionSettings;
use crate::traits::{ChunkEntry, ChunkStatus, CompressionCatalog};
use dashmap::DashMap;
use std::sync::Arc;
use tscomp_common::{Result, TscompError};

/// In-memory catalog implementation
pub struct InMemoryCompressionCatalog {
    settings: DashMap<i32, Arc<CompressionSettings>>,
    chunks: DashMap<i32, ChunkEntry>,
}

impl InMemoryCompressionCatalog {
    pub fn new() -> Self {
        Self {
            settings: DashMap::new(),
            chunks: DashMap::new(),
        }
    }

    pub fn chunk_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.chunks.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for InMemoryCompressionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionCatalog for InMemoryCompressionCatalog {
    fn settings(&self, hypertable_id: i32) -> Result<Arc<CompressionSettings>> {
        self.settings
            .get(&hypertable_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| {
                TscompError::Catalog(format!(
                    "no compression settings for hypertable {}",
                    hypertable_id
                ))
            })
    }

    fn chunk(&self, chunk_id: i32) -> Result<ChunkEntry> {
        self.chunks
            .get(&chunk_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| TscompError::Catalog(format!("chunk {} not found", chunk_id)))
    }

    fn register_settings(&self, settings: CompressionSettings) -> Result<()> {
        settings.validate()?;
        self.settings
            .insert(settings.hypertable_id, Arc::new(settings));
        Ok(())
    }

    fn register_chunk(
        &self,
        chunk_id: i32,
        hypertable_id: i32,
        schema: RelationSchema,
        status: ChunkStatus,
    ) -> Result<ChunkEntry> {
        let settings = self.settings(hypertable_id)?;
        let compressed_schema = compressed_relation_for(&schema, &settings)?;
        let entry = ChunkEntry {
            chunk_id,
            hypertable_id,
            schema,
            compressed_schema,
            status,
        };
        self.chunks.insert(chunk_id, entry.clone());
        Ok(entry)
    }

    fn set_chunk_status(&self, chunk_id: i32, status: ChunkStatus) -> Result<()> {
        let mut entry = self
            .chunks
            .get_mut(&chunk_id)
            .ok_or_else(|| TscompError::Catalog(format!("chunk {} not found", chunk_id)))?;
        entry.status = status;
        Ok(())
    }
}
