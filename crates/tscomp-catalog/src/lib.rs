//! tscomp Catalog - Compression metadata of chunks

pub mod in_memory;
pub mod relation;
pub mod settings;
pub mod traits;

pub use in_memory::InMemoryCompressionCatalog;
pub use relation::{
    compressed_relation_for, max_column_name, min_column_name, AttributeDef, RelationSchema,
    COUNT_COLUMN_NAME, SEQUENCE_NUM_COLUMN_NAME,
};
pub use settings::{ColumnCompressionInfo, ColumnRole, CompressionSettings, OrderKeyInfo};
pub use traits::{ChunkEntry, ChunkStatus, CompressionCatalog};
