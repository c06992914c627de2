//! Relation layouts of chunks and their compressed counterparts

use crate::settings::{ColumnRole, CompressionSettings};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use std::sync::Arc;
use tscomp_common::{AttrNumber, Result, TscompError};

pub const COUNT_COLUMN_NAME: &str = "_ts_meta_count";
pub const SEQUENCE_NUM_COLUMN_NAME: &str = "_ts_meta_sequence_num";

/// Name of the batch minimum column of the order key at `position`
pub fn min_column_name(position: u16) -> String {
    format!("_ts_meta_min_{}", position)
}

/// Name of the batch maximum column of the order key at `position`
pub fn max_column_name(position: u16) -> String {
    format!("_ts_meta_max_{}", position)
}

/// A column of a relation
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    /// 1-based attribute number
    pub attno: AttrNumber,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Dropped columns keep their number but are never produced
    pub dropped: bool,
}

impl AttributeDef {
    pub fn new(attno: AttrNumber, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            attno,
            name: name.into(),
            data_type,
            nullable: true,
            dropped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<AttributeDef>,
}

impl RelationSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![],
        }
    }

    /// Append a column, numbering it after the current last one
    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let attno = self.columns.len() as AttrNumber + 1;
        self.columns.push(AttributeDef::new(attno, name, data_type));
        self
    }

    pub fn attribute(&self, attno: AttrNumber) -> Option<&AttributeDef> {
        self.columns.iter().find(|c| c.attno == attno && !c.dropped)
    }

    pub fn attname(&self, attno: AttrNumber) -> Option<&str> {
        self.attribute(attno).map(|c| c.name.as_str())
    }

    pub fn attnum(&self, name: &str) -> Option<AttrNumber> {
        self.columns
            .iter()
            .find(|c| !c.dropped && c.name == name)
            .map(|c| c.attno)
    }

    pub fn live_columns(&self) -> impl Iterator<Item = &AttributeDef> {
        self.columns.iter().filter(|c| !c.dropped)
    }

    pub fn to_arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .live_columns()
            .map(|c| Field::new(c.name.as_str(), c.data_type.clone(), c.nullable))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Derive the compressed relation of a chunk.
///
/// Segment keys keep their type. Every other column becomes an opaque binary
/// payload column. The count and sequence number columns follow, then a
/// min/max pair per order key. Chunk columns without compression settings are
/// left out of the compressed relation.
pub fn compressed_relation_for(
    chunk: &RelationSchema,
    settings: &CompressionSettings,
) -> Result<RelationSchema> {
    settings.validate()?;

    let mut rel = RelationSchema::new(format!("compress_{}", chunk.name));
    for column in chunk.live_columns() {
        let Some(info) = settings.find(&column.name) else {
            continue;
        };
        let data_type = match info.role {
            ColumnRole::SegmentKey => column.data_type.clone(),
            ColumnRole::OrderKey { .. } | ColumnRole::Plain => DataType::Binary,
        };
        rel = rel.with_column(column.name.as_str(), data_type);
    }

    rel = rel
        .with_column(COUNT_COLUMN_NAME, DataType::Int32)
        .with_column(SEQUENCE_NUM_COLUMN_NAME, DataType::Int32);

    for key in settings.order_keys() {
        let position = key.order_key_position();
        let column = chunk
            .live_columns()
            .find(|c| c.name == key.name)
            .ok_or_else(|| TscompError::schema_mismatch(key.name.as_str(), chunk.name.as_str()))?;
        rel = rel
            .with_column(min_column_name(position), column.data_type.clone())
            .with_column(max_column_name(position), column.data_type.clone());
    }

    Ok(rel)
}
