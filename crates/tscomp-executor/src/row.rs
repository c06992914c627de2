//! Decompressed rows and row streams

use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use datafusion::scalar::ScalarValue;
use std::sync::Arc;
use tscomp_common::{Result, TscompError};

/// One decompressed chunk row, values in plan output-column order
#[derive(Debug, Clone, PartialEq)]
pub struct DecompressedRow {
    pub values: Vec<ScalarValue>,
    /// Sequence number of the batch the row came from
    pub sequence_num: i32,
    /// Index of that batch in its source
    pub batch_index: usize,
}

impl DecompressedRow {
    pub fn value(&self, column: usize) -> Option<&ScalarValue> {
        self.values.get(column)
    }
}

/// Pull-based stream of decompressed rows. Dropping it releases every
/// batch it holds open.
pub type RowStream = Box<dyn Iterator<Item = Result<DecompressedRow>> + Send>;

/// Schema of the plan's output columns, taken from the chunk schema
pub fn output_schema(chunk_schema: &Schema, output_columns: &[String]) -> Result<SchemaRef> {
    let fields = output_columns
        .iter()
        .map(|name| {
            chunk_schema
                .field_with_name(name)
                .cloned()
                .map_err(|_| TscompError::schema_mismatch(name.as_str(), "chunk rows"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

/// Drain `stream` into a single record batch of `schema`
pub fn collect_record_batch(stream: RowStream, schema: SchemaRef) -> Result<RecordBatch> {
    let rows = stream.collect::<Result<Vec<_>>>()?;
    let columns = (0..schema.fields().len())
        .map(|column| {
            let field = schema.field(column);
            if rows.is_empty() {
                return Ok(arrow_array::new_empty_array(field.data_type()));
            }
            let values = rows
                .iter()
                .map(|row| {
                    row.values.get(column).cloned().ok_or_else(|| {
                        TscompError::Execution(format!("row has no value for {}", field.name()))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ScalarValue::iter_to_array(values)?)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordBatch::try_new(schema, columns)?)
}
