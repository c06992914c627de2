//! Plan creation
//!
//! Turns the chosen decompression path into the self-contained description
//! the executor runs from. Column references are resolved to names so the
//! executor never needs the planner context.

use crate::context::PlannerContext;
use crate::paths::{DecompressChunkPath, DecompressStrategy, Path};
use crate::translate::CompressionInfo;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tscomp_catalog::{ColumnRole, SEQUENCE_NUM_COLUMN_NAME};
use tscomp_common::{AttrNumber, RelId, Result, TscompError};
use tscomp_sql::{sort_keys_contained_in, SortKey};

/// Order key as stored in the batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKeyDescriptor {
    pub column: String,
    pub position: u16,
    pub ascending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchSortColumn {
    Segment(String),
    SequenceNum,
}

/// One key the batches have to be sorted by before decompression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSortKey {
    pub column: BatchSortColumn,
    pub descending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompressChunkPlan {
    pub chunk_id: i32,
    pub strategy: DecompressStrategy,
    /// Batches and rows within them are consumed back to front
    pub reverse: bool,
    pub output_columns: Vec<String>,
    /// Output columns whose value is constant per batch
    pub segment_columns: Vec<String>,
    /// Keys of a sorted merge, a prefix of the chunk's order keys; empty for
    /// the other strategies
    pub order_keys: Vec<OrderKeyDescriptor>,
    /// Set when the sub-scan does not deliver the batch order a pushdown needs
    pub batch_sort_keys: Vec<BatchSortKey>,
    pub enable_bulk_decompression: bool,
    pub needs_sequence_num: bool,
}

/// Build the executor plan for `path`, which is a decompression path or a
/// combination of one with the uncompressed rows of the chunk.
pub fn create_decompress_plan(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    path: &Path,
) -> Result<DecompressChunkPlan> {
    let dc = find_decompress(path).ok_or_else(|| {
        TscompError::Planner(format!(
            "path for chunk {} does not decompress it",
            info.chunk_relid
        ))
    })?;

    let output_columns = output_columns(ctx, info)?;
    let segment_columns = info
        .settings
        .segment_keys()
        .map(|c| c.name.clone())
        .filter(|name| output_columns.contains(name))
        .collect();

    let order_keys = match dc.strategy {
        DecompressStrategy::SortedMerge => merge_keys(ctx, info, &dc.sort_keys)?,
        DecompressStrategy::Plain | DecompressStrategy::Pushdown => vec![],
    };

    let batch_sort_keys = if dc.strategy == DecompressStrategy::Pushdown
        && !sort_keys_contained_in(&dc.compressed_sort_keys, dc.child.sort_keys())
    {
        batch_sort_keys(info, &dc.compressed_sort_keys)?
    } else {
        vec![]
    };

    let plan = DecompressChunkPlan {
        chunk_id: info.chunk_id,
        strategy: dc.strategy,
        reverse: dc.reverse,
        output_columns,
        segment_columns,
        order_keys,
        batch_sort_keys,
        enable_bulk_decompression: ctx.config.enable_bulk_decompression,
        needs_sequence_num: dc.needs_sequence_num,
    };
    debug!(
        "decompress plan for chunk {}: {} reverse={} columns={:?}",
        info.chunk_id, plan.strategy, plan.reverse, plan.output_columns
    );
    Ok(plan)
}

fn find_decompress(path: &Path) -> Option<&DecompressChunkPath> {
    match path {
        Path::DecompressChunk(dc) => Some(dc),
        Path::Append(p) => p.children.iter().find_map(find_decompress),
        Path::MergeAppend(p) => p.children.iter().find_map(find_decompress),
        Path::Scan(_) => None,
    }
}

/// Chunk columns the chunk's target needs, in first-use order
fn output_columns(ctx: &PlannerContext, info: &CompressionInfo) -> Result<Vec<String>> {
    let chunk = ctx.rel(info.chunk_relid)?;
    let mut columns: Vec<String> = vec![];
    let mut push = |name: &str| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };

    for expr in &chunk.target {
        for col in expr.get_columns() {
            if col.relid != info.chunk_relid {
                continue;
            }
            if col.is_user_column() {
                push(info.mapping.column_name(col.attno)?);
            } else {
                for column in chunk.schema.live_columns() {
                    push(&column.name);
                }
            }
        }
    }
    Ok(columns)
}

fn merge_keys(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    sort_keys: &[SortKey],
) -> Result<Vec<OrderKeyDescriptor>> {
    sort_keys
        .iter()
        .map(|key| {
            let attno = chunk_attno(ctx, info.chunk_relid, key).ok_or_else(|| {
                TscompError::InvalidOrderingRequest(format!("{} is not a chunk column", key))
            })?;
            match info.mapping.role(attno)? {
                ColumnRole::OrderKey {
                    position,
                    ascending,
                    nulls_first,
                } => Ok(OrderKeyDescriptor {
                    column: info.mapping.column_name(attno)?.to_string(),
                    position,
                    ascending,
                    nulls_first,
                }),
                _ => Err(TscompError::InvalidOrderingRequest(format!(
                    "{} is not an order key",
                    key
                ))),
            }
        })
        .collect()
}

fn chunk_attno(ctx: &PlannerContext, chunk_relid: RelId, key: &SortKey) -> Option<AttrNumber> {
    let col = ctx.sort_key_expr_for_rel(key, chunk_relid)?.as_column()?;
    (col.relid == chunk_relid && col.is_user_column()).then_some(col.attno)
}

fn batch_sort_keys(info: &CompressionInfo, compressed_sort_keys: &[SortKey]) -> Result<Vec<BatchSortKey>> {
    compressed_sort_keys
        .iter()
        .map(|key| {
            let col = key
                .expr
                .as_column()
                .filter(|c| c.relid == info.compressed_relid)
                .ok_or_else(|| {
                    TscompError::InvalidOrderingRequest(format!(
                        "{} is not a compressed column",
                        key
                    ))
                })?;
            let seq_attno = info
                .mapping
                .physical_attno_by_name(SEQUENCE_NUM_COLUMN_NAME)?;
            let column = if col.attno == seq_attno {
                BatchSortColumn::SequenceNum
            } else {
                let attno = info.mapping.logical_attno(col.attno).ok_or_else(|| {
                    TscompError::InvalidOrderingRequest(format!("{} has no chunk column", key))
                })?;
                BatchSortColumn::Segment(info.mapping.column_name(attno)?.to_string())
            };
            Ok(BatchSortKey {
                column,
                descending: key.descending,
                nulls_first: key.nulls_first,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RelKind;
    use crate::generate::{generate_paths, StaticScanPathProvider};
    use crate::paths::ScanPath;
    use arrow_schema::DataType;
    use tscomp_catalog::{
        ChunkStatus, ColumnCompressionInfo, CompressionCatalog, CompressionSettings,
        InMemoryCompressionCatalog, RelationSchema,
    };
    use tscomp_common::{PlannerConfig, RelId};
    use tscomp_sql::{ColumnRef, Expr};

    fn plan_for(sort_keys: impl Fn(RelId) -> Vec<SortKey>) -> (PlannerContext, CompressionInfo, RelId) {
        let catalog = InMemoryCompressionCatalog::new();
        catalog
            .register_settings(
                CompressionSettings::try_new(
                    1,
                    vec![
                        ColumnCompressionInfo::order_key("time", 1, false, true),
                        ColumnCompressionInfo::segment_key("device_id"),
                        ColumnCompressionInfo::plain("value"),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        let schema = RelationSchema::new("_hyper_1_4_chunk")
            .with_column("time", DataType::Int64)
            .with_column("device_id", DataType::Int32)
            .with_column("value", DataType::Float64);
        catalog
            .register_chunk(4, 1, schema.clone(), ChunkStatus::compressed())
            .unwrap();

        let mut ctx = PlannerContext::new(PlannerConfig::default());
        let chunk = ctx.add_rel(RelKind::Base, schema);
        ctx.rel_mut(chunk).unwrap().target = vec![Expr::column(chunk, 3), Expr::column(chunk, 1)];
        ctx.query_sort_keys = sort_keys(chunk);
        let provider = StaticScanPathProvider::new(4.0)
            .with_path(Path::Scan(ScanPath::seq_scan(RelId(0), 4.0, 4.04)));
        let info = generate_paths(&mut ctx, &catalog, &provider, chunk, 4).unwrap();
        (ctx, info, chunk)
    }

    fn path_with(ctx: &PlannerContext, chunk: RelId, strategy: DecompressStrategy) -> Path {
        ctx.rel(chunk)
            .unwrap()
            .pathlist
            .iter()
            .find(|p| p.strategy() == Some(strategy))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_sorted_merge_plan() {
        // stored DESC NULLS FIRST, so ASC NULLS LAST is a backward merge
        let (ctx, info, chunk) = plan_for(|c| vec![SortKey::asc(c, 1)]);
        let path = path_with(&ctx, chunk, DecompressStrategy::SortedMerge);
        let plan = create_decompress_plan(&ctx, &info, &path).unwrap();

        assert_eq!(plan.strategy, DecompressStrategy::SortedMerge);
        assert!(plan.reverse);
        assert_eq!(plan.output_columns, vec!["value".to_string(), "time".to_string()]);
        assert!(plan.segment_columns.is_empty());
        assert_eq!(
            plan.order_keys,
            vec![OrderKeyDescriptor {
                column: "time".to_string(),
                position: 1,
                ascending: false,
                nulls_first: true,
            }]
        );
        assert!(plan.batch_sort_keys.is_empty());
        assert!(plan.enable_bulk_decompression);
    }

    #[test]
    fn test_pushdown_plan_sorts_batches() {
        let (mut ctx, info, chunk) =
            plan_for(|c| vec![SortKey::asc(c, 2), SortKey::desc(c, 1)]);
        ctx.rel_mut(chunk).unwrap().target.push(Expr::column(chunk, 2));
        let path = path_with(&ctx, chunk, DecompressStrategy::Pushdown);
        let plan = create_decompress_plan(&ctx, &info, &path).unwrap();

        assert!(!plan.reverse);
        assert!(plan.needs_sequence_num);
        assert_eq!(plan.segment_columns, vec!["device_id".to_string()]);
        assert_eq!(
            plan.batch_sort_keys,
            vec![
                BatchSortKey {
                    column: BatchSortColumn::Segment("device_id".to_string()),
                    descending: false,
                    nulls_first: false,
                },
                BatchSortKey {
                    column: BatchSortColumn::SequenceNum,
                    descending: false,
                    nulls_first: false,
                },
            ]
        );
    }

    #[test]
    fn test_whole_row_expands_to_all_columns() {
        let (mut ctx, info, chunk) = plan_for(|_| vec![]);
        ctx.rel_mut(chunk).unwrap().target = vec![Expr::Column(ColumnRef::whole_row(chunk))];
        let path = path_with(&ctx, chunk, DecompressStrategy::Plain);
        let plan = create_decompress_plan(&ctx, &info, &path).unwrap();
        assert_eq!(plan.output_columns, vec!["time", "device_id", "value"]);
        assert_eq!(plan.segment_columns, vec!["device_id"]);
    }

    #[test]
    fn test_scan_path_is_rejected() {
        let (ctx, info, _) = plan_for(|_| vec![]);
        let scan = Path::Scan(ScanPath::seq_scan(info.compressed_relid, 1.0, 1.0));
        assert!(matches!(
            create_decompress_plan(&ctx, &info, &scan),
            Err(TscompError::Planner(_))
        ));
    }
}
