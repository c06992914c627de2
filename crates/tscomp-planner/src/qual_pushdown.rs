//! Filter pushdown onto the compressed relation
//!
//! Segment-key filters can be evaluated on the compressed relation as-is.
//! Order-key comparisons against a value fixed for the scan become
//! comparisons on the batch min/max metadata, which only rule out batches
//! that cannot contain a match. All pushed filters are re-checked on the
//! decompressed rows.

use crate::context::PlannerContext;
use crate::translate::CompressionInfo;
use tracing::debug;
use tscomp_catalog::{max_column_name, min_column_name, ColumnRole};
use tscomp_common::Result;
use tscomp_sql::{BinaryOperator, ColumnRef, Expr, RestrictInfo};

/// Translate the chunk's base restrictions that can be evaluated per batch
/// and attach them to the compressed relation. Returns the number pushed.
pub fn push_down_quals(ctx: &mut PlannerContext, info: &CompressionInfo) -> Result<usize> {
    let mut pushed = vec![];
    for ri in &ctx.rel(info.chunk_relid)?.base_restrict {
        if let Some(clause) = pushdown_clause(&ri.clause, info)? {
            pushed.push(RestrictInfo::new(clause));
        }
    }

    let count = pushed.len();
    debug!(
        "pushed {} of {} filters to compressed relation {}",
        count,
        ctx.rel(info.chunk_relid)?.base_restrict.len(),
        info.compressed_relid
    );
    ctx.rel_mut(info.compressed_relid)?.base_restrict.extend(pushed);
    Ok(count)
}

/// Batch-level form of one filter, or `None` when it cannot be pushed
pub fn pushdown_clause(clause: &Expr, info: &CompressionInfo) -> Result<Option<Expr>> {
    if clause.is_volatile() {
        return Ok(None);
    }

    let chunk_columns: Vec<ColumnRef> = clause
        .get_columns()
        .into_iter()
        .filter(|c| c.relid == info.chunk_relid)
        .collect();
    if chunk_columns.is_empty() {
        return Ok(None);
    }

    if chunk_columns
        .iter()
        .all(|c| c.is_user_column() && info.mapping.is_segment_key(c.attno))
    {
        return info.mapping.to_physical(clause).map(Some);
    }

    order_key_metadata_clause(clause, info)
}

fn order_key_metadata_clause(clause: &Expr, info: &CompressionInfo) -> Result<Option<Expr>> {
    let Expr::BinaryOp { left, op, right } = clause else {
        return Ok(None);
    };

    // normalize to `column <op> value`
    let (col, op, value) = match (left.as_column(), right.as_column()) {
        (Some(col), _) if right.is_const_or_param() => (col, *op, right.as_ref()),
        (_, Some(col)) if left.is_const_or_param() => match op.commute() {
            Some(commuted) => (col, commuted, left.as_ref()),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    if col.relid != info.chunk_relid || !col.is_user_column() {
        return Ok(None);
    }

    let position = match info.mapping.column(col.attno)?.role {
        Some(ColumnRole::OrderKey { position, .. }) => position,
        _ => return Ok(None),
    };

    let min = || -> Result<Expr> {
        Ok(Expr::column(
            info.compressed_relid,
            info.mapping.physical_attno_by_name(&min_column_name(position))?,
        ))
    };
    let max = || -> Result<Expr> {
        Ok(Expr::column(
            info.compressed_relid,
            info.mapping.physical_attno_by_name(&max_column_name(position))?,
        ))
    };

    let value = value.clone();
    let pushed = match op {
        BinaryOperator::Lt | BinaryOperator::Lte => Expr::binary(min()?, op, value),
        BinaryOperator::Gt | BinaryOperator::Gte => Expr::binary(max()?, op, value),
        BinaryOperator::Eq => Expr::and(
            Expr::binary(min()?, BinaryOperator::Lte, value.clone()),
            Expr::binary(max()?, BinaryOperator::Gte, value),
        ),
        _ => return Ok(None),
    };
    Ok(Some(pushed))
}
