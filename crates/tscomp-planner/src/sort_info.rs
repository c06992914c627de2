//! Sort-Compatibility Analysis
//!
//! Decides whether a requested ordering can be produced from the physical
//! layout of the compressed chunk:
//!
//! - pushdown: segment keys prefix the ordering (or are fixed by equality
//!   filters) and the remainder follows the order keys, so batches fetched
//!   in segment and sequence-number order can be emitted as decompressed
//! - sorted merge: the ordering is a prefix of the order keys; batches are
//!   individually sorted and a heap merge interleaves them
//!
//! The first order key decides between a forward and a backward scan; later
//! keys must agree with it.

use crate::context::{PlannerContext, RelInfo};
use crate::translate::CompressionInfo;
use std::collections::BTreeSet;
use tscomp_catalog::{ColumnRole, OrderKeyInfo, SEQUENCE_NUM_COLUMN_NAME};
use tscomp_common::{AttrNumber, Result};
use tscomp_sql::{BinaryOperator, Expr, SortKey};

/// Result of the pushdown analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortInfo {
    pub can_pushdown_sort: bool,
    /// The ordering extends past the segment keys and needs the batch
    /// sequence number as a tie-break
    pub needs_sequence_num: bool,
    pub reverse: bool,
    /// Ordering the compressed sub-scan has to deliver
    pub compressed_sort_keys: Vec<SortKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEligibility {
    NotPossible,
    Forward,
    Backward,
}

impl MergeEligibility {
    pub fn is_mergeable(self) -> bool {
        self != MergeEligibility::NotPossible
    }
}

/// Combined verdict on a requested ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingClass {
    None,
    Pushdown { reverse: bool },
    SortedMerge { reverse: bool },
}

/// Direction in which an order key satisfies a requested sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanDirection {
    Forward,
    Backward,
}

fn match_direction(key: &SortKey, order: OrderKeyInfo) -> Option<ScanDirection> {
    let requested_ascending = !key.descending;
    if requested_ascending == order.ascending && key.nulls_first == order.nulls_first {
        Some(ScanDirection::Forward)
    } else if requested_ascending != order.ascending && key.nulls_first != order.nulls_first {
        Some(ScanDirection::Backward)
    } else {
        None
    }
}

/// Chunk attribute a sort key refers to, if it is a plain user column
fn sort_key_attno(ctx: &PlannerContext, info: &CompressionInfo, key: &SortKey) -> Option<AttrNumber> {
    let col = ctx.sort_key_expr_for_rel(key, info.chunk_relid)?.as_column()?;
    (col.relid == info.chunk_relid && col.is_user_column()).then_some(col.attno)
}

/// Segment-key attributes fixed by an equality filter against a constant or
/// parameter
pub fn segment_key_equalities(chunk: &RelInfo, info: &CompressionInfo) -> BTreeSet<AttrNumber> {
    let mut result = BTreeSet::new();
    for ri in &chunk.base_restrict {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = &ri.clause
        else {
            continue;
        };
        let (col, other) = match (left.as_column(), right.as_column()) {
            (Some(col), _) => (col, right.as_ref()),
            (None, Some(col)) => (col, left.as_ref()),
            (None, None) => continue,
        };
        if col.relid != info.chunk_relid || !col.is_user_column() {
            continue;
        }
        if other.is_const_or_param() && info.chunk_segment_attnos.contains(&col.attno) {
            result.insert(col.attno);
        }
    }
    result
}

/// Check whether the ordering can be pushed below decompression.
pub fn build_sort_info(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    requirement: &[SortKey],
) -> Result<SortInfo> {
    let mut sort_info = SortInfo::default();
    if requirement.is_empty() || info.status.unordered {
        return Ok(sort_info);
    }

    let mut keys = requirement.iter().peekable();

    if info.num_segment_keys > 0 {
        let mut segment_columns = segment_key_equalities(ctx.rel(info.chunk_relid)?, info);

        // keep going after all segment keys are seen, a key may be both
        // filtered and requested
        while let Some(key) = keys.peek() {
            let Some(attno) = sort_key_attno(ctx, info, key) else {
                break;
            };
            if info.mapping.role(attno)? != ColumnRole::SegmentKey {
                break;
            }
            segment_columns.insert(attno);
            keys.next();
        }

        if keys.peek().is_some() && segment_columns.len() != info.num_segment_keys {
            return Ok(sort_info);
        }
    }

    let order_keys: Vec<&SortKey> = keys.collect();
    sort_info.needs_sequence_num = !order_keys.is_empty();

    for (idx, key) in order_keys.iter().enumerate() {
        let Some(attno) = sort_key_attno(ctx, info, key) else {
            return Ok(SortInfo::default());
        };
        let order = match info.mapping.role(attno)? {
            ColumnRole::OrderKey {
                position,
                ascending,
                nulls_first,
            } if usize::from(position) == idx + 1 => OrderKeyInfo {
                position,
                ascending,
                nulls_first,
            },
            _ => return Ok(SortInfo::default()),
        };
        let Some(direction) = match_direction(key, order) else {
            return Ok(SortInfo::default());
        };
        let reverse = direction == ScanDirection::Backward;
        if idx == 0 {
            sort_info.reverse = reverse;
        } else if reverse != sort_info.reverse {
            return Ok(SortInfo::default());
        }
    }

    sort_info.can_pushdown_sort = true;
    sort_info.compressed_sort_keys = build_compressed_sort_keys(ctx, info, requirement, &sort_info)?;
    Ok(sort_info)
}

/// Ordering of the compressed sub-scan that realizes a pushdown: the
/// requested segment keys, then the sequence number when needed.
fn build_compressed_sort_keys(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    requirement: &[SortKey],
    sort_info: &SortInfo,
) -> Result<Vec<SortKey>> {
    let mut keys = vec![];

    if info.num_segment_keys > 0 {
        let mut segment_columns = segment_key_equalities(ctx.rel(info.chunk_relid)?, info);
        for key in requirement {
            if segment_columns.len() >= info.num_segment_keys {
                break;
            }
            let Some(attno) = sort_key_attno(ctx, info, key) else {
                break;
            };
            if !info.mapping.is_segment_key(attno) {
                break;
            }
            if !segment_columns.insert(attno) {
                continue;
            }
            keys.push(SortKey::new(
                Expr::column(info.compressed_relid, info.mapping.physical_attno(attno)?),
                key.descending,
                key.nulls_first,
            ));
        }
    }

    if sort_info.needs_sequence_num {
        let seq = Expr::column(
            info.compressed_relid,
            info.mapping.physical_attno_by_name(SEQUENCE_NUM_COLUMN_NAME)?,
        );
        keys.push(if sort_info.reverse {
            SortKey::new(seq, true, true)
        } else {
            SortKey::new(seq, false, false)
        });
    }

    Ok(keys)
}

/// Check whether a heap merge of the batches yields the ordering: the
/// requested key `i` must be the order key at position `i + 1`.
pub fn sorted_merge_eligibility(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    requirement: &[SortKey],
) -> Result<MergeEligibility> {
    if requirement.is_empty() || info.status.unordered {
        return Ok(MergeEligibility::NotPossible);
    }

    let mut direction = None;
    for (idx, key) in requirement.iter().enumerate() {
        let Some(attno) = sort_key_attno(ctx, info, key) else {
            return Ok(MergeEligibility::NotPossible);
        };
        let order = match info.mapping.role(attno)? {
            ColumnRole::OrderKey {
                position,
                ascending,
                nulls_first,
            } if usize::from(position) == idx + 1 => OrderKeyInfo {
                position,
                ascending,
                nulls_first,
            },
            _ => return Ok(MergeEligibility::NotPossible),
        };
        let Some(matched) = match_direction(key, order) else {
            return Ok(MergeEligibility::NotPossible);
        };
        match direction {
            None => direction = Some(matched),
            Some(d) if d == matched => {}
            Some(_) => return Ok(MergeEligibility::NotPossible),
        }
    }

    Ok(match direction {
        Some(ScanDirection::Backward) => MergeEligibility::Backward,
        _ => MergeEligibility::Forward,
    })
}

/// Pushdown wins over a sorted merge; either beats an explicit sort.
pub fn classify(
    ctx: &PlannerContext,
    info: &CompressionInfo,
    requirement: &[SortKey],
) -> Result<OrderingClass> {
    if requirement.is_empty() {
        return Ok(OrderingClass::None);
    }
    let sort_info = build_sort_info(ctx, info, requirement)?;
    if sort_info.can_pushdown_sort {
        return Ok(OrderingClass::Pushdown {
            reverse: sort_info.reverse,
        });
    }
    Ok(match sorted_merge_eligibility(ctx, info, requirement)? {
        MergeEligibility::Forward => OrderingClass::SortedMerge { reverse: false },
        MergeEligibility::Backward => OrderingClass::SortedMerge { reverse: true },
        MergeEligibility::NotPossible => OrderingClass::None,
    })
}
