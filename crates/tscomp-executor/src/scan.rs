//! Decompress scan for the plain and pushdown strategies
//!
//! Batches are consumed one after another, in source order or in the
//! batch order the plan asks for. No batch is opened before the previous
//! one is exhausted.

use crate::decompress::OpenBatch;
use crate::row::DecompressedRow;
use datafusion::scalar::ScalarValue;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use tscomp_common::Result;
use tscomp_planner::{BatchSortColumn, BatchSortKey, DecompressChunkPlan};
use tscomp_storage::{BatchDescriptor, BatchSource};

pub struct DecompressScan {
    plan: DecompressChunkPlan,
    source: Arc<dyn BatchSource>,
    pending: VecDeque<BatchDescriptor>,
    current: Option<OpenBatch>,
    opened: usize,
    done: bool,
}

impl DecompressScan {
    pub fn try_new(plan: DecompressChunkPlan, source: Arc<dyn BatchSource>) -> Result<Self> {
        let descriptors = source.descriptors()?;
        Ok(Self::with_descriptors(plan, source, descriptors))
    }

    /// Scan of the batches assigned to one of `workers` parallel workers.
    /// Workers see disjoint sets of batches.
    pub fn for_worker(
        plan: DecompressChunkPlan,
        source: Arc<dyn BatchSource>,
        worker: usize,
        workers: usize,
    ) -> Result<Self> {
        let workers = workers.max(1);
        let descriptors = source
            .descriptors()?
            .into_iter()
            .filter(|d| d.index % workers == worker)
            .collect();
        Ok(Self::with_descriptors(plan, source, descriptors))
    }

    fn with_descriptors(
        plan: DecompressChunkPlan,
        source: Arc<dyn BatchSource>,
        mut descriptors: Vec<BatchDescriptor>,
    ) -> Self {
        if !plan.batch_sort_keys.is_empty() {
            descriptors.sort_by(|a, b| compare_descriptors(a, b, &plan.batch_sort_keys));
        }
        debug!(
            "decompress scan of chunk {} over {} batches ({}, reverse={})",
            plan.chunk_id,
            descriptors.len(),
            plan.strategy,
            plan.reverse
        );
        Self {
            plan,
            source,
            pending: descriptors.into(),
            current: None,
            opened: 0,
            done: false,
        }
    }

    /// Number of batches opened so far
    pub fn opened_batches(&self) -> usize {
        self.opened
    }

    fn advance(&mut self) -> Result<Option<DecompressedRow>> {
        loop {
            if let Some(batch) = self.current.as_mut() {
                if let Some((_, row)) = batch.next_row()? {
                    return Ok(Some(row));
                }
                self.current = None;
            }
            let Some(descriptor) = self.pending.pop_front() else {
                return Ok(None);
            };
            self.current = Some(OpenBatch::open(self.source.as_ref(), descriptor, &self.plan)?);
            self.opened += 1;
        }
    }
}

impl Iterator for DecompressScan {
    type Item = Result<DecompressedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.current = None;
                Some(Err(e))
            }
        }
    }
}

fn compare_descriptors(a: &BatchDescriptor, b: &BatchDescriptor, keys: &[BatchSortKey]) -> Ordering {
    for key in keys {
        let ordering = match &key.column {
            BatchSortColumn::SequenceNum => {
                let ordering = a.sequence_num.cmp(&b.sequence_num);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            BatchSortColumn::Segment(name) => compare_scalars(
                a.segment_value(name),
                b.segment_value(name),
                key.descending,
                key.nulls_first,
            ),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Compare two optional values; a missing value counts as null
pub(crate) fn compare_scalars(
    a: Option<&ScalarValue>,
    b: Option<&ScalarValue>,
    descending: bool,
    nulls_first: bool,
) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) if nulls_first => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) if nulls_first => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}
