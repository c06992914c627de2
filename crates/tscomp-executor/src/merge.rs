//! Batch merge executor
//!
//! Streams the rows of individually sorted batches in one global order.
//! Batches are queued by the first key they can produce in scan direction,
//! derived from their min/max statistics. A queued batch is opened once
//! that bound is not past the key at the top of the heap, so every batch
//! that could produce the next output row is open before the row leaves.
//!
//! The heap holds one entry per open batch: the current row of the batch
//! keyed by its order-key tuple in row format, then the batch sequence
//! number. Forward scans pop the smallest entry, backward scans the
//! largest.

use crate::decompress::OpenBatch;
use crate::row::DecompressedRow;
use arrow::row::{OwnedRow, RowConverter, Rows, SortField};
use arrow_array::ArrayRef;
use arrow_schema::{DataType, SortOptions};
use datafusion::scalar::ScalarValue;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};
use tscomp_common::{Result, TscompError};
use tscomp_planner::{DecompressChunkPlan, OrderKeyDescriptor};
use tscomp_storage::{BatchDescriptor, BatchSource};

/// A batch waiting to be opened
struct QueuedBatch {
    bound: OwnedRow,
    descriptor: BatchDescriptor,
}

/// An open batch with the encoded keys of its payload rows
struct MergeCursor {
    batch: OpenBatch,
    keys: Rows,
}

struct HeapEntry {
    key: OwnedRow,
    sequence_num: i32,
    slot: usize,
    row: DecompressedRow,
    reverse: bool,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest entry
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = self
            .key
            .cmp(&other.key)
            .then(self.sequence_num.cmp(&other.sequence_num));
        if self.reverse {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

pub struct BatchMergeExec {
    plan: DecompressChunkPlan,
    source: Arc<dyn BatchSource>,
    converter: RowConverter,
    key_types: Vec<DataType>,
    queue: VecDeque<QueuedBatch>,
    cursors: Vec<Option<MergeCursor>>,
    heap: BinaryHeap<HeapEntry>,
    /// Batch opened last
    frontier: Option<usize>,
    opened: usize,
    done: bool,
}

impl BatchMergeExec {
    pub fn try_new(plan: DecompressChunkPlan, source: Arc<dyn BatchSource>) -> Result<Self> {
        if plan.order_keys.is_empty() {
            return Err(TscompError::Execution(
                "sorted merge needs at least one order key".to_string(),
            ));
        }
        if !plan.needs_sequence_num {
            return Err(TscompError::Execution(
                "sorted merge needs batch sequence numbers to break ties".to_string(),
            ));
        }

        let schema = source.schema();
        let mut fields = vec![];
        let mut key_types = vec![];
        for key in &plan.order_keys {
            let field = schema
                .field_with_name(&key.column)
                .map_err(|_| TscompError::schema_mismatch(key.column.as_str(), "chunk rows"))?;
            fields.push(SortField::new_with_options(
                field.data_type().clone(),
                SortOptions {
                    descending: !key.ascending,
                    nulls_first: key.nulls_first,
                },
            ));
            key_types.push(field.data_type().clone());
        }
        let converter = RowConverter::new(fields)?;

        let mut exec = Self {
            plan,
            source,
            converter,
            key_types,
            queue: VecDeque::new(),
            cursors: vec![],
            heap: BinaryHeap::new(),
            frontier: None,
            opened: 0,
            done: false,
        };

        let mut queue = exec
            .source
            .descriptors()?
            .into_iter()
            .map(|descriptor| {
                Ok(QueuedBatch {
                    bound: exec.bound(&descriptor)?,
                    descriptor,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        queue.sort_by(|a, b| {
            let ordering = a
                .bound
                .cmp(&b.bound)
                .then(a.descriptor.sequence_num.cmp(&b.descriptor.sequence_num));
            if exec.plan.reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        debug!(
            "sorted merge of chunk {} over {} batches, reverse={}",
            exec.plan.chunk_id,
            queue.len(),
            exec.plan.reverse
        );
        exec.queue = queue.into();
        Ok(exec)
    }

    /// Number of batches opened so far
    pub fn opened_batches(&self) -> usize {
        self.opened
    }

    /// Number of batches currently open
    pub fn open_batches(&self) -> usize {
        self.cursors.iter().filter(|c| c.is_some()).count()
    }

    /// Index of the batch opened last
    pub fn frontier(&self) -> Option<usize> {
        self.frontier
    }

    /// First key the batch produces in scan direction, per key column: the
    /// null if nulls come first in scan direction, else the statistic at
    /// the front of the batch.
    fn bound(&self, descriptor: &BatchDescriptor) -> Result<OwnedRow> {
        let reverse = self.plan.reverse;
        let columns = self
            .plan
            .order_keys
            .iter()
            .zip(&self.key_types)
            .map(|(key, data_type)| {
                let value = bound_value(descriptor, key, data_type, reverse)?;
                Ok(value.to_array_of_size(1)?)
            })
            .collect::<Result<Vec<ArrayRef>>>()?;
        let rows = self.converter.convert_columns(&columns)?;
        Ok(rows.row(0).owned())
    }

    /// Open every queued batch that could produce a row not after the
    /// current heap top.
    fn admit(&mut self) -> Result<()> {
        while let Some(next) = self.queue.front() {
            let admit = match self.heap.peek() {
                None => true,
                Some(top) if self.plan.reverse => next.bound >= top.key,
                Some(top) => next.bound <= top.key,
            };
            if !admit {
                break;
            }
            let Some(queued) = self.queue.pop_front() else {
                break;
            };
            self.open(queued.descriptor)?;
        }
        Ok(())
    }

    fn open(&mut self, descriptor: BatchDescriptor) -> Result<()> {
        let index = descriptor.index;
        let sequence_num = descriptor.sequence_num;
        let batch = OpenBatch::open(self.source.as_ref(), descriptor, &self.plan)?;

        let key_columns = self
            .plan
            .order_keys
            .iter()
            .map(|key| {
                batch.payload.column_by_name(&key.column).cloned().ok_or_else(|| {
                    TscompError::schema_mismatch(key.column.as_str(), "compressed batch")
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let keys = self.converter.convert_columns(&key_columns)?;

        let slot = self.cursors.len();
        self.cursors.push(Some(MergeCursor { batch, keys }));
        self.opened += 1;
        trace!(
            "opened batch {} (seq {}) after frontier {:?}, {} open",
            index,
            sequence_num,
            self.frontier,
            self.heap.len() + 1
        );
        self.frontier = Some(index);
        self.push_next(slot)
    }

    /// Move the cursor in `slot` to its next row, closing it when exhausted
    fn push_next(&mut self, slot: usize) -> Result<()> {
        let Some(cursor) = self.cursors.get_mut(slot).and_then(|c| c.as_mut()) else {
            return Ok(());
        };
        match cursor.batch.next_row()? {
            Some((position, row)) => {
                let entry = HeapEntry {
                    key: cursor.keys.row(position).owned(),
                    sequence_num: row.sequence_num,
                    slot,
                    row,
                    reverse: self.plan.reverse,
                };
                self.heap.push(entry);
            }
            None => {
                trace!("closed batch {}", cursor.batch.descriptor.index);
                self.cursors[slot] = None;
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<DecompressedRow>> {
        self.admit()?;
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        self.push_next(entry.slot)?;
        Ok(Some(entry.row))
    }
}

fn bound_value(
    descriptor: &BatchDescriptor,
    key: &OrderKeyDescriptor,
    data_type: &DataType,
    reverse: bool,
) -> Result<ScalarValue> {
    let stats = descriptor.stats(key.position)?;
    // nulls come first in scan direction
    if stats.has_nulls && key.nulls_first != reverse {
        return Ok(ScalarValue::try_from(data_type)?);
    }
    // the first stored value is the min of an ascending column
    let value = if key.ascending != reverse {
        &stats.min
    } else {
        &stats.max
    };
    Ok(value.clone())
}

impl Iterator for BatchMergeExec {
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
                self.heap.clear();
                self.cursors.clear();
                Some(Err(e))
            }
        }
    }
}
