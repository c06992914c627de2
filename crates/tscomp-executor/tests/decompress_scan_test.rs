//! Test: Plain and pushdown decompression scans

mod common;

use common::*;
use datafusion::scalar::ScalarValue;
use std::sync::Arc;
use tscomp_common::TscompError;
use tscomp_executor::{
    collect_record_batch, execute, output_schema, DecompressScan, DecompressedRow,
};
use tscomp_planner::{BatchSortColumn, BatchSortKey, DecompressStrategy};
use tscomp_storage::{BatchSource, InMemoryBatchStore};

fn drain(scan: impl Iterator<Item = tscomp_common::Result<DecompressedRow>>) -> Vec<DecompressedRow> {
    scan.collect::<tscomp_common::Result<Vec<_>>>().unwrap()
}

/// Test 1: Plain scan emits every batch in source order
#[test]
fn test_plain_scan_source_order() {
    let store = overlapping_store();
    let rows = drain(execute(&plan(DecompressStrategy::Plain, false), store.clone()).unwrap());

    assert_eq!(rows.len(), store.total_rows());
    let batches: Vec<usize> = rows.iter().map(|r| r.batch_index).collect();
    assert!(batches.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(time_of(&rows[0]), Some(0));
    assert_eq!(time_of(&rows[11]), Some(5));
    assert_eq!(device_of(&rows[11]), 2);
    assert_eq!(rows[11].sequence_num, 20);
}

/// Test 2: Batches are opened lazily, one at a time
#[test]
fn test_plain_scan_opens_batches_on_demand() {
    let store = overlapping_store();
    let mut scan =
        DecompressScan::try_new(plan(DecompressStrategy::Plain, false), store.clone()).unwrap();
    assert_eq!(scan.opened_batches(), 0);
    assert_eq!(store.payload_reads(), 0);

    for _ in 0..11 {
        scan.next().unwrap().unwrap();
    }
    assert_eq!(scan.opened_batches(), 1);

    scan.next().unwrap().unwrap();
    assert_eq!(scan.opened_batches(), 2);
    assert_eq!(store.payload_reads(), 2);
}

/// Test 3: Pushdown sorts the batches by segment value and sequence number
#[test]
fn test_pushdown_sorts_batches() {
    let store = store(vec![
        batch(&range(20, 22), 1, 30),
        batch(&range(0, 2), 2, 10),
        batch(&range(0, 2), 1, 10),
        batch(&range(10, 12), 1, 20),
    ]);
    let mut plan = plan(DecompressStrategy::Pushdown, false);
    plan.batch_sort_keys = vec![
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
    ];

    let rows = drain(execute(&plan, store).unwrap());
    let keys: Vec<(i32, Option<i64>)> = rows.iter().map(|r| (device_of(r), time_of(r))).collect();
    let mut expected = keys.clone();
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(keys.first(), Some(&(1, Some(0))));
    assert_eq!(keys.last(), Some(&(2, Some(2))));
}

/// Test 4: A reverse pushdown walks batches and rows back to front
#[test]
fn test_reverse_pushdown() {
    let store = store(vec![
        batch(&range(0, 2), 1, 10),
        batch(&range(3, 5), 1, 20),
        batch(&range(0, 1), 2, 10),
    ]);
    let mut plan = plan(DecompressStrategy::Pushdown, true);
    plan.batch_sort_keys = vec![
        BatchSortKey {
            column: BatchSortColumn::Segment("device_id".to_string()),
            descending: true,
            nulls_first: true,
        },
        BatchSortKey {
            column: BatchSortColumn::SequenceNum,
            descending: true,
            nulls_first: true,
        },
    ];

    let rows = drain(execute(&plan, store).unwrap());
    let keys: Vec<(i32, Option<i64>)> = rows.iter().map(|r| (device_of(r), time_of(r))).collect();
    assert_eq!(
        keys,
        vec![
            (2, Some(1)),
            (2, Some(0)),
            (1, Some(5)),
            (1, Some(4)),
            (1, Some(3)),
            (1, Some(2)),
            (1, Some(1)),
            (1, Some(0)),
        ]
    );
}

/// Test 5: Bulk and row-by-row decompression agree
#[test]
fn test_bulk_matches_row_by_row() {
    let store = overlapping_store();
    let row_by_row = drain(execute(&plan(DecompressStrategy::Plain, true), store.clone()).unwrap());

    let mut bulk_plan = plan(DecompressStrategy::Plain, true);
    bulk_plan.enable_bulk_decompression = true;
    let bulk = drain(execute(&bulk_plan, store).unwrap());

    assert_eq!(bulk, row_by_row);
    assert_eq!(time_of(&bulk[0]), Some(10));
}

/// Test 6: Parallel workers see disjoint batches covering the chunk
#[test]
fn test_workers_split_batches() {
    let store = overlapping_store();
    let plan = plan(DecompressStrategy::Plain, false);

    let mut seen = vec![];
    for worker in 0..2 {
        let scan = DecompressScan::for_worker(plan.clone(), store.clone(), worker, 2).unwrap();
        let rows = drain(scan);
        println!("worker {} decompressed {} rows", worker, rows.len());
        seen.extend(rows.iter().map(|r| (worker, r.batch_index)));
    }

    assert_eq!(seen.len(), store.total_rows());
    for (worker, index) in &seen {
        assert!(!seen.iter().any(|(w, i)| w != worker && i == index));
    }
}

/// Test 7: A failed payload read ends the stream
#[test]
fn test_read_failure_ends_scan() {
    let source = Arc::new(FailingSource {
        inner: overlapping_store(),
        fail_at: 1,
    });
    let mut scan = execute(&plan(DecompressStrategy::Plain, false), source).unwrap();

    for _ in 0..11 {
        assert!(scan.next().unwrap().is_ok());
    }
    assert!(matches!(scan.next(), Some(Err(TscompError::Storage(_)))));
    assert!(scan.next().is_none());
}

/// Test 8: Output columns missing from the batches are rejected on open
#[test]
fn test_unknown_output_column() {
    let mut plan = plan(DecompressStrategy::Plain, false);
    plan.output_columns.push("humidity".to_string());
    let mut scan = execute(&plan, overlapping_store()).unwrap();

    match scan.next() {
        Some(Err(TscompError::SchemaMismatch { column, .. })) => assert_eq!(column, "humidity"),
        other => panic!("expected schema mismatch, got {:?}", other),
    }
}

/// Test 9: Collected rows form a record batch of the output schema
#[test]
fn test_collect_record_batch() {
    let store = store(vec![batch(&[Some(2), None, Some(1)], 7, 10)]);
    let mut plan = plan(DecompressStrategy::Plain, false);
    plan.output_columns = vec!["value".to_string(), "device_id".to_string()];

    let schema = output_schema(&store.schema(), &plan.output_columns).unwrap();
    let batch = collect_record_batch(execute(&plan, store).unwrap(), schema).unwrap();

    assert_eq!(batch.num_rows(), 3);
    assert_eq!(batch.schema().field(0).name(), "value");
    // payload is stored in time order, nulls last
    assert_eq!(
        ScalarValue::try_from_array(batch.column(0), 0).unwrap(),
        ScalarValue::Float64(Some(1.0))
    );
    assert_eq!(
        ScalarValue::try_from_array(batch.column(0), 2).unwrap(),
        ScalarValue::Float64(Some(-1.0))
    );
    assert_eq!(
        ScalarValue::try_from_array(batch.column(1), 1).unwrap(),
        ScalarValue::Int32(Some(7))
    );
}

/// Test 10: An empty chunk yields an empty batch
#[test]
fn test_empty_chunk() {
    let store = Arc::new(InMemoryBatchStore::new(chunk_schema()));
    let plan = plan(DecompressStrategy::Plain, false);
    let schema = output_schema(&store.schema(), &plan.output_columns).unwrap();

    let batch = collect_record_batch(execute(&plan, store).unwrap(), schema).unwrap();
    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.num_columns(), 3);
}

/// Test 11: Segment columns come from the batch descriptor
#[test]
fn test_missing_segment_value() {
    let mut broken = batch(&range(0, 2), 3, 10);
    broken.descriptor.segment_values.clear();
    let store = store(vec![batch(&range(0, 1), 1, 10), broken]);
    let mut scan = execute(&plan(DecompressStrategy::Plain, false), store).unwrap();

    assert_eq!(device_of(&scan.next().unwrap().unwrap()), 1);
    assert_eq!(device_of(&scan.next().unwrap().unwrap()), 1);
    assert!(matches!(scan.next(), Some(Err(TscompError::Storage(_)))));
    assert!(scan.next().is_none());
}
