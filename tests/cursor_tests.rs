//! Tests for the Cursor Pagination Engine
//!
//! These tests verify:
//! - Offset lookups in ascending and descending partitions
//! - Round trips taken for small batch sizes
//! - Exclusive min/max windows
//! - Lookups past the end of a partition

#![cfg(feature = "memory")]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cassie::driver::memory::{MemoryCluster, TableSchema};
use cassie::{Cassie, CassieError, Config, Consistency, OffsetQuery, Order, Value};
use common::{insert_thing, setup};

// =============================================================================
// Helper Functions
// =============================================================================

/// An ascending partition holding `ids` under owner 1
fn ascending(ids: &[i32]) -> (MemoryCluster, Cassie) {
    let cluster = MemoryCluster::new();
    cluster.create_table(
        "app.events",
        TableSchema::new(["owner"]).clustering("id", Order::Asc),
    );
    let cassie = Cassie::new(
        Config::builder().default_keyspace("app").build(),
        cluster.driver(),
    );
    for id in ids {
        cassie
            .insert(
                "events",
                &[("owner", Value::Int(1)), ("id", Value::Int(*id))],
                None,
            )
            .unwrap();
    }
    (cluster, cassie)
}

fn count_round_trips(cassie: &Cassie) -> Arc<AtomicUsize> {
    let trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&trips);
    cassie.subscribers().subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    trips
}

/// The descending `things` partition used by the record-layer tests:
/// owner 1 holds ids 5, 4, 3, 2
fn things() -> Cassie {
    let (_cluster, cassie) = setup();
    insert_thing(&cassie, 1, 2, "foo");
    insert_thing(&cassie, 1, 3, "bar");
    insert_thing(&cassie, 1, 4, "blah");
    insert_thing(&cassie, 1, 5, "mip");
    insert_thing(&cassie, 2, 2, "grl");
    cassie
}

fn things_query() -> OffsetQuery {
    OffsetQuery::new("things", "id")
        .key("owner", 1)
        .clustering_order(Order::Desc)
}

// =============================================================================
// Ascending Partition Tests
// =============================================================================

#[test]
fn test_offset_in_single_page() {
    let (_cluster, cassie) = ascending(&[2, 3, 4, 5]);
    let query = OffsetQuery::new("events", "id").key("owner", 1);
    assert_eq!(cassie.offset_to_key(&query, 2).unwrap(), Some(Value::Int(4)));
    assert_eq!(cassie.offset_to_key(&query, 0).unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_batch_size_one_takes_three_round_trips() {
    let (_cluster, cassie) = ascending(&[2, 3, 4, 5]);
    let trips = count_round_trips(&cassie);
    let query = OffsetQuery::new("events", "id").key("owner", 1).batch_size(1);

    assert_eq!(cassie.offset_to_key(&query, 2).unwrap(), Some(Value::Int(4)));
    assert_eq!(trips.load(Ordering::SeqCst), 3);
}

#[test]
fn test_offset_past_the_end() {
    let (_cluster, cassie) = ascending(&[2, 3, 4, 5]);
    let query = OffsetQuery::new("events", "id").key("owner", 1);
    assert_eq!(cassie.offset_to_key(&query, 10).unwrap(), None);
    assert_eq!(cassie.offset_to_key(&query, 4).unwrap(), None);
    assert_eq!(cassie.offset_to_key(&query.clone().batch_size(1), 4).unwrap(), None);
}

#[test]
fn test_empty_partition() {
    let (_cluster, cassie) = ascending(&[]);
    let query = OffsetQuery::new("events", "id").key("owner", 1);
    assert_eq!(cassie.offset_to_key(&query, 0).unwrap(), None);
}

#[test]
fn test_large_partition_round_trips() {
    let ids: Vec<i32> = (1..=250).collect();
    let (_cluster, cassie) = ascending(&ids);
    let trips = count_round_trips(&cassie);
    let query = OffsetQuery::new("events", "id").key("owner", 1).batch_size(50);

    assert_eq!(cassie.offset_to_key(&query, 120).unwrap(), Some(Value::Int(121)));
    // Two full pages of 50, then a page of 21 ending on the target.
    assert_eq!(trips.load(Ordering::SeqCst), 3);
}

#[test]
fn test_descending_scan_of_ascending_table() {
    let (cluster, cassie) = ascending(&[2, 3, 4, 5]);
    let query = OffsetQuery::new("events", "id")
        .key("owner", 1)
        .order(Order::Desc);
    assert_eq!(cassie.offset_to_key(&query, 1).unwrap(), Some(Value::Int(4)));
    assert!(cluster
        .executed()
        .iter()
        .any(|e| e.cql.contains("ORDER BY id DESC")));
}

// =============================================================================
// Descending Partition Tests
// =============================================================================

#[test]
fn test_descending_partition_offsets() {
    let cassie = things();
    let query = things_query();

    assert_eq!(cassie.offset_to_key(&query, 2).unwrap(), Some(Value::Int(3)));
    assert_eq!(
        cassie.offset_to_key(&query.clone().order(Order::Asc), 2).unwrap(),
        Some(Value::Int(4))
    );
    assert_eq!(
        cassie.offset_to_key(&query.clone().batch_size(1), 2).unwrap(),
        Some(Value::Int(3))
    );
    assert_eq!(
        cassie.offset_to_key(&query.clone().batch_size(1), 3).unwrap(),
        Some(Value::Int(2))
    );
    assert_eq!(cassie.offset_to_key(&query.clone().batch_size(1), 4).unwrap(), None);
    assert_eq!(cassie.offset_to_key(&query.clone().batch_size(100), 4).unwrap(), None);
}

#[test]
fn test_min_and_max_windows() {
    let cassie = things();
    let query = things_query().batch_size(1);

    assert_eq!(
        cassie.offset_to_key(&query.clone().min(3), 1).unwrap(),
        Some(Value::Int(4))
    );
    assert_eq!(
        cassie
            .offset_to_key(&query.clone().order(Order::Desc).max(5), 1)
            .unwrap(),
        Some(Value::Int(3))
    );
}

#[test]
fn test_no_order_by_when_order_matches_clustering() {
    let (cluster, cassie) = setup();
    insert_thing(&cassie, 1, 2, "foo");
    cluster.clear_executed();

    cassie.offset_to_key(&things_query(), 0).unwrap();
    let executed = cluster.executed();
    assert_eq!(executed.len(), 1);
    assert!(!executed[0].cql.contains("ORDER BY"));
}

// =============================================================================
// Option Tests
// =============================================================================

#[test]
fn test_page_queries_carry_consistency() {
    let (cluster, cassie) = setup();
    insert_thing(&cassie, 1, 2, "foo");
    insert_thing(&cassie, 1, 3, "bar");
    cluster.clear_executed();

    let query = things_query().batch_size(1).consistency(Consistency::Quorum);
    assert_eq!(cassie.offset_to_key(&query, 1).unwrap(), Some(Value::Int(2)));

    let executed = cluster.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed
        .iter()
        .all(|e| e.consistency == Some(Consistency::Quorum)));
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let cassie = things();
    let query = things_query().batch_size(0);
    assert!(matches!(
        cassie.offset_to_key(&query, 1),
        Err(CassieError::InvalidArgument(_))
    ));
}
