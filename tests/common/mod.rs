//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use cassie::driver::memory::{MemoryCluster, TableSchema};
use cassie::{Cassie, Config, Message, Order, Value};
use parking_lot::Mutex;

pub const KEYSPACE: &str = "cassie_test";
pub const TABLE: &str = "things";

/// A cluster with `cassie_test.things`: partitioned by `owner`, clustered
/// by `id` descending
pub fn things_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.create_table(
        &format!("{}.{}", KEYSPACE, TABLE),
        TableSchema::new(["owner"]).clustering("id", Order::Desc),
    );
    cluster
}

pub fn config() -> Config {
    Config::builder()
        .host("127.0.0.1")
        .keyspace("default", KEYSPACE)
        .default_keyspace("default")
        .build()
}

/// A runtime and the cluster it talks to
pub fn setup() -> (MemoryCluster, Cassie) {
    let cluster = things_cluster();
    let cassie = Cassie::new(config(), cluster.driver());
    (cluster, cassie)
}

pub fn insert_thing(cassie: &Cassie, owner: i32, id: i32, val: &str) {
    cassie
        .insert(
            TABLE,
            &[
                ("owner", Value::Int(owner)),
                ("id", Value::Int(id)),
                ("val", Value::from(val)),
            ],
            None,
        )
        .unwrap();
}

/// `val` of every row in `owner`'s partition, in clustering order
pub fn vals(cassie: &Cassie, owner: i32) -> Vec<String> {
    cassie
        .find(
            "SELECT owner, id, val FROM things WHERE owner = ?",
            vec![Value::Int(owner)],
            None,
        )
        .unwrap()
        .column("val")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Collects every message the runtime publishes
pub fn record_messages(cassie: &Cassie) -> Arc<Mutex<Vec<Message>>> {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    cassie
        .subscribers()
        .subscribe(move |message: &Message| sink.lock().push(message.clone()));
    messages
}
