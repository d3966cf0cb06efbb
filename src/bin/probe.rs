//! Cassie Probe Binary
//!
//! Seeds a partition on an in-memory cluster and reports where offsets land
//! and how many round trips the offset walk took.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cassie::driver::memory::{MemoryCluster, TableSchema};
use cassie::{Cassie, Config, OffsetQuery, Order, Value};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

const KEYSPACE: &str = "probe";
const TABLE: &str = "items";
const SEED_BATCH: usize = 100;

/// Cassie offset probe
#[derive(Parser, Debug)]
#[command(name = "cassie-probe")]
#[command(about = "Measure offset lookups against an in-memory partition")]
#[command(version)]
struct Args {
    /// Rows to seed into the partition
    #[arg(short, long, default_value = "1000")]
    rows: usize,

    /// Offsets to look up (repeatable)
    #[arg(short, long, default_values_t = vec![0usize, 10, 500])]
    offset: Vec<usize>,

    /// Rows fetched per round trip
    #[arg(short, long, default_value = "1000")]
    batch_size: usize,

    /// Order the table clusters rows in (asc or desc)
    #[arg(long, default_value = "asc")]
    clustering: Order,

    /// Order to count in; defaults to the clustering order
    #[arg(long)]
    order: Option<Order>,

    /// Optional JSON configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cassie=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("Cassie Probe v{}", cassie::VERSION);

    if let Err(e) = run(&args) {
        tracing::error!("Probe failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> cassie::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if config.default_keyspace.is_none() {
        config.default_keyspace = Some(KEYSPACE.to_string());
    }
    let keyspace = config.session_keyspace().unwrap_or_else(|| KEYSPACE.to_string());

    let cluster = MemoryCluster::new();
    cluster.create_table(
        &format!("{}.{}", keyspace, TABLE),
        TableSchema::new(["owner"]).clustering("id", args.clustering),
    );
    let cassie = Cassie::new(config, cluster.driver());

    let round_trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&round_trips);
    cassie.subscribers().subscribe(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    seed(&cassie, args.rows)?;
    tracing::info!(
        rows = args.rows,
        round_trips = round_trips.load(Ordering::Relaxed),
        "Partition seeded"
    );

    let mut query = OffsetQuery::new(TABLE, "id")
        .key("owner", 1)
        .clustering_order(args.clustering)
        .batch_size(args.batch_size);
    if let Some(order) = args.order {
        query = query.order(order);
    }

    for &offset in &args.offset {
        round_trips.store(0, Ordering::Relaxed);
        let start = Instant::now();
        let found = cassie.offset_to_key(&query, offset)?;
        let elapsed = start.elapsed();

        let found = found.map_or_else(|| "none".to_string(), |value| value.to_string());
        println!(
            "offset {:>8} -> {:>8}  ({} round trips, {:.3} ms)",
            offset,
            found,
            round_trips.load(Ordering::Relaxed),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn seed(cassie: &Cassie, rows: usize) -> cassie::Result<()> {
    let ids: Vec<i64> = (1..=rows as i64).collect();
    for chunk in ids.chunks(SEED_BATCH) {
        cassie.batch(None, || {
            for id in chunk {
                cassie.insert(
                    TABLE,
                    &[
                        ("owner", Value::Int(1)),
                        ("id", Value::BigInt(*id)),
                        ("val", Value::from(format!("item-{}", id))),
                    ],
                    None,
                )?;
            }
            Ok(())
        })?;
    }
    Ok(())
}
