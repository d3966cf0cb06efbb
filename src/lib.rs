//! # Cassie
//!
//! A client runtime for Cassandra-style wide-column stores with:
//! - One shared session per runtime, connected lazily
//! - A bounded prepared statement cache
//! - Thread-scoped logged batches
//! - Layered consistency resolution
//! - Copy-on-write instrumentation subscribers
//! - Offset lookups over partitions that only support range scans
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Cassie (facade)                          │
//! │      find / insert / update / delete / execute / batch       │
//! └──────┬───────────────────┬───────────────────────┬──────────┘
//!        │                   │                       │
//!        ▼                   ▼                       ▼
//! ┌─────────────┐    ┌───────────────┐       ┌──────────────┐
//! │    Batch    │    │  Consistency  │       │    Cursor    │
//! │ (per thread)│    │   Resolver    │       │ (offset walk)│
//! └─────────────┘    └───────────────┘       └──────────────┘
//!        │
//!        ▼
//! ┌─────────────────────────────┐           ┌──────────────┐
//! │     Connection Manager      │──────────▶│ Subscribers  │
//! │  session + statement cache  │  Message  │ (ArcSwap)    │
//! └──────────────┬──────────────┘           └──────────────┘
//!                │
//!                ▼
//!        ┌───────────────┐
//!        │ Driver/Session│
//!        │  (memory, …)  │
//!        └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "memory")] {
//! use cassie::driver::memory::{MemoryCluster, TableSchema};
//! use cassie::{Cassie, Config, Order, Value};
//!
//! let cluster = MemoryCluster::new();
//! cluster.create_table("app.things", TableSchema::new(["owner"]).clustering("id", Order::Asc));
//!
//! let config = Config::builder().default_keyspace("app").build();
//! let cassie = Cassie::new(config, cluster.driver());
//!
//! cassie.batch(None, || {
//!     for id in 1..=3 {
//!         cassie.insert("things", &[("owner", Value::Int(1)), ("id", Value::Int(id))], None)?;
//!     }
//!     Ok(())
//! })?;
//! assert_eq!(cassie.count("things", &[("owner", Value::Int(1))], None)?, 3);
//! # }
//! # Ok::<(), cassie::CassieError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod statement;
pub mod cql;
pub mod driver;

pub mod cache;
pub mod connection;
pub mod batch;
pub mod consistency;
pub mod subscribers;
pub mod cursor;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CassieError, Result};
pub use config::{ClusterConfig, Config, ConfigBuilder};
pub use client::Cassie;
pub use consistency::{scoped_consistency, with_consistency, Consistency};
pub use cql::{Assignments, Order};
pub use cursor::{OffsetQuery, PageRequest};
pub use statement::{BatchStatement, BoundStatement, Message, PreparedStatement, QueryOptions, Statement};
pub use subscribers::{Subscriber, Subscribers};
pub use value::{ResultSet, Row, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Cassie
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
