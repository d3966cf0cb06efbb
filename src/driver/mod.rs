//! Driver Module
//!
//! The seam between the runtime and whatever speaks the wire protocol.
//!
//! ## Responsibilities of a driver
//! - Connect to a cluster and open a session in a keyspace
//! - Compile (prepare) statements
//! - Execute simple, prepared, bound and logged batch statements
//! - Report transport failures as I/O-class errors (`CassieError::is_io`)
//!
//! Timeouts and retries are the driver's business; the runtime never retries.
//!
//! With the `memory` feature (on by default), `memory::MemoryCluster` is a
//! complete in-process implementation used by the tests, the benchmarks and
//! the probe binary. Builds that bring their own driver can turn it off.

#[cfg(feature = "memory")]
pub mod memory;

use std::sync::Arc;

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::statement::{PreparedStatement, QueryOptions, Statement};
use crate::value::ResultSet;

/// Opens sessions against a cluster
pub trait Driver: Send + Sync {
    /// Connect and return a live session, optionally bound to a keyspace.
    fn connect(&self, cluster: &ClusterConfig, keyspace: Option<&str>) -> Result<Arc<dyn Session>>;
}

/// One live connection to the cluster
pub trait Session: Send + Sync {
    /// Compile a statement. The returned handle is only valid on this session.
    fn prepare(&self, cql: &str) -> Result<PreparedStatement>;

    /// Execute a statement. Bind values for simple and prepared statements
    /// come from `options.arguments`; bound and batch statements carry their
    /// own.
    fn execute(&self, statement: &Statement, options: &QueryOptions) -> Result<ResultSet>;

    /// Release the session. Further calls fail with an I/O-class error.
    fn close(&self);
}
