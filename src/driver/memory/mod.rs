//! In-memory cluster
//!
//! A complete [`Driver`] that keeps its tables in process. It understands the
//! CQL subset the runtime emits (see [`parser`]), keeps rows in clustering
//! order, applies logged batches atomically, and records every statement it
//! executes so tests can count round trips and check resolved consistency.
//!
//! ## Fault injection
//! - [`MemoryCluster::inject_failure`] makes the next execute fail once
//! - [`MemoryCluster::set_unreachable`] fails connects and every call on
//!   live sessions with a connection error until cleared

mod parser;
mod store;

pub use store::TableSchema;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use self::parser::{parse, Parsed};
use self::store::Store;
use super::{Driver, Session};
use crate::config::ClusterConfig;
use crate::consistency::Consistency;
use crate::error::{CassieError, Result};
use crate::statement::{PreparedStatement, QueryOptions, Statement};
use crate::value::{ResultSet, Value};

/// A one-shot failure for the next execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Transport failure; the runtime drops its session
    Io,
    /// Server-side rejection; the session stays usable
    Query(String),
}

impl Failure {
    fn into_error(self) -> CassieError {
        match self {
            Failure::Io => CassieError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            Failure::Query(message) => CassieError::Query(message),
        }
    }
}

/// One statement as the cluster received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub session_id: u64,
    pub cql: String,
    /// Level the statement ran at: the one sent, else the session default
    /// from [`ClusterConfig::consistency`]
    pub consistency: Option<Consistency>,
    pub batch: bool,
}

#[derive(Debug, Default)]
struct ClusterInner {
    store: Store,
    next_session_id: AtomicU64,
    next_statement_id: AtomicU64,

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------
    connects: AtomicUsize,
    prepares: AtomicUsize,
    executes: AtomicUsize,
    open_sessions: AtomicUsize,

    // -------------------------------------------------------------------------
    // Fault Injection
    // -------------------------------------------------------------------------
    unreachable: AtomicBool,
    failures: Mutex<VecDeque<Failure>>,

    executed: Mutex<Vec<ExecutedStatement>>,
}

/// Handle to an in-memory cluster. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// This cluster as a shareable driver
    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }

    /// Create (or replace) a table. Use a keyspace-qualified name such as
    /// `"app.things"` so that sessions in that keyspace can use `"things"`.
    pub fn create_table(&self, name: &str, schema: TableSchema) {
        self.inner.store.create_table(name, schema);
    }

    pub fn inject_failure(&self, failure: Failure) {
        self.inner.failures.lock().push_back(failure);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Statements executed so far, oldest first, including failed ones
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.inner.executed.lock().clone()
    }

    pub fn clear_executed(&self) {
        self.inner.executed.lock().clear();
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn prepare_count(&self) -> usize {
        self.inner.prepares.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.inner.executes.load(Ordering::SeqCst)
    }

    /// Sessions connected and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }
}

impl Driver for MemoryCluster {
    fn connect(&self, cluster: &ClusterConfig, keyspace: Option<&str>) -> Result<Arc<dyn Session>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(CassieError::Connection(format!(
                "no hosts available: {:?}",
                cluster.hosts
            )));
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(session_id = id, keyspace = ?keyspace, "memory session opened");

        Ok(Arc::new(MemorySession {
            id,
            keyspace: keyspace.map(str::to_string),
            default_consistency: cluster.consistency,
            cluster: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
            prepared: Mutex::new(HashMap::new()),
        }))
    }
}

/// A session on a [`MemoryCluster`]
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    keyspace: Option<String>,
    /// Applied when a statement arrives without a consistency
    default_consistency: Option<Consistency>,
    cluster: Arc<ClusterInner>,
    closed: AtomicBool,
    /// Statements prepared on this session, by handle id
    prepared: Mutex<HashMap<u64, Parsed>>,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CassieError::Connection("session is closed".to_string()));
        }
        if self.cluster.unreachable.load(Ordering::SeqCst) {
            return Err(CassieError::Connection("host unreachable".to_string()));
        }
        Ok(())
    }

    fn lookup(&self, statement: &PreparedStatement) -> Result<Parsed> {
        self.prepared
            .lock()
            .get(&statement.id())
            .cloned()
            .ok_or_else(|| {
                CassieError::Query(format!(
                    "statement {} was not prepared on this session",
                    statement.id()
                ))
            })
    }

    fn run(&self, parsed: Parsed, values: Vec<Value>) -> Result<ResultSet> {
        let keyspace = self.keyspace.as_deref();
        if parsed.is_write() {
            self.cluster.store.apply(&[(parsed, values)], keyspace)?;
            Ok(ResultSet::empty())
        } else {
            self.cluster.store.select(&parsed, &values, keyspace)
        }
    }

    fn run_batch(&self, entries: &[Statement]) -> Result<ResultSet> {
        let writes = entries
            .iter()
            .map(|entry| {
                let write = match entry {
                    Statement::Simple(cql) => (parse(cql)?, Vec::new()),
                    Statement::Prepared(prepared) => (self.lookup(prepared)?, Vec::new()),
                    Statement::Bound(bound) => {
                        (self.lookup(bound.prepared())?, bound.values().to_vec())
                    }
                    Statement::Batch(_) => {
                        return Err(CassieError::Query("batches cannot be nested".to_string()))
                    }
                };
                if !write.0.is_write() {
                    return Err(CassieError::Query(
                        "only INSERT, UPDATE and DELETE are allowed in a batch".to_string(),
                    ));
                }
                Ok(write)
            })
            .collect::<Result<Vec<_>>>()?;

        self.cluster.store.apply(&writes, self.keyspace.as_deref())?;
        Ok(ResultSet::empty())
    }
}

impl Session for MemorySession {
    fn prepare(&self, cql: &str) -> Result<PreparedStatement> {
        self.check_open()?;
        self.cluster.prepares.fetch_add(1, Ordering::SeqCst);

        let parsed = parse(cql)?;
        let table = match &parsed.statement {
            parser::CqlStatement::Select { table, .. }
            | parser::CqlStatement::Insert { table, .. }
            | parser::CqlStatement::Update { table, .. }
            | parser::CqlStatement::Delete { table, .. }
            | parser::CqlStatement::Truncate { table } => table,
        };
        if !self.cluster.store.has_table(table, self.keyspace.as_deref()) {
            return Err(CassieError::Query(format!("unconfigured table {}", table)));
        }

        let id = self.cluster.next_statement_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.prepared.lock().insert(id, parsed);
        trace!(session_id = self.id, statement_id = id, cql, "prepared");
        Ok(PreparedStatement::new(id, cql))
    }

    fn execute(&self, statement: &Statement, options: &QueryOptions) -> Result<ResultSet> {
        self.check_open()?;
        self.cluster.executes.fetch_add(1, Ordering::SeqCst);
        self.cluster.executed.lock().push(ExecutedStatement {
            session_id: self.id,
            cql: statement.cql(),
            consistency: options.consistency.or(self.default_consistency),
            batch: statement.is_batch(),
        });

        if let Some(failure) = self.cluster.failures.lock().pop_front() {
            return Err(failure.into_error());
        }

        match statement {
            Statement::Simple(cql) => self.run(parse(cql)?, options.arguments().to_vec()),
            Statement::Prepared(prepared) => {
                self.run(self.lookup(prepared)?, options.arguments().to_vec())
            }
            Statement::Bound(bound) => {
                self.run(self.lookup(bound.prepared())?, bound.values().to_vec())
            }
            Statement::Batch(batch) => self.run_batch(batch.statements()),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster.open_sessions.fetch_sub(1, Ordering::SeqCst);
            debug!(session_id = self.id, "memory session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::Order;
    use crate::statement::BatchStatement;

    fn cluster() -> MemoryCluster {
        let cluster = MemoryCluster::new();
        cluster.create_table("app.things", TableSchema::new(["owner"]).clustering("id", Order::Asc));
        cluster
    }

    fn connect(cluster: &MemoryCluster) -> Arc<dyn Session> {
        cluster
            .connect(&ClusterConfig::default(), Some("app"))
            .unwrap()
    }

    #[test]
    fn test_prepared_handles_are_session_scoped() {
        let cluster = cluster();
        let first = connect(&cluster);
        let second = connect(&cluster);

        let prepared = Arc::new(first.prepare("SELECT * FROM things WHERE owner = ?").unwrap());
        let options = QueryOptions::new().with_arguments(vec![Value::Int(1)]);
        assert!(first.execute(&Statement::from(&prepared), &options).is_ok());
        assert!(matches!(
            second.execute(&Statement::from(&prepared), &options),
            Err(CassieError::Query(_))
        ));
    }

    #[test]
    fn test_prepare_rejects_unknown_table() {
        let cluster = cluster();
        let session = connect(&cluster);
        assert!(session.prepare("SELECT * FROM nope").is_err());
        assert!(session.prepare("SELECT * FROM app.things").is_ok());
    }

    #[test]
    fn test_batch_is_atomic() {
        let cluster = cluster();
        let session = connect(&cluster);
        let insert = Arc::new(
            session
                .prepare("INSERT INTO things (owner, id) VALUES (?, ?)")
                .unwrap(),
        );

        let mut batch = BatchStatement::new();
        batch
            .add(insert.bind(vec![Value::Int(1), Value::Int(1)]))
            .add("INSERT INTO things (owner) VALUES (1)");
        let result = session.execute(&Statement::from(batch), &QueryOptions::new());
        assert!(result.is_err());

        let rows = session
            .execute(&"SELECT * FROM things".into(), &QueryOptions::new())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_records_and_injects() {
        let cluster = cluster();
        let session = connect(&cluster);
        cluster.inject_failure(Failure::Io);

        let options = QueryOptions::new().with_consistency(Consistency::Quorum);
        let err = session
            .execute(&"SELECT * FROM things".into(), &options)
            .unwrap_err();
        assert!(err.is_io());
        assert!(session.execute(&"SELECT * FROM things".into(), &options).is_ok());

        let executed = cluster.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].consistency, Some(Consistency::Quorum));
        assert_eq!(executed[0].session_id, 1);
    }

    #[test]
    fn test_close_and_unreachable() {
        let cluster = cluster();
        let session = connect(&cluster);
        assert_eq!(cluster.open_sessions(), 1);
        session.close();
        session.close();
        assert_eq!(cluster.open_sessions(), 0);
        assert!(session
            .execute(&"SELECT * FROM things".into(), &QueryOptions::new())
            .unwrap_err()
            .is_io());

        cluster.set_unreachable(true);
        assert!(cluster
            .connect(&ClusterConfig::default(), None)
            .err()
            .map_or(false, |e| e.is_io()));
        assert_eq!(cluster.connect_count(), 2);
    }
}
