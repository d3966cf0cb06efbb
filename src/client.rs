//! Runtime facade
//!
//! [`Cassie`] is what applications hold. It routes every operation through
//! the same path:
//!
//! 1. Writes issued inside [`Cassie::batch`] are queued and return `None`
//! 2. Text with bind values is prepared through the statement cache
//! 3. Consistency is resolved once for the physical call
//! 4. The statement runs on the (lazily connected) session
//! 5. I/O-class failures drop the session
//! 6. Subscribers get one [`Message`] per statement sent

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::batch::{self, BatchScope, PendingWrite};
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::consistency::{Consistency, ConsistencyResolver};
use crate::cql::{self, Assignments};
use crate::cursor::{self, OffsetQuery};
use crate::driver::{Driver, Session};
use crate::error::{CassieError, Result};
use crate::statement::{BatchStatement, Message, PreparedStatement, QueryOptions, Statement};
use crate::subscribers::Subscribers;
use crate::value::{ResultSet, Value};

/// Source of instance ids; batch buffers are keyed by them
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Client runtime for one cluster
///
/// `Cassie` is `Send + Sync`; share it with `Arc` rather than building one
/// per thread, since each instance owns its own session.
pub struct Cassie {
    id: u64,
    config: Arc<Config>,
    connection: ConnectionManager,
    consistency: ConsistencyResolver,
    subscribers: Arc<Subscribers>,
}

impl Cassie {
    /// Create a runtime. Nothing connects until the first call needs a
    /// session.
    pub fn new(config: Config, driver: Arc<dyn Driver>) -> Self {
        let config = Arc::new(config);
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            connection: ConnectionManager::new(Arc::clone(&config), driver),
            config,
            consistency: ConsistencyResolver::new(None),
            subscribers: Arc::new(Subscribers::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Open a new session, replacing the current one
    pub fn connect(&self) -> Result<()> {
        self.connection.connect()
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn reconnect(&self) -> Result<()> {
        self.connection.reconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Cached prepared statement for `cql`, compiled on first use.
    pub fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>> {
        self.connection.prepare(cql)
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Process-wide default consistency
    pub fn default_consistency(&self) -> Option<Consistency> {
        self.consistency.default_level()
    }

    pub fn set_default_consistency(&self, level: impl Into<Option<Consistency>>) {
        self.consistency.set_default_level(level.into());
    }

    /// Consistency a call without an explicit level would use on this
    /// thread; `None` leaves it to the driver
    pub fn current_consistency(&self) -> Option<Consistency> {
        self.consistency.current()
    }

    // =========================================================================
    // Instrumentation
    // =========================================================================

    /// Subscribers notified of every statement sent
    pub fn subscribers(&self) -> &Arc<Subscribers> {
        &self.subscribers
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Run `work`, collecting the writes it issues on this thread into one
    /// logged batch sent when it returns `Ok`.
    ///
    /// Inside another batch on the same thread `work` just runs; its writes
    /// join the outer batch. Nothing is sent if `work` fails or issues no
    /// writes. `options` apply to the batch as a whole.
    pub fn batch<T, F>(&self, options: Option<QueryOptions>, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let Some(scope) = BatchScope::open(self.id) else {
            return work();
        };
        let output = work()?;
        let writes = scope.finish();
        self.flush_batch(writes, options.unwrap_or_default())?;
        Ok(output)
    }

    fn flush_batch(&self, writes: Vec<PendingWrite>, options: QueryOptions) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut statement = BatchStatement::new();
        for write in writes {
            if write.values.is_empty() {
                statement.add(write.cql);
            } else {
                let prepared = self.prepare(&write.cql)?;
                statement.add(prepared.bind(write.values));
            }
        }
        debug!(statements = statement.len(), "sending logged batch");
        self.execute(statement, Vec::new(), Some(options))?;
        Ok(())
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Run a query. Reads are never batched.
    pub fn find(
        &self,
        cql: &str,
        values: Vec<Value>,
        options: Option<QueryOptions>,
    ) -> Result<ResultSet> {
        self.execute(cql, values, options)
    }

    /// Insert a row. `Null` columns are left out; `options.ttl` adds
    /// `USING TTL`. Returns `None` when queued in a batch.
    pub fn insert<K: AsRef<str>>(
        &self,
        table: &str,
        columns: &[(K, Value)],
        options: Option<QueryOptions>,
    ) -> Result<Option<ResultSet>> {
        let ttl = options.as_ref().and_then(|options| options.ttl);
        let (cql, values) = cql::insert_statement(table, columns, ttl);
        self.batch_or_execute(cql, values, options)
    }

    /// Update the row identified by `key`. Returns `None` when queued in a
    /// batch.
    pub fn update<'a, K: AsRef<str> + 'a>(
        &self,
        table: &str,
        assignments: impl Into<Assignments<'a, K>>,
        key: &[(K, Value)],
        options: Option<QueryOptions>,
    ) -> Result<Option<ResultSet>> {
        let ttl = options.as_ref().and_then(|options| options.ttl);
        let (cql, values) = cql::update_statement(table, assignments.into(), key, ttl);
        self.batch_or_execute(cql, values, options)
    }

    /// Delete the rows identified by `key`. Returns `None` when queued in a
    /// batch.
    pub fn delete<K: AsRef<str>>(
        &self,
        table: &str,
        key: &[(K, Value)],
        options: Option<QueryOptions>,
    ) -> Result<Option<ResultSet>> {
        let (cql, values) = cql::delete_statement(table, key);
        self.batch_or_execute(cql, values, options)
    }

    /// Number of rows matching `key` (every row when `key` is empty)
    pub fn count<K: AsRef<str>>(
        &self,
        table: &str,
        key: &[(K, Value)],
        options: Option<QueryOptions>,
    ) -> Result<i64> {
        let (cql, values) = cql::count_statement(table, key);
        let rows = self.find(&cql, values, options)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Ordering value of the row at `offset` (0-based) in the partition
    /// `query` describes, or `None` past the end.
    pub fn offset_to_key(&self, query: &OffsetQuery, offset: usize) -> Result<Option<Value>> {
        let (start, end) = query.bounds();
        let options = query.options();
        cursor::seek(offset, query.page_size(), start, end, |request| {
            let (cql, values) = query.page_statement(request);
            let rows = self.find(&cql, values, Some(options.clone()))?;
            Ok(rows.column(query.ordering_column()))
        })
    }

    fn batch_or_execute(
        &self,
        cql: String,
        values: Vec<Value>,
        options: Option<QueryOptions>,
    ) -> Result<Option<ResultSet>> {
        match batch::enqueue(self.id, PendingWrite::new(cql, values)) {
            Ok(()) => Ok(None),
            Err(write) => self.execute(write.cql, write.values, options).map(Some),
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a statement.
    ///
    /// Text with `values` runs as a cached prepared statement; text without
    /// runs as a simple statement. `values` become `options.arguments`.
    pub fn execute(
        &self,
        statement: impl Into<Statement>,
        values: Vec<Value>,
        options: Option<QueryOptions>,
    ) -> Result<ResultSet> {
        self.send(statement.into(), values, options.unwrap_or_default())
    }

    fn send(
        &self,
        statement: Statement,
        values: Vec<Value>,
        mut options: QueryOptions,
    ) -> Result<ResultSet> {
        let statement = match statement {
            Statement::Simple(cql) if !values.is_empty() => {
                Statement::Prepared(self.connection.prepare(&cql)?)
            }
            other => other,
        };
        if !values.is_empty() {
            options.arguments = Some(values);
        }
        options.consistency = self.consistency.resolve(options.consistency);

        let session = self.connection.session()?;
        let start = Instant::now();
        let result = session.execute(&statement, &options);
        let elapsed = start.elapsed();
        trace!(
            cql = %statement.cql(),
            consistency = ?options.consistency,
            elapsed_us = elapsed.as_micros() as u64,
            ok = result.is_ok(),
            "executed statement"
        );

        if !self.subscribers.is_empty() {
            self.subscribers
                .notify(&Message::new(statement, options, elapsed));
        }
        if let Err(error) = &result {
            self.handle_error(error, &session);
        }
        result
    }

    /// Drop `session` after a transport failure on it. A session another
    /// thread already replaced is left alone.
    fn handle_error(&self, error: &CassieError, session: &Arc<dyn Session>) {
        if error.is_io() {
            warn!(error = %error, "transport failure, dropping session");
            self.connection.disconnect_if(session);
        }
    }
}

impl fmt::Debug for Cassie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cassie")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("default_consistency", &self.default_consistency())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
