//! Statements, options and instrumentation messages
//!
//! ## Statement kinds
//! - `Simple`: raw CQL text sent as-is
//! - `Prepared`: a compiled handle; bind values travel in the options
//! - `Bound`: a compiled handle with its values attached (batch entries)
//! - `Batch`: a logged batch of simple and bound statements, applied atomically

use std::sync::Arc;
use std::time::Duration;

use crate::consistency::Consistency;
use crate::value::Value;

/// A statement compiled by the driver.
///
/// Handles are shared as `Arc<PreparedStatement>`; two handles are the same
/// handle when `Arc::ptr_eq` says so.
#[derive(Debug, PartialEq, Eq)]
pub struct PreparedStatement {
    id: u64,
    cql: String,
}

impl PreparedStatement {
    pub fn new(id: u64, cql: impl Into<String>) -> Self {
        Self {
            id,
            cql: cql.into(),
        }
    }

    /// Driver-assigned id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Attach bind values, producing a statement that can go into a batch.
    pub fn bind(self: &Arc<Self>, values: Vec<Value>) -> BoundStatement {
        BoundStatement {
            prepared: Arc::clone(self),
            values,
        }
    }
}

/// A prepared statement with its bind values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    prepared: Arc<PreparedStatement>,
    values: Vec<Value>,
}

impl BoundStatement {
    pub fn prepared(&self) -> &Arc<PreparedStatement> {
        &self.prepared
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn cql(&self) -> &str {
        self.prepared.cql()
    }
}

/// A logged batch: all entries are applied together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStatement {
    statements: Vec<Statement>,
}

impl BatchStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, statement: impl Into<Statement>) -> &mut Self {
        self.statements.push(statement.into());
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Anything the runtime can send to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Simple(String),
    Prepared(Arc<PreparedStatement>),
    Bound(BoundStatement),
    Batch(BatchStatement),
}

impl Statement {
    /// CQL text of the statement; batch entries are joined with `"; "`.
    pub fn cql(&self) -> String {
        match self {
            Statement::Simple(cql) => cql.clone(),
            Statement::Prepared(prepared) => prepared.cql().to_string(),
            Statement::Bound(bound) => bound.cql().to_string(),
            Statement::Batch(batch) => batch
                .statements()
                .iter()
                .map(Statement::cql)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Statement::Batch(_))
    }
}

impl From<&str> for Statement {
    fn from(cql: &str) -> Self {
        Statement::Simple(cql.to_string())
    }
}

impl From<String> for Statement {
    fn from(cql: String) -> Self {
        Statement::Simple(cql)
    }
}

impl From<Arc<PreparedStatement>> for Statement {
    fn from(prepared: Arc<PreparedStatement>) -> Self {
        Statement::Prepared(prepared)
    }
}

impl From<&Arc<PreparedStatement>> for Statement {
    fn from(prepared: &Arc<PreparedStatement>) -> Self {
        Statement::Prepared(Arc::clone(prepared))
    }
}

impl From<BoundStatement> for Statement {
    fn from(bound: BoundStatement) -> Self {
        Statement::Bound(bound)
    }
}

impl From<BatchStatement> for Statement {
    fn from(batch: BatchStatement) -> Self {
        Statement::Batch(batch)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Per-call options.
///
/// `ttl` is only read by insert and update. `arguments` is filled in by the
/// runtime from the positional values of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub consistency: Option<Consistency>,
    pub ttl: Option<i32>,
    pub arguments: Option<Vec<Value>>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consistency(mut self, level: Consistency) -> Self {
        self.consistency = Some(level);
        self
    }

    pub fn with_ttl(mut self, seconds: i32) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn with_arguments(mut self, values: Vec<Value>) -> Self {
        self.arguments = Some(values);
        self
    }

    /// Bind values carried by the options, empty when none.
    pub fn arguments(&self) -> &[Value] {
        self.arguments.as_deref().unwrap_or(&[])
    }
}

// =============================================================================
// Instrumentation
// =============================================================================

/// Sent to subscribers once per statement sent to the cluster.
///
/// Writes collected in a batch produce a single message carrying the batch
/// statement and the batch's resolved options.
#[derive(Debug, Clone)]
pub struct Message {
    statement: Statement,
    options: QueryOptions,
    elapsed_time: Duration,
}

impl Message {
    pub fn new(statement: Statement, options: QueryOptions, elapsed_time: Duration) -> Self {
        Self {
            statement,
            options,
            elapsed_time,
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn elapsed_time(&self) -> Duration {
        self.elapsed_time
    }
}
