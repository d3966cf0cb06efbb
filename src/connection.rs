//! Connection Manager
//!
//! Owns the single live session and the prepared statement cache.
//!
//! ## Responsibilities
//! - Connect, disconnect and reconnect the session
//! - Lazily establish the session on first use
//! - Prepare statements through the cache
//! - Drop the cache whenever the session it belongs to goes away

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::StatementCache;
use crate::config::Config;
use crate::driver::{Driver, Session};
use crate::error::{CassieError, Result};
use crate::statement::PreparedStatement;

/// Session plus the statements prepared on it
struct State {
    session: Option<Arc<dyn Session>>,
    statements: StatementCache,
}

/// Holds the one session of a runtime instance
///
/// ## Locking
///
/// Session and cache share one mutex so they are always replaced together.
/// The lock is held for in-memory mutation only, with two exceptions:
///
/// - **Lazy connect**: `session()` connects while holding the lock so that
///   threads racing on the first call end up with a single session
/// - **Prepare**: compiling holds the lock so two threads never compile and
///   cache the same text twice
///
/// An explicit `connect()` builds the new session outside the lock and swaps
/// it in. A replaced session is closed after the lock is released.
pub struct ConnectionManager {
    config: Arc<Config>,
    driver: Arc<dyn Driver>,
    state: Mutex<State>,
}

impl ConnectionManager {
    pub fn new(config: Arc<Config>, driver: Arc<dyn Driver>) -> Self {
        let statements = StatementCache::new(config.max_prepared_statements);
        Self {
            config,
            driver,
            state: Mutex::new(State {
                session: None,
                statements,
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a new session, replacing (and closing) any existing one.
    pub fn connect(&self) -> Result<()> {
        let session = self.open_session()?;
        let previous = {
            let mut state = self.state.lock();
            state.statements.clear();
            state.session.replace(session)
        };
        if let Some(previous) = previous {
            previous.close();
        }
        Ok(())
    }

    /// Close and forget the session. A no-op when not connected.
    pub fn disconnect(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.statements.clear();
            state.session.take()
        };
        if let Some(previous) = previous {
            previous.close();
            info!("disconnected from cluster");
        }
    }

    /// Close and forget the session, but only if it is still `session`.
    /// Returns whether it was dropped.
    pub fn disconnect_if(&self, session: &Arc<dyn Session>) -> bool {
        let previous = {
            let mut state = self.state.lock();
            match &state.session {
                Some(current) if Arc::ptr_eq(current, session) => {
                    state.statements.clear();
                    state.session.take()
                }
                _ => None,
            }
        };
        match previous {
            Some(previous) => {
                previous.close();
                info!("disconnected from cluster");
                true
            }
            None => false,
        }
    }

    pub fn reconnect(&self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// The live session, connecting first if there is none
    pub fn session(&self) -> Result<Arc<dyn Session>> {
        let mut state = self.state.lock();
        if let Some(session) = state.session.clone() {
            return Ok(session);
        }
        let session = self.open_session()?;
        state.statements.clear();
        state.session = Some(Arc::clone(&session));
        Ok(session)
    }

    fn open_session(&self) -> Result<Arc<dyn Session>> {
        let start = Instant::now();
        let keyspace = self.config.session_keyspace();
        let session = self.driver.connect(&self.config.cluster, keyspace.as_deref())?;
        info!(
            cluster = %self.config.cluster.sanitized(),
            keyspace = ?keyspace,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "connected to cluster"
        );
        Ok(session)
    }

    // =========================================================================
    // Prepared Statements
    // =========================================================================

    /// The cached handle for `cql`, compiling it on first use.
    pub fn prepare(&self, cql: &str) -> Result<Arc<PreparedStatement>> {
        if cql.trim().is_empty() {
            return Err(CassieError::InvalidArgument(
                "statement text must not be blank".to_string(),
            ));
        }

        let mut state = self.state.lock();
        if let Some(statement) = state.statements.get(cql) {
            return Ok(statement);
        }

        let session = match state.session.clone() {
            Some(session) => session,
            None => {
                let session = self.open_session()?;
                state.statements.clear();
                state.session = Some(Arc::clone(&session));
                session
            }
        };

        let statement = match session.prepare(cql) {
            Ok(statement) => Arc::new(statement),
            Err(error) => {
                if error.is_io() {
                    warn!(error = %error, "transport failure while preparing, dropping session");
                    state.statements.clear();
                    state.session = None;
                    drop(state);
                    session.close();
                }
                return Err(error);
            }
        };
        debug!(statement_id = statement.id(), cql, "prepared statement");
        state.statements.insert(cql, Arc::clone(&statement));
        Ok(statement)
    }

    /// Number of statements currently cached
    pub fn cached_statements(&self) -> usize {
        self.state.lock().statements.len()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionManager")
            .field("connected", &state.session.is_some())
            .field("cached_statements", &state.statements.len())
            .finish()
    }
}
