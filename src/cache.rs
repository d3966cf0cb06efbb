//! Prepared Statement Cache
//!
//! Maps query text to the statement the session compiled for it.
//!
//! ## Eviction
//! The cache is bounded. When an insert pushes it over capacity the single
//! oldest-inserted entry is dropped. Lookups do not reorder entries, so this
//! is insertion order and not LRU: hot queries that were evicted come back on
//! their next prepare and settle at the young end.
//!
//! The cache has no lock of its own. It lives next to the session inside the
//! connection manager's mutex so the two are always replaced together.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::statement::PreparedStatement;

/// Minimum time between two "cache filled up" warnings
const WARNING_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded insertion-ordered statement cache
#[derive(Debug)]
pub struct StatementCache {
    capacity: usize,
    entries: HashMap<String, Arc<PreparedStatement>>,
    /// Keys, oldest first
    order: VecDeque<String>,
    last_warning: Option<Instant>,
}

impl StatementCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            last_warning: None,
        }
    }

    pub fn get(&self, cql: &str) -> Option<Arc<PreparedStatement>> {
        self.entries.get(cql).cloned()
    }

    pub fn contains(&self, cql: &str) -> bool {
        self.entries.contains_key(cql)
    }

    /// Store a statement, returning the entry evicted to make room.
    ///
    /// Re-inserting an existing key replaces the handle in place without
    /// changing its position.
    pub fn insert(
        &mut self,
        cql: impl Into<String>,
        statement: Arc<PreparedStatement>,
    ) -> Option<Arc<PreparedStatement>> {
        let cql = cql.into();
        if let Some(slot) = self.entries.get_mut(&cql) {
            *slot = statement;
            return None;
        }

        self.order.push_back(cql.clone());
        self.entries.insert(cql, statement);

        if self.entries.len() <= self.capacity {
            return None;
        }

        let oldest = self.order.pop_front()?;
        let evicted = self.entries.remove(&oldest);
        self.warn_filled_up();
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached query texts, oldest first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn warn_filled_up(&mut self) {
        let now = Instant::now();
        let due = self
            .last_warning
            .map_or(true, |last| now.duration_since(last) >= WARNING_INTERVAL);
        if due {
            // Throttled: a thrashing cache is already slow enough.
            self.last_warning = Some(now);
            tracing::warn!(
                capacity = self.capacity,
                "prepared statement cache filled up; consider increasing max_prepared_statements"
            );
        }
    }
}
