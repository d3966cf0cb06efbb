//! Cursor Pagination Engine
//!
//! The store can range-scan a partition in clustering order but cannot skip
//! rows, so "the row at offset N" is found by walking bounded pages:
//!
//! ```text
//! remaining = offset, from = start
//! loop:
//!     limit = min(batch_size, remaining + 1)
//!     page  = rows in (from, to) in scan order, at most limit
//!     page shorter than limit     -> absent
//!     limit == remaining + 1      -> last value of page
//!     otherwise remaining -= limit, from = last value of page
//! ```
//!
//! Each page starts strictly after the last value already counted, so no row
//! is counted twice and the walk takes at most `offset / batch_size + 1`
//! round trips.

use crate::consistency::Consistency;
use crate::cql::Order;
use crate::error::{CassieError, Result};
use crate::statement::QueryOptions;
use crate::value::Value;

/// Rows fetched per round trip unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// One bounded page to fetch, expressed in scan order
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Exclusive bound the page starts after
    pub after: Option<Value>,
    /// Exclusive bound the page stops before
    pub before: Option<Value>,
    /// Maximum rows to return
    pub limit: usize,
}

/// Find the value at position `offset` (0-based) of an ordered sequence
/// that can only be read in bounded pages.
///
/// `fetch` returns the ordering values of one page, in scan order. `start`
/// and `end` are exclusive bounds in scan order.
pub fn seek<F>(
    offset: usize,
    batch_size: usize,
    start: Option<Value>,
    end: Option<Value>,
    mut fetch: F,
) -> Result<Option<Value>>
where
    F: FnMut(&PageRequest) -> Result<Vec<Value>>,
{
    if batch_size == 0 {
        return Err(CassieError::InvalidArgument(
            "batch_size must be greater than zero".to_string(),
        ));
    }

    let mut remaining = offset;
    let mut after = start;
    loop {
        let limit = batch_size.min(remaining.saturating_add(1));
        let request = PageRequest {
            after: after.take(),
            before: end.clone(),
            limit,
        };
        let page = fetch(&request)?;

        // A short page means the sequence ends before the offset.
        let Some(last) = page.into_iter().nth(limit - 1) else {
            return Ok(None);
        };
        if limit > remaining {
            return Ok(Some(last));
        }
        remaining -= limit;
        after = Some(last);
    }
}

// =============================================================================
// Offset Query
// =============================================================================

/// Which partition to walk, by which column, in which direction.
///
/// ```
/// use cassie::{OffsetQuery, Order};
///
/// let query = OffsetQuery::new("things", "id")
///     .key("owner", 1)
///     .clustering_order(Order::Desc)
///     .batch_size(100);
/// assert_eq!(query.effective_order(), Order::Desc);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetQuery {
    table: String,
    key: Vec<(String, Value)>,
    ordering_column: String,
    clustering_order: Order,
    order: Option<Order>,
    batch_size: usize,
    min: Option<Value>,
    max: Option<Value>,
    consistency: Option<Consistency>,
}

impl OffsetQuery {
    /// Walk `table` by its last clustering column `ordering_column`
    pub fn new(table: impl Into<String>, ordering_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: Vec::new(),
            ordering_column: ordering_column.into(),
            clustering_order: Order::Asc,
            order: None,
            batch_size: DEFAULT_BATCH_SIZE,
            min: None,
            max: None,
            consistency: None,
        }
    }

    /// Restrict to rows where `column = value`; usually the partition key
    pub fn key(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.key.push((column.into(), value.into()));
        self
    }

    /// Order the table stores the ordering column in
    pub fn clustering_order(mut self, order: Order) -> Self {
        self.clustering_order = order;
        self
    }

    /// Order to count in; defaults to the clustering order
    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Only count rows whose ordering value is greater than `min`
    pub fn min(mut self, min: impl Into<Value>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Only count rows whose ordering value is less than `max`
    pub fn max(mut self, max: impl Into<Value>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn consistency(mut self, level: Consistency) -> Self {
        self.consistency = Some(level);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ordering_column(&self) -> &str {
        &self.ordering_column
    }

    pub fn effective_order(&self) -> Order {
        self.order.unwrap_or(self.clustering_order)
    }

    pub fn page_size(&self) -> usize {
        self.batch_size
    }

    /// `(start, end)` exclusive bounds in scan order
    pub fn bounds(&self) -> (Option<Value>, Option<Value>) {
        match self.effective_order() {
            Order::Asc => (self.min.clone(), self.max.clone()),
            Order::Desc => (self.max.clone(), self.min.clone()),
        }
    }

    /// Options for every page query
    pub fn options(&self) -> QueryOptions {
        QueryOptions {
            consistency: self.consistency,
            ..QueryOptions::default()
        }
    }

    /// SELECT text and bind values for one page
    pub fn page_statement(&self, request: &PageRequest) -> (String, Vec<Value>) {
        let order = self.effective_order();
        let (after_op, before_op) = match order {
            Order::Asc => (">", "<"),
            Order::Desc => ("<", ">"),
        };

        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for (column, value) in &self.key {
            conditions.push(format!("{} = ?", column));
            values.push(value.clone());
        }
        if let Some(after) = &request.after {
            conditions.push(format!("{} {} ?", self.ordering_column, after_op));
            values.push(after.clone());
        }
        if let Some(before) = &request.before {
            conditions.push(format!("{} {} ?", self.ordering_column, before_op));
            values.push(before.clone());
        }

        let mut cql = format!("SELECT {} FROM {}", self.ordering_column, self.table);
        if !conditions.is_empty() {
            cql.push_str(" WHERE ");
            cql.push_str(&conditions.join(" AND "));
        }
        if order != self.clustering_order {
            cql.push_str(&format!(" ORDER BY {} {}", self.ordering_column, order));
        }
        cql.push_str(" LIMIT ?");
        values.push(Value::Int(i32::try_from(request.limit).unwrap_or(i32::MAX)));
        (cql, values)
    }
}
