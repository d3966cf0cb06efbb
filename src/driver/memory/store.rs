//! In-memory table storage
//!
//! Tables keep their rows sorted by primary key: partition key columns
//! ascending, then each clustering column in its declared order. A SELECT
//! returns rows in that order unless its ORDER BY asks for the reverse.
//!
//! Writes are planned against the current state before any of them is
//! applied, all under one write lock, so a batch either lands whole or not
//! at all.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::parser::{Assignment, Condition, CqlStatement, Op, Parsed, Projection, SetExpr, Term};
use crate::cql::Order;
use crate::error::{CassieError, Result};
use crate::value::{ResultSet, Row, Value};

/// Primary key layout of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    partition_key: Vec<String>,
    clustering: Vec<(String, Order)>,
}

impl TableSchema {
    pub fn new<I, S>(partition_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            partition_key: partition_key
                .into_iter()
                .map(|column| column.into().to_ascii_lowercase())
                .collect(),
            clustering: Vec::new(),
        }
    }

    /// Append a clustering column
    pub fn clustering(mut self, column: impl Into<String>, order: Order) -> Self {
        self.clustering
            .push((column.into().to_ascii_lowercase(), order));
        self
    }

    pub fn partition_key(&self) -> &[String] {
        &self.partition_key
    }

    pub fn clustering_columns(&self) -> &[(String, Order)] {
        &self.clustering
    }

    fn key_columns(&self) -> impl Iterator<Item = &str> {
        self.partition_key
            .iter()
            .map(String::as_str)
            .chain(self.clustering.iter().map(|(column, _)| column.as_str()))
    }

    fn is_key_column(&self, column: &str) -> bool {
        self.key_columns().any(|key| key == column)
    }

    fn clustering_order(&self, column: &str) -> Option<Order> {
        self.clustering
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, order)| *order)
    }

    fn compare_rows(&self, a: &StoredRow, b: &StoredRow) -> Ordering {
        for column in &self.partition_key {
            match cell_order(a.get(column), b.get(column)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        for (column, order) in &self.clustering {
            let ordering = cell_order(a.get(column), b.get(column));
            let ordering = match order {
                Order::Asc => ordering,
                Order::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

type StoredRow = BTreeMap<String, Value>;

fn cell_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug)]
struct Table {
    schema: TableSchema,
    rows: Vec<StoredRow>,
}

impl Table {
    /// Columns of a row for output: key columns first, then the rest by name
    fn output(&self, row: &StoredRow) -> Row {
        let mut columns: Vec<(String, Value)> = self
            .schema
            .key_columns()
            .filter_map(|column| row.get(column).map(|v| (column.to_string(), v.clone())))
            .collect();
        columns.extend(
            row.iter()
                .filter(|(column, _)| !self.schema.is_key_column(column))
                .map(|(column, value)| (column.clone(), value.clone())),
        );
        Row::new(columns)
    }

    fn position(&self, key: &StoredRow) -> std::result::Result<usize, usize> {
        let index = self
            .rows
            .partition_point(|row| self.schema.compare_rows(row, key) == Ordering::Less);
        match self.rows.get(index) {
            Some(row) if self.schema.compare_rows(row, key) == Ordering::Equal => Ok(index),
            _ => Err(index),
        }
    }
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum CellOp {
    Set(Value),
    Add(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    column: String,
    op: Op,
    values: Vec<Value>,
}

impl Filter {
    fn matches(&self, row: &StoredRow) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Value::Null);
        let ordering = |value: &Value| cell.compare(value);
        match self.op {
            Op::Eq | Op::In => self
                .values
                .iter()
                .any(|value| ordering(value) == Some(Ordering::Equal)),
            Op::Lt => matches!(self.values.first().and_then(ordering), Some(Ordering::Less)),
            Op::Gt => matches!(
                self.values.first().and_then(ordering),
                Some(Ordering::Greater)
            ),
            Op::Le => matches!(
                self.values.first().and_then(ordering),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Op::Ge => matches!(
                self.values.first().and_then(ordering),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug)]
enum Mutation {
    Upsert {
        table: String,
        key: StoredRow,
        cells: Vec<(String, CellOp)>,
    },
    Delete {
        table: String,
        filters: Vec<Filter>,
    },
    Truncate {
        table: String,
    },
}

fn query_error(message: impl Into<String>) -> CassieError {
    CassieError::Query(message.into())
}

/// Substitutes bind values for markers
struct Binder<'a> {
    values: &'a [Value],
}

impl Binder<'_> {
    fn resolve(&self, term: &Term) -> Result<Value> {
        match term {
            Term::Literal(value) => Ok(value.clone()),
            Term::Marker(index) => self
                .values
                .get(*index)
                .cloned()
                .ok_or_else(|| query_error(format!("missing bind value {}", index))),
        }
    }

    fn filters(&self, conditions: &[Condition]) -> Result<Vec<Filter>> {
        conditions
            .iter()
            .map(|condition| {
                Ok(Filter {
                    column: condition.column.clone(),
                    op: condition.op,
                    values: condition
                        .terms
                        .iter()
                        .map(|term| self.resolve(term))
                        .collect::<Result<_>>()?,
                })
            })
            .collect()
    }

    fn ttl(&self, ttl: &Option<Term>) -> Result<()> {
        // Accepted and validated; rows never expire in memory.
        if let Some(term) = ttl {
            match self.resolve(term)?.as_i64() {
                Some(seconds) if seconds >= 0 => {}
                _ => return Err(query_error("TTL must be a non-negative integer")),
            }
        }
        Ok(())
    }
}

fn add_values(current: Option<&Value>, delta: &Value) -> Option<Value> {
    match (current, delta) {
        (None | Some(Value::Null), delta) if delta.as_i64().is_some() || delta.as_f64().is_some() => {
            Some(delta.clone())
        }
        (Some(Value::Int(a)), Value::Int(b)) => Some(Value::Int(a.wrapping_add(*b))),
        (Some(Value::Double(a)), Value::Double(b)) => Some(Value::Double(a + b)),
        (Some(a), b) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(Value::BigInt(a.wrapping_add(b))),
            _ => None,
        },
        _ => None,
    }
}

fn negate(value: Value) -> Result<Value> {
    match value {
        Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
        Value::BigInt(v) => Ok(Value::BigInt(v.wrapping_neg())),
        Value::Double(v) => Ok(Value::Double(-v)),
        other => Err(query_error(format!(
            "cannot subtract a {} value",
            other.type_name()
        ))),
    }
}

// =============================================================================
// Store
// =============================================================================

/// All tables of one in-memory cluster
#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: RwLock<HashMap<String, Table>>,
}

impl Store {
    pub fn create_table(&self, name: &str, schema: TableSchema) {
        self.tables.write().insert(
            name.to_ascii_lowercase(),
            Table {
                schema,
                rows: Vec::new(),
            },
        );
    }

    pub fn has_table(&self, name: &str, keyspace: Option<&str>) -> bool {
        let tables = self.tables.read();
        resolve_name(&tables, name, keyspace).is_ok()
    }

    /// Run a SELECT
    pub fn select(&self, parsed: &Parsed, values: &[Value], keyspace: Option<&str>) -> Result<ResultSet> {
        let CqlStatement::Select {
            table,
            projection,
            conditions,
            order_by,
            limit,
        } = &parsed.statement
        else {
            return Err(query_error("not a SELECT statement"));
        };
        check_arity(parsed, values)?;

        let binder = Binder { values };
        let filters = binder.filters(conditions)?;
        let limit = match limit {
            Some(term) => match binder.resolve(term)?.as_i64() {
                Some(n) if n > 0 => Some(n as usize),
                _ => return Err(query_error("LIMIT must be strictly positive")),
            },
            None => None,
        };

        let tables = self.tables.read();
        let name = resolve_name(&tables, table, keyspace)?;
        let table = &tables[&name];

        let reverse = match order_by {
            Some((column, order)) => match table.schema.clustering_order(column) {
                Some(clustering) => clustering != *order,
                None => {
                    return Err(query_error(format!(
                        "ORDER BY is only supported on clustering columns, not {}",
                        column
                    )))
                }
            },
            None => false,
        };

        let mut matched: Vec<&StoredRow> = table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            .collect();

        if let Projection::Count = projection {
            let count = matched.len() as i64;
            return Ok(ResultSet::new(vec![Row::new(vec![(
                "count".to_string(),
                Value::BigInt(count),
            )])]));
        }

        if reverse {
            matched.reverse();
        }
        if let Some(limit) = limit {
            matched.truncate(limit);
        }

        let rows = matched
            .into_iter()
            .map(|row| match projection {
                Projection::Columns(columns) => Row::new(
                    columns
                        .iter()
                        .map(|column| {
                            (
                                column.clone(),
                                row.get(column).cloned().unwrap_or(Value::Null),
                            )
                        })
                        .collect(),
                ),
                _ => table.output(row),
            })
            .collect();
        Ok(ResultSet::new(rows))
    }

    /// Apply writes atomically: every statement is validated before any
    /// row changes.
    pub fn apply(&self, writes: &[(Parsed, Vec<Value>)], keyspace: Option<&str>) -> Result<()> {
        let mut tables = self.tables.write();
        let mutations = writes
            .iter()
            .map(|(parsed, values)| plan(&tables, parsed, values, keyspace))
            .collect::<Result<Vec<_>>>()?;
        for mutation in mutations {
            apply_mutation(&mut tables, mutation);
        }
        Ok(())
    }
}

fn check_arity(parsed: &Parsed, values: &[Value]) -> Result<()> {
    if parsed.markers != values.len() {
        return Err(query_error(format!(
            "expected {} bind values, got {}",
            parsed.markers,
            values.len()
        )));
    }
    Ok(())
}

fn resolve_name(tables: &HashMap<String, Table>, name: &str, keyspace: Option<&str>) -> Result<String> {
    let name = name.to_ascii_lowercase();
    if !name.contains('.') {
        if let Some(keyspace) = keyspace {
            let qualified = format!("{}.{}", keyspace.to_ascii_lowercase(), name);
            if tables.contains_key(&qualified) {
                return Ok(qualified);
            }
        }
    }
    if tables.contains_key(&name) {
        Ok(name)
    } else {
        Err(query_error(format!("unconfigured table {}", name)))
    }
}

fn plan(
    tables: &HashMap<String, Table>,
    parsed: &Parsed,
    values: &[Value],
    keyspace: Option<&str>,
) -> Result<Mutation> {
    check_arity(parsed, values)?;
    let binder = Binder { values };

    match &parsed.statement {
        CqlStatement::Insert {
            table,
            columns,
            values: terms,
            ttl,
        } => {
            binder.ttl(ttl)?;
            let name = resolve_name(tables, table, keyspace)?;
            let schema = &tables[&name].schema;

            let mut key = StoredRow::new();
            let mut cells = Vec::new();
            for (column, term) in columns.iter().zip(terms) {
                let value = binder.resolve(term)?;
                if schema.is_key_column(column) {
                    key.insert(column.clone(), value);
                } else {
                    cells.push((column.clone(), CellOp::Set(value)));
                }
            }
            check_key(schema, &key)?;
            Ok(Mutation::Upsert {
                table: name,
                key,
                cells,
            })
        }
        CqlStatement::Update {
            table,
            ttl,
            assignments,
            conditions,
        } => {
            binder.ttl(ttl)?;
            let name = resolve_name(tables, table, keyspace)?;
            let table = &tables[&name];

            let mut key = StoredRow::new();
            for filter in binder.filters(conditions)? {
                match (filter.op, filter.values.as_slice()) {
                    (Op::Eq, [value]) if table.schema.is_key_column(&filter.column) => {
                        key.insert(filter.column, value.clone());
                    }
                    _ => {
                        return Err(query_error(format!(
                            "UPDATE must restrict primary key column {} by equality",
                            filter.column
                        )))
                    }
                }
            }
            check_key(&table.schema, &key)?;

            let existing = table.position(&key).ok().map(|index| &table.rows[index]);
            let cells = assignments
                .iter()
                .map(|assignment| cell_op(&binder, table, existing, assignment))
                .collect::<Result<_>>()?;
            Ok(Mutation::Upsert {
                table: name,
                key,
                cells,
            })
        }
        CqlStatement::Delete { table, conditions } => {
            let name = resolve_name(tables, table, keyspace)?;
            let filters = binder.filters(conditions)?;
            if filters.iter().any(|f| !matches!(f.op, Op::Eq | Op::In)) {
                return Err(query_error("DELETE only supports = and IN restrictions"));
            }
            Ok(Mutation::Delete {
                table: name,
                filters,
            })
        }
        CqlStatement::Truncate { table } => Ok(Mutation::Truncate {
            table: resolve_name(tables, table, keyspace)?,
        }),
        CqlStatement::Select { .. } => Err(query_error("SELECT is not a write")),
    }
}

fn check_key(schema: &TableSchema, key: &StoredRow) -> Result<()> {
    for column in schema.key_columns() {
        match key.get(column) {
            Some(value) if !value.is_null() => {}
            _ => {
                return Err(query_error(format!(
                    "missing primary key column {}",
                    column
                )))
            }
        }
    }
    Ok(())
}

fn cell_op(
    binder: &Binder<'_>,
    table: &Table,
    existing: Option<&StoredRow>,
    assignment: &Assignment,
) -> Result<(String, CellOp)> {
    if table.schema.is_key_column(&assignment.column) {
        return Err(query_error(format!(
            "cannot update primary key column {}",
            assignment.column
        )));
    }
    let op = match &assignment.expr {
        SetExpr::Value(term) => CellOp::Set(binder.resolve(term)?),
        SetExpr::Add(term) => CellOp::Add(binder.resolve(term)?),
        SetExpr::Sub(term) => CellOp::Add(negate(binder.resolve(term)?)?),
    };
    if let CellOp::Add(delta) = &op {
        let current = existing.and_then(|row| row.get(&assignment.column));
        if add_values(current, delta).is_none() {
            return Err(query_error(format!(
                "cannot add {} to column {}",
                delta.type_name(),
                assignment.column
            )));
        }
    }
    Ok((assignment.column.clone(), op))
}

fn apply_mutation(tables: &mut HashMap<String, Table>, mutation: Mutation) {
    match mutation {
        Mutation::Upsert { table, key, cells } => {
            let Some(table) = tables.get_mut(&table) else {
                return;
            };
            let index = match table.position(&key) {
                Ok(index) => index,
                Err(index) => {
                    table.rows.insert(index, key);
                    index
                }
            };
            let row = &mut table.rows[index];
            for (column, op) in cells {
                let value = match op {
                    CellOp::Set(value) => value,
                    CellOp::Add(delta) => add_values(row.get(&column), &delta).unwrap_or(delta),
                };
                if value.is_null() {
                    row.remove(&column);
                } else {
                    row.insert(column, value);
                }
            }
        }
        Mutation::Delete { table, filters } => {
            if let Some(table) = tables.get_mut(&table) {
                table
                    .rows
                    .retain(|row| !filters.iter().all(|filter| filter.matches(row)));
            }
        }
        Mutation::Truncate { table } => {
            if let Some(table) = tables.get_mut(&table) {
                table.rows.clear();
            }
        }
    }
}
