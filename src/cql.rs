//! CQL text assembly
//!
//! Builds the write statements issued by the runtime. Every value is passed
//! as a bind marker so the same text maps to the same prepared statement no
//! matter which values are written.

use std::fmt;
use std::str::FromStr;

use crate::error::CassieError;
use crate::value::Value;

/// Direction of a clustering column or an ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Order::Asc => Order::Desc,
            Order::Desc => Order::Asc,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Order {
    type Err = CassieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Order::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Order::Desc)
        } else {
            Err(CassieError::InvalidArgument(format!(
                "order must be either asc or desc, got {}",
                s
            )))
        }
    }
}

/// What an UPDATE sets: column values, or a raw SET clause such as
/// `"hits = hits + 1"`.
#[derive(Debug)]
pub enum Assignments<'a, K: AsRef<str>> {
    Columns(&'a [(K, Value)]),
    Raw(&'a str),
}

impl<'a, K: AsRef<str>> From<&'a [(K, Value)]> for Assignments<'a, K> {
    fn from(columns: &'a [(K, Value)]) -> Self {
        Assignments::Columns(columns)
    }
}

impl<'a, K: AsRef<str>, const N: usize> From<&'a [(K, Value); N]> for Assignments<'a, K> {
    fn from(columns: &'a [(K, Value); N]) -> Self {
        Assignments::Columns(columns)
    }
}

impl<'a> From<&'a str> for Assignments<'a, &'a str> {
    fn from(clause: &'a str) -> Self {
        Assignments::Raw(clause)
    }
}

/// `"?,?,?"` for three markers
pub fn question_marks(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// `"a = ? AND b = ?"` and its values
pub fn key_clause<K: AsRef<str>>(key: &[(K, Value)]) -> (String, Vec<Value>) {
    let clause = key
        .iter()
        .map(|(column, _)| format!("{} = ?", column.as_ref()))
        .collect::<Vec<_>>()
        .join(" AND ");
    let values = key.iter().map(|(_, value)| value.clone()).collect();
    (clause, values)
}

/// INSERT for the non-null columns. A TTL goes last, after the column values.
pub fn insert_statement<K: AsRef<str>>(
    table: &str,
    columns: &[(K, Value)],
    ttl: Option<i32>,
) -> (String, Vec<Value>) {
    let mut names = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len() + 1);
    for (column, value) in columns {
        if !value.is_null() {
            names.push(column.as_ref());
            values.push(value.clone());
        }
    }

    let mut cql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(", "),
        question_marks(names.len())
    );
    if let Some(ttl) = ttl {
        cql.push_str(" USING TTL ?");
        values.push(Value::Int(ttl));
    }
    (cql, values)
}

/// UPDATE of one row. A TTL comes right after the table name, so its value
/// is bound first.
pub fn update_statement<K: AsRef<str>>(
    table: &str,
    assignments: Assignments<'_, K>,
    key: &[(K, Value)],
    ttl: Option<i32>,
) -> (String, Vec<Value>) {
    let (key_cql, key_values) = key_clause(key);
    let mut values = Vec::new();
    let set_cql = match assignments {
        Assignments::Raw(clause) => clause.to_string(),
        Assignments::Columns(columns) => columns
            .iter()
            .map(|(column, value)| {
                values.push(value.clone());
                format!("{} = ?", column.as_ref())
            })
            .collect::<Vec<_>>()
            .join(", "),
    };
    values.extend(key_values);

    let mut cql = format!("UPDATE {}", table);
    if let Some(ttl) = ttl {
        cql.push_str(" USING TTL ?");
        values.insert(0, Value::Int(ttl));
    }
    cql.push_str(&format!(" SET {} WHERE {}", set_cql, key_cql));
    (cql, values)
}

pub fn delete_statement<K: AsRef<str>>(table: &str, key: &[(K, Value)]) -> (String, Vec<Value>) {
    let (key_cql, values) = key_clause(key);
    (format!("DELETE FROM {} WHERE {}", table, key_cql), values)
}

/// `SELECT COUNT(*)`, restricted by `key` when it is not empty
pub fn count_statement<K: AsRef<str>>(table: &str, key: &[(K, Value)]) -> (String, Vec<Value>) {
    let mut cql = format!("SELECT COUNT(*) FROM {}", table);
    if key.is_empty() {
        return (cql, Vec::new());
    }
    let (key_cql, values) = key_clause(key);
    cql.push_str(" WHERE ");
    cql.push_str(&key_cql);
    (cql, values)
}
