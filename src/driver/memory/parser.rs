//! CQL subset parser
//!
//! Parses the statements the runtime emits plus the handful that tests and
//! tools issue directly:
//!
//! ```text
//! SELECT (* | COUNT(*) | col, ...) FROM name [WHERE cond AND ...]
//!        [ORDER BY col [ASC|DESC]] [LIMIT term] [ALLOW FILTERING]
//! INSERT INTO name (col, ...) VALUES (term, ...) [USING TTL term]
//! UPDATE name [USING TTL term] SET col = expr, ... WHERE cond AND ...
//! DELETE FROM name WHERE cond AND ...
//! TRUNCATE [TABLE] name
//!
//! cond := col (= | < | > | <= | >=) term | col IN (term, ...)
//! expr := term | col (+ | -) term
//! term := ? | integer | float | 'string' | true | false | null
//! ```
//!
//! Unquoted identifiers are lower-cased, quoted ones keep their case.

use crate::cql::Order;
use crate::error::{CassieError, Result};
use crate::value::Value;

/// A value slot: a bind marker (by position) or an inline literal
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term {
    Marker(usize),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
    pub column: String,
    pub op: Op,
    /// One term, or the list for `IN`
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Count,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SetExpr {
    Value(Term),
    /// `col = col + term`
    Add(Term),
    /// `col = col - term`
    Sub(Term),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub column: String,
    pub expr: SetExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CqlStatement {
    Select {
        table: String,
        projection: Projection,
        conditions: Vec<Condition>,
        order_by: Option<(String, Order)>,
        limit: Option<Term>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Term>,
        ttl: Option<Term>,
    },
    Update {
        table: String,
        ttl: Option<Term>,
        assignments: Vec<Assignment>,
        conditions: Vec<Condition>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    Truncate {
        table: String,
    },
}

/// A parsed statement and the number of bind markers it expects
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parsed {
    pub statement: CqlStatement,
    pub markers: usize,
}

impl Parsed {
    pub fn is_write(&self) -> bool {
        !matches!(self.statement, CqlStatement::Select { .. })
    }
}

pub(crate) fn parse(cql: &str) -> Result<Parsed> {
    let tokens = tokenize(cql)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        markers: 0,
    };
    let statement = parser.statement()?;
    parser.eat_symbol(";");
    if let Some(token) = parser.peek() {
        return Err(syntax(format!("unexpected {:?} after statement", token)));
    }
    Ok(Parsed {
        statement,
        markers: parser.markers,
    })
}

fn syntax(message: impl Into<String>) -> CassieError {
    CassieError::Syntax(message.into())
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Str(String),
    Int(i64),
    Float(f64),
    Marker,
    Symbol(&'static str),
}

const SYMBOLS: &[&str] = &["<=", ">=", "(", ")", ",", "=", "<", ">", "*", ";", "+", "-"];

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '?' {
            tokens.push(Token::Marker);
            i += 1;
        } else if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(syntax("unterminated string literal")),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        text.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
        } else if c == '"' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|ch| *ch == '"')
                .map(|offset| start + offset)
                .ok_or_else(|| syntax("unterminated quoted identifier"))?;
            tokens.push(Token::Quoted(chars[start..end].iter().collect()));
            i = end + 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax(format!("invalid number {}", text)))?;
                tokens.push(Token::Float(value));
            } else {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| syntax(format!("invalid number {}", text)))?;
                tokens.push(Token::Int(value));
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let symbol = SYMBOLS
                .iter()
                .find(|symbol| rest.starts_with(**symbol))
                .ok_or_else(|| syntax(format!("unexpected character '{}'", c)))?;
            tokens.push(Token::Symbol(symbol));
            i += symbol.len();
        }
    }
    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    markers: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(syntax(format!("expected {} near {:?}", keyword, self.peek())))
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(syntax(format!("expected '{}' near {:?}", symbol, self.peek())))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name.to_ascii_lowercase()),
            Some(Token::Quoted(name)) => Ok(name),
            other => Err(syntax(format!("expected identifier, found {:?}", other))),
        }
    }

    fn statement(&mut self) -> Result<CqlStatement> {
        if self.eat_keyword("SELECT") {
            self.select()
        } else if self.eat_keyword("INSERT") {
            self.insert()
        } else if self.eat_keyword("UPDATE") {
            self.update()
        } else if self.eat_keyword("DELETE") {
            self.delete()
        } else if self.eat_keyword("TRUNCATE") {
            self.eat_keyword("TABLE");
            Ok(CqlStatement::Truncate {
                table: self.identifier()?,
            })
        } else {
            Err(syntax(format!("unsupported statement near {:?}", self.peek())))
        }
    }

    fn select(&mut self) -> Result<CqlStatement> {
        let projection = if self.eat_symbol("*") {
            Projection::All
        } else if self.is_keyword("COUNT") {
            self.pos += 1;
            self.expect_symbol("(")?;
            if !self.eat_symbol("*") && !matches!(self.next(), Some(Token::Int(1))) {
                return Err(syntax("expected COUNT(*) or COUNT(1)"));
            }
            self.expect_symbol(")")?;
            Projection::Count
        } else {
            let mut columns = vec![self.identifier()?];
            while self.eat_symbol(",") {
                columns.push(self.identifier()?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let conditions = if self.eat_keyword("WHERE") {
            self.conditions()?
        } else {
            Vec::new()
        };

        let mut order_by = None;
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.identifier()?;
            let order = if self.eat_keyword("DESC") {
                Order::Desc
            } else {
                self.eat_keyword("ASC");
                Order::Asc
            };
            order_by = Some((column, order));
        }

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.term()?)
        } else {
            None
        };

        if self.eat_keyword("ALLOW") {
            self.expect_keyword("FILTERING")?;
        }

        Ok(CqlStatement::Select {
            table,
            projection,
            conditions,
            order_by,
            limit,
        })
    }

    fn insert(&mut self) -> Result<CqlStatement> {
        self.expect_keyword("INTO")?;
        let table = self.identifier()?;

        self.expect_symbol("(")?;
        let mut columns = vec![self.identifier()?];
        while self.eat_symbol(",") {
            columns.push(self.identifier()?);
        }
        self.expect_symbol(")")?;

        self.expect_keyword("VALUES")?;
        self.expect_symbol("(")?;
        let mut values = vec![self.term()?];
        while self.eat_symbol(",") {
            values.push(self.term()?);
        }
        self.expect_symbol(")")?;

        if columns.len() != values.len() {
            return Err(syntax(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }

        let ttl = self.using_ttl()?;
        Ok(CqlStatement::Insert {
            table,
            columns,
            values,
            ttl,
        })
    }

    fn update(&mut self) -> Result<CqlStatement> {
        let table = self.identifier()?;
        let ttl = self.using_ttl()?;

        self.expect_keyword("SET")?;
        let mut assignments = vec![self.assignment()?];
        while self.eat_symbol(",") {
            assignments.push(self.assignment()?);
        }

        self.expect_keyword("WHERE")?;
        let conditions = self.conditions()?;
        Ok(CqlStatement::Update {
            table,
            ttl,
            assignments,
            conditions,
        })
    }

    fn delete(&mut self) -> Result<CqlStatement> {
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        self.expect_keyword("WHERE")?;
        let conditions = self.conditions()?;
        Ok(CqlStatement::Delete { table, conditions })
    }

    fn using_ttl(&mut self) -> Result<Option<Term>> {
        if self.eat_keyword("USING") {
            self.expect_keyword("TTL")?;
            Ok(Some(self.term()?))
        } else {
            Ok(None)
        }
    }

    fn assignment(&mut self) -> Result<Assignment> {
        let column = self.identifier()?;
        self.expect_symbol("=")?;

        let self_reference = matches!(
            self.peek(),
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case(&column)
        );
        let expr = if self_reference {
            self.pos += 1;
            if self.eat_symbol("+") {
                SetExpr::Add(self.term()?)
            } else if self.eat_symbol("-") {
                SetExpr::Sub(self.term()?)
            } else {
                return Err(syntax(format!("expected + or - after {}", column)));
            }
        } else {
            SetExpr::Value(self.term()?)
        };
        Ok(Assignment { column, expr })
    }

    fn conditions(&mut self) -> Result<Vec<Condition>> {
        let mut conditions = vec![self.condition()?];
        while self.eat_keyword("AND") {
            conditions.push(self.condition()?);
        }
        Ok(conditions)
    }

    fn condition(&mut self) -> Result<Condition> {
        let column = self.identifier()?;
        if self.eat_keyword("IN") {
            self.expect_symbol("(")?;
            let mut terms = vec![self.term()?];
            while self.eat_symbol(",") {
                terms.push(self.term()?);
            }
            self.expect_symbol(")")?;
            return Ok(Condition {
                column,
                op: Op::In,
                terms,
            });
        }

        let op = match self.next() {
            Some(Token::Symbol("=")) => Op::Eq,
            Some(Token::Symbol("<")) => Op::Lt,
            Some(Token::Symbol(">")) => Op::Gt,
            Some(Token::Symbol("<=")) => Op::Le,
            Some(Token::Symbol(">=")) => Op::Ge,
            other => return Err(syntax(format!("expected operator, found {:?}", other))),
        };
        Ok(Condition {
            column,
            op,
            terms: vec![self.term()?],
        })
    }

    fn term(&mut self) -> Result<Term> {
        let negative = self.eat_symbol("-");
        let term = match self.next() {
            Some(Token::Marker) if !negative => {
                let index = self.markers;
                self.markers += 1;
                Term::Marker(index)
            }
            Some(Token::Int(v)) => {
                let v = if negative { -v } else { v };
                match i32::try_from(v) {
                    Ok(small) => Term::Literal(Value::Int(small)),
                    Err(_) => Term::Literal(Value::BigInt(v)),
                }
            }
            Some(Token::Float(v)) => Term::Literal(Value::Double(if negative { -v } else { v })),
            Some(Token::Str(s)) if !negative => Term::Literal(Value::Text(s)),
            Some(Token::Ident(word)) if !negative && word.eq_ignore_ascii_case("true") => {
                Term::Literal(Value::Boolean(true))
            }
            Some(Token::Ident(word)) if !negative && word.eq_ignore_ascii_case("false") => {
                Term::Literal(Value::Boolean(false))
            }
            Some(Token::Ident(word)) if !negative && word.eq_ignore_ascii_case("null") => {
                Term::Literal(Value::Null)
            }
            other => return Err(syntax(format!("expected value, found {:?}", other))),
        };
        Ok(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_select() {
        let parsed =
            parse("SELECT id FROM ks.things WHERE id > ? AND owner = ? ORDER BY id DESC LIMIT ?")
                .unwrap();
        assert_eq!(parsed.markers, 3);
        assert!(!parsed.is_write());
        match parsed.statement {
            CqlStatement::Select {
                table,
                projection,
                conditions,
                order_by,
                limit,
            } => {
                assert_eq!(table, "ks.things");
                assert_eq!(projection, Projection::Columns(vec!["id".into()]));
                assert_eq!(conditions.len(), 2);
                assert_eq!(conditions[0].op, Op::Gt);
                assert_eq!(order_by, Some(("id".to_string(), Order::Desc)));
                assert_eq!(limit, Some(Term::Marker(2)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_with_ttl_and_literals() {
        let parsed =
            parse("INSERT INTO t (a, b, c) VALUES (1, 'it''s', ?) USING TTL ?;").unwrap();
        assert_eq!(parsed.markers, 2);
        match parsed.statement {
            CqlStatement::Insert { values, ttl, .. } => {
                assert_eq!(values[0], Term::Literal(Value::Int(1)));
                assert_eq!(values[1], Term::Literal(Value::Text("it's".into())));
                assert_eq!(ttl, Some(Term::Marker(1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_counter_update() {
        let parsed = parse("UPDATE t SET hits = hits + ?, name = 'x' WHERE k = -5").unwrap();
        match parsed.statement {
            CqlStatement::Update {
                assignments,
                conditions,
                ..
            } => {
                assert_eq!(assignments[0].expr, SetExpr::Add(Term::Marker(0)));
                assert_eq!(conditions[0].terms[0], Term::Literal(Value::Int(-5)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_count_and_in() {
        let parsed = parse("select count(*) from t where k in (?, ?, 3)").unwrap();
        assert_eq!(parsed.markers, 2);
        match parsed.statement {
            CqlStatement::Select {
                projection,
                conditions,
                ..
            } => {
                assert_eq!(projection, Projection::Count);
                assert_eq!(conditions[0].op, Op::In);
                assert_eq!(conditions[0].terms.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse("SELEKT * FROM t"), Err(CassieError::Syntax(_))));
        assert!(matches!(parse("INSERT INTO t (a) VALUES (1, 2)"), Err(CassieError::Syntax(_))));
        assert!(matches!(parse("SELECT * FROM t WHERE a = 'open"), Err(CassieError::Syntax(_))));
        assert!(matches!(parse("SELECT * FROM t extra"), Err(CassieError::Syntax(_))));
    }
}
