//! Database collaborator boundary.
//!
//! `SqlBackend` is the seam a real driver plugs into; `DbConn` wraps a
//! backend and converts results to JSON values, catching backend errors and
//! surfacing them as `{"error": message}` instead of propagating. Writes
//! report `{"insertid": id}` or `{"affectedrows": n}` the way API consumers
//! expect. `MemoryBackend` is an in-process store with auto-increment ids,
//! enough for the demo binary and tests to run without a SQL server.

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::DbError;

/// One result row.
pub type Row = IndexMap<String, Value>;

/// Equality conditions for updates and deletes.
pub type Where = IndexMap<String, Value>;

/// Storage seam. Implementations own their transactional semantics.
pub trait SqlBackend: Send + Sync {
    fn select(&self, query: &str, limit: Option<u64>, offset: Option<u64>)
        -> Result<Vec<Row>, DbError>;
    fn insert(&self, table: &str, fields: &Row, ignore_duplicate: bool) -> Result<i64, DbError>;
    fn update(&self, table: &str, fields: &Row, conditions: &Where) -> Result<u64, DbError>;
    fn delete(&self, table: &str, conditions: &Where) -> Result<u64, DbError>;
}

/// JSON-facing wrapper. Errors never escape; they come back as data.
pub struct DbConn<B: SqlBackend> {
    backend: B,
}

impl<B: SqlBackend> DbConn<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Run a select. `offset` is 1-based, matching the API this replaces.
    pub fn select_data(&self, query: &str, limit: Option<u64>, offset: Option<u64>) -> Value {
        match self.backend.select(query, limit, offset.map(|o| o.saturating_sub(1))) {
            Ok(rows) => Value::Array(
                rows.into_iter()
                    .map(|row| Value::Object(row.into_iter().collect()))
                    .collect(),
            ),
            Err(err) => json!({"error": err.to_string()}),
        }
    }

    pub fn insert_data(&self, table: &str, fields: &Row, ignore_duplicate: bool) -> Value {
        match self.backend.insert(table, fields, ignore_duplicate) {
            Ok(id) => json!({"insertid": id}),
            Err(err) => json!({"error": err.to_string()}),
        }
    }

    pub fn update_data(&self, table: &str, fields: &Row, conditions: &Where) -> Value {
        match self.backend.update(table, fields, conditions) {
            Ok(n) => json!({"affectedrows": n}),
            Err(err) => json!({"error": err.to_string()}),
        }
    }

    pub fn delete_data(&self, table: &str, conditions: &Where) -> Value {
        match self.backend.delete(table, conditions) {
            Ok(n) => json!({"affectedrows": n}),
            Err(err) => json!({"error": err.to_string()}),
        }
    }
}

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

/// In-process table store. Supports the query shape the demo needs:
/// `SELECT * FROM table` with an optional `WHERE col = 'value'`.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a table so selects against it return an empty set instead
    /// of an unknown-table error.
    pub fn create_table(&self, name: &str) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(name.to_string()).or_insert_with(|| Table {
                rows: Vec::new(),
                next_id: 1,
            });
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Table>>, DbError> {
        self.tables
            .lock()
            .map_err(|_| DbError::Backend("storage lock poisoned".to_string()))
    }
}

/// Parse `SELECT * FROM table [WHERE col = 'value']`.
fn parse_select(query: &str) -> Result<(String, Option<(String, String)>), DbError> {
    let unsupported = || DbError::UnsupportedQuery(query.to_string());
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();

    let from_pos = lower.find(" from ").ok_or_else(unsupported)?;
    if !lower.starts_with("select ") {
        return Err(unsupported());
    }

    let after_from = trimmed[from_pos + 6..].trim();
    let (table, rest) = match after_from.to_lowercase().find(" where ") {
        Some(pos) => (
            after_from[..pos].trim().to_string(),
            Some(after_from[pos + 7..].trim()),
        ),
        None => (after_from.trim().to_string(), None),
    };

    let condition = match rest {
        None => None,
        Some(clause) => {
            let (col, value) = clause.split_once('=').ok_or_else(unsupported)?;
            let value = value.trim().trim_matches('\'').to_string();
            Some((col.trim().to_string(), value))
        }
    };

    Ok((table, condition))
}

/// A row field equals a condition value when their text forms agree.
fn field_matches(row: &Row, col: &str, expected: &str) -> bool {
    match row.get(col) {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

impl SqlBackend for MemoryBackend {
    fn select(
        &self,
        query: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>, DbError> {
        let (table_name, condition) = parse_select(query)?;
        let tables = self.lock()?;
        let table = tables
            .get(&table_name)
            .ok_or_else(|| DbError::UnknownTable(table_name.clone()))?;

        let rows = table
            .rows
            .iter()
            .filter(|row| match &condition {
                Some((col, value)) => field_matches(row, col, value),
                None => true,
            })
            .skip(offset.unwrap_or(0) as usize)
            .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(rows)
    }

    fn insert(&self, table: &str, fields: &Row, ignore_duplicate: bool) -> Result<i64, DbError> {
        let mut tables = self.lock()?;
        let table = tables.entry(table.to_string()).or_insert_with(|| Table {
            rows: Vec::new(),
            next_id: 1,
        });

        let duplicate = table.rows.iter().any(|row| {
            fields
                .iter()
                .all(|(k, v)| row.get(k).map(|existing| existing == v).unwrap_or(false))
        });
        if duplicate {
            if ignore_duplicate {
                return Ok(0);
            }
            return Err(DbError::Duplicate);
        }

        let id = table.next_id;
        table.next_id += 1;

        let mut row = Row::new();
        row.insert("id".to_string(), Value::from(id));
        for (k, v) in fields {
            row.insert(k.clone(), v.clone());
        }
        table.rows.push(row);

        Ok(id)
    }

    fn update(&self, table: &str, fields: &Row, conditions: &Where) -> Result<u64, DbError> {
        let mut tables = self.lock()?;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;

        let mut affected = 0;
        for row in table.rows.iter_mut() {
            let hit = conditions
                .iter()
                .all(|(col, value)| row.get(col) == Some(value));
            if hit {
                for (k, v) in fields {
                    row.insert(k.clone(), v.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&self, table: &str, conditions: &Where) -> Result<u64, DbError> {
        let mut tables = self.lock()?;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;

        let before = table.rows.len();
        table.rows.retain(|row| {
            !conditions
                .iter()
                .all(|(col, value)| row.get(col) == Some(value))
        });
        Ok((before - table.rows.len()) as u64)
    }
}
