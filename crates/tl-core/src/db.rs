//! Database-access seam.
//!
//! The sink performs all I/O through [`Database`]: plain statements, row
//! queries, scalar queries and single-row inserts, plus the connection's table
//! prefix and charset clause. Retries, pooling and transactions belong to the
//! implementation, not to the sink.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Errors reported by a database implementation.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("statement failed: {0}")]
    Statement(String),

    #[error("connection lock poisoned")]
    Poisoned,
}

impl From<DbError> for tl_common::Error {
    fn from(err: DbError) -> Self {
        tl_common::Error::Database(err.to_string())
    }
}

/// SQL flavour spoken by a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Quote an identifier. Callers validate identifiers first; quote
    /// characters are doubled regardless.
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Definition of the surrogate key column.
    pub fn id_column(self) -> String {
        match self {
            Dialect::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.quote_ident("id")),
            Dialect::MySql => format!("{} INT(11) NOT NULL AUTO_INCREMENT", self.quote_ident("id")),
        }
    }

    /// Trailing table constraint, when the key is not declared inline.
    pub fn primary_key_clause(self) -> Option<String> {
        match self {
            Dialect::Sqlite => None,
            Dialect::MySql => Some(format!("PRIMARY KEY ({})", self.quote_ident("id"))),
        }
    }

    pub fn message_type(self) -> &'static str {
        match self {
            Dialect::Sqlite => "TEXT",
            Dialect::MySql => "LONGTEXT",
        }
    }

    pub fn time_type(self) -> &'static str {
        match self {
            Dialect::Sqlite => "INTEGER",
            Dialect::MySql => "INTEGER UNSIGNED",
        }
    }

    /// Default type for dynamic fields.
    pub fn text_type(self) -> &'static str {
        "TEXT"
    }

    /// Wide enough for a textual IPv6 address.
    pub fn address_type(self) -> &'static str {
        "VARCHAR(45)"
    }

    /// Query returning one `name` column per table column, in table order.
    /// An unknown table yields no rows.
    pub fn columns_query(self, table: &str) -> String {
        match self {
            Dialect::Sqlite => {
                format!("SELECT name FROM pragma_table_info('{table}') ORDER BY cid")
            }
            Dialect::MySql => format!(
                "SELECT COLUMN_NAME AS name FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{table}' \
                 ORDER BY ORDINAL_POSITION"
            ),
        }
    }
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Convert a record value. Arrays and objects become compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map_or_else(|| SqlValue::Text(n.to_string()), SqlValue::Real),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f) => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering, used for CLI output.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Real(f) => Value::from(*f),
            SqlValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Result row of [`Database::query`], keyed by column name.
pub type DbRow = BTreeMap<String, SqlValue>;

/// A flattened log entry ready for insertion.
///
/// Column names are unique ignoring ASCII case, matching how both dialects
/// resolve identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_key(&self, column: &str) -> Option<&String> {
        self.columns
            .keys()
            .find(|key| key.eq_ignore_ascii_case(column))
    }

    /// Set a column, replacing any value stored under the same name.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        if let Some(existing) = self.existing_key(&column).cloned() {
            self.columns.remove(&existing);
        }
        self.columns.insert(column, value.into());
    }

    /// Set a column only if no value is present. Returns whether it was set.
    pub fn insert_if_absent(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> bool {
        let column = column.into();
        if self.contains(&column) {
            return false;
        }
        self.columns.insert(column, value.into());
        true
    }

    pub fn contains(&self, column: &str) -> bool {
        self.existing_key(column).is_some()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.existing_key(column).and_then(|key| self.columns.get(key))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Database-access collaborator used by the sink.
pub trait Database: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Prefix prepended to table base names.
    fn table_prefix(&self) -> &str;

    /// Clause appended to `CREATE TABLE` (charset/collation); may be empty.
    fn charset_clause(&self) -> &str;

    /// Run a statement, returning the number of affected rows.
    fn execute(&self, sql: &str) -> Result<u64, DbError>;

    fn query(&self, sql: &str) -> Result<Vec<DbRow>, DbError>;

    /// First column of the first row, or `None` when there are no rows.
    fn query_scalar(&self, sql: &str) -> Result<Option<SqlValue>, DbError>;

    /// Insert one row, binding values as parameters.
    fn insert(&self, table: &str, row: &Row) -> Result<(), DbError>;

    /// Live column names of `table` in table order; empty if it does not exist.
    fn table_columns(&self, table: &str) -> Result<Vec<String>, DbError> {
        let rows = self.query(&self.dialect().columns_query(table))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(SqlValue::as_str).map(str::to_string))
            .collect())
    }
}
