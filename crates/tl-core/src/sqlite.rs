//! SQLite implementation of [`Database`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::db::{Database, DbError, DbRow, Dialect, Row, SqlValue};

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::Statement(err.to_string())
    }
}

/// A single SQLite connection shared behind a mutex.
pub struct SqliteDatabase {
    connection: Mutex<Connection>,
    prefix: String,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SqliteDatabase {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, DbError> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection, prefix)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(prefix: impl Into<String>) -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?, prefix)
    }

    fn from_connection(connection: Connection, prefix: impl Into<String>) -> Result<Self, DbError> {
        connection.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        Ok(Self {
            connection: Mutex::new(connection),
            prefix: prefix.into(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.connection.lock().map_err(|_| DbError::Poisoned)
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn to_sqlite(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(i) => SqliteValue::Integer(*i),
        SqlValue::Real(f) => SqliteValue::Real(*f),
        SqlValue::Text(s) => SqliteValue::Text(s.clone()),
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn table_prefix(&self) -> &str {
        &self.prefix
    }

    fn charset_clause(&self) -> &str {
        ""
    }

    fn execute(&self, sql: &str) -> Result<u64, DbError> {
        let conn = self.lock()?;
        Ok(conn.execute(sql, [])? as u64)
    }

    fn query(&self, sql: &str) -> Result<Vec<DbRow>, DbError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = DbRow::new();
            for (idx, name) in names.iter().enumerate() {
                mapped.insert(name.clone(), from_sqlite(row.get_ref(idx)?));
            }
            out.push(mapped);
        }
        Ok(out)
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<SqlValue>, DbError> {
        let conn = self.lock()?;
        let value = conn
            .query_row(sql, [], |row| row.get_ref(0).map(from_sqlite))
            .optional()?;
        Ok(value)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<(), DbError> {
        if row.is_empty() {
            return Err(DbError::Statement(format!("refusing empty insert into {table}")));
        }
        let dialect = self.dialect();
        let columns: Vec<String> = row.columns().map(|c| dialect.quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<SqliteValue> = row.iter().map(|(_, v)| to_sqlite(v)).collect();

        let conn = self.lock()?;
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory("wp_").unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, a TEXT, b INTEGER)")
            .unwrap();
        db
    }

    #[test]
    fn insert_and_query_round_trip() {
        let db = db();
        let mut row = Row::new();
        row.set("a", "hello");
        row.set("b", 7);
        db.insert("t", &row).unwrap();

        let rows = db.query("SELECT id, a, b FROM t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], SqlValue::Integer(1));
        assert_eq!(rows[0]["a"], SqlValue::Text("hello".into()));
        assert_eq!(rows[0]["b"], SqlValue::Integer(7));
    }

    #[test]
    fn empty_row_is_rejected() {
        let db = db();
        assert!(matches!(db.insert("t", &Row::new()), Err(DbError::Statement(_))));
        assert_eq!(
            db.query_scalar("SELECT COUNT(*) FROM t").unwrap(),
            Some(SqlValue::Integer(0))
        );
    }

    #[test]
    fn null_values_are_bound() {
        let db = db();
        let mut row = Row::new();
        row.set("a", SqlValue::Null);
        db.insert("t", &row).unwrap();
        let value = db.query_scalar("SELECT a FROM t").unwrap();
        assert_eq!(value, Some(SqlValue::Null));
    }

    #[test]
    fn scalar_on_empty_result_is_none() {
        let db = db();
        assert_eq!(db.query_scalar("SELECT id FROM t").unwrap(), None);
        assert_eq!(
            db.query_scalar("SELECT COUNT(*) FROM t").unwrap(),
            Some(SqlValue::Integer(0))
        );
    }

    #[test]
    fn table_columns_in_order() {
        let db = db();
        assert_eq!(db.table_columns("t").unwrap(), vec!["id", "a", "b"]);
        assert!(db.table_columns("missing").unwrap().is_empty());
    }

    #[test]
    fn execute_reports_affected_rows() {
        let db = db();
        for _ in 0..3 {
            db.execute("INSERT INTO t (a) VALUES ('x')").unwrap();
        }
        assert_eq!(db.execute("DELETE FROM t WHERE a = 'x'").unwrap(), 3);
    }

    #[test]
    fn statement_errors_surface() {
        let db = db();
        let err = db.execute("INSERT INTO nope VALUES (1)").unwrap_err();
        assert!(matches!(err, DbError::Statement(msg) if msg.contains("nope")));
    }

    #[test]
    fn prefix_is_reported() {
        assert_eq!(db().table_prefix(), "wp_");
        assert_eq!(db().charset_clause(), "");
    }
}
