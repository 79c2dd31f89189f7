//! Shared test doubles for sink integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tl_core::db::DbRow;
use tl_core::{Database, DbError, Dialect, Row, SqlValue, SqliteDatabase};

/// SQLite database that records statements and can inject failures.
pub struct RecordingDb {
    inner: SqliteDatabase,
    statements: Mutex<Vec<String>>,
    fail_matching: Mutex<Vec<String>>,
}

impl RecordingDb {
    pub fn new(prefix: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteDatabase::open_in_memory(prefix).expect("in-memory sqlite"),
            statements: Mutex::new(Vec::new()),
            fail_matching: Mutex::new(Vec::new()),
        })
    }

    /// Fail every statement containing `needle` (case-sensitive).
    pub fn fail_on(&self, needle: &str) {
        self.fail_matching.lock().unwrap().push(needle.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_matching.lock().unwrap().clear();
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    pub fn row_count(&self, table: &str) -> i64 {
        self.inner
            .query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
            .unwrap()
            .and_then(|v| v.as_i64())
            .unwrap()
    }

    pub fn rows(&self, table: &str) -> Vec<DbRow> {
        self.inner
            .query(&format!("SELECT * FROM \"{table}\" ORDER BY id"))
            .unwrap()
    }

    fn check(&self, sql: &str) -> Result<(), DbError> {
        self.statements.lock().unwrap().push(sql.to_string());
        let failing = self.fail_matching.lock().unwrap();
        if failing.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(DbError::Statement(format!("injected failure: {sql}")));
        }
        Ok(())
    }
}

impl Database for RecordingDb {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn table_prefix(&self) -> &str {
        self.inner.table_prefix()
    }

    fn charset_clause(&self) -> &str {
        self.inner.charset_clause()
    }

    fn execute(&self, sql: &str) -> Result<u64, DbError> {
        self.check(sql)?;
        self.inner.execute(sql)
    }

    fn query(&self, sql: &str) -> Result<Vec<DbRow>, DbError> {
        self.check(sql)?;
        self.inner.query(sql)
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<SqlValue>, DbError> {
        self.check(sql)?;
        self.inner.query_scalar(sql)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<(), DbError> {
        self.check(&format!("INSERT INTO {table}"))?;
        self.inner.insert(table, row)
    }
}
