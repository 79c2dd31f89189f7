//! Row-count retention for log tables.
//!
//! Once a table holds `max_rows` rows, a pass deletes the oldest rows so that
//! only the newest `max_rows - batch_size` survive. "Oldest" means lowest
//! `id`: ids are assigned monotonically, timestamps are caller-supplied. A
//! single pass deletes at most [`RETENTION_DELETE_CAP`] rows, so a table far
//! over its limit converges over several writes.

use std::sync::Arc;

use thiserror::Error;
use tl_config::RetentionPolicy;
use tracing::{debug, warn};

use crate::db::{Database, DbError, Dialect};

/// Upper bound on rows deleted by one pass.
pub const RETENTION_DELETE_CAP: u64 = 10_000;

/// Retention failures. Logged and swallowed by [`RetentionEnforcer::maybe_truncate`].
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("failed to count rows in {table}: {source}")]
    Count {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("failed to locate retention boundary in {table}: {source}")]
    Boundary {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("failed to delete old rows from {table}: {source}")]
    Delete {
        table: String,
        #[source]
        source: DbError,
    },
}

impl From<RetentionError> for tl_common::Error {
    fn from(err: RetentionError) -> Self {
        tl_common::Error::Retention(err.to_string())
    }
}

fn count_sql(dialect: Dialect, table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", dialect.quote_ident(table))
}

/// Id of the newest row that falls outside the `keep` newest rows.
fn boundary_sql(dialect: Dialect, table: &str, keep: u64) -> String {
    format!(
        "SELECT {id} FROM {table} ORDER BY {id} DESC LIMIT 1 OFFSET {keep}",
        id = dialect.quote_ident("id"),
        table = dialect.quote_ident(table),
    )
}

/// Delete up to `cap` rows at or below `boundary`, oldest first. The
/// derived table lets MySQL delete from the table it selects from.
fn delete_sql(dialect: Dialect, table: &str, boundary: i64, cap: u64) -> String {
    let id = dialect.quote_ident("id");
    let table = dialect.quote_ident(table);
    format!(
        "DELETE FROM {table} WHERE {id} IN (SELECT {id} FROM (SELECT {id} FROM {table} \
         WHERE {id} <= {boundary} ORDER BY {id} ASC LIMIT {cap}) AS retention_batch)"
    )
}

/// Enforces a [`RetentionPolicy`] against a table.
#[derive(Clone)]
pub struct RetentionEnforcer {
    db: Arc<dyn Database>,
    delete_cap: u64,
}

impl RetentionEnforcer {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            delete_cap: RETENTION_DELETE_CAP,
        }
    }

    /// Lower the per-pass delete bound (at least 1).
    pub fn with_delete_cap(mut self, cap: u64) -> Self {
        self.delete_cap = cap.max(1);
        self
    }

    /// Run one pass. Returns whether rows were deleted; failures are logged
    /// and reported as `false`, deferring retention to the next write.
    pub fn maybe_truncate(&self, table: &str, policy: &RetentionPolicy) -> bool {
        match self.truncate(table, policy) {
            Ok(deleted) => deleted > 0,
            Err(err) => {
                warn!(table, error = %err, "retention pass failed; deferred to next write");
                false
            }
        }
    }

    /// Run one pass, returning the number of deleted rows.
    pub fn truncate(&self, table: &str, policy: &RetentionPolicy) -> Result<u64, RetentionError> {
        if !policy.is_enabled() {
            return Ok(0);
        }
        let dialect = self.db.dialect();

        let count = self
            .db
            .query_scalar(&count_sql(dialect, table))
            .map_err(|source| RetentionError::Count {
                table: table.to_string(),
                source,
            })?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        if count < 0 || (count as u64) < policy.max_rows() {
            return Ok(0);
        }

        let boundary = self
            .db
            .query_scalar(&boundary_sql(dialect, table, policy.keep_rows()))
            .map_err(|source| RetentionError::Boundary {
                table: table.to_string(),
                source,
            })?
            .and_then(|v| v.as_i64());
        let Some(boundary) = boundary else {
            return Ok(0);
        };

        let deleted = self
            .db
            .execute(&delete_sql(dialect, table, boundary, self.delete_cap))
            .map_err(|source| RetentionError::Delete {
                table: table.to_string(),
                source,
            })?;
        debug!(table, count, boundary, deleted, "retention pass deleted rows");
        Ok(deleted)
    }
}
