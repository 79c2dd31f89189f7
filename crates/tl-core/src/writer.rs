//! The log sink: turns records into table rows.
//!
//! The first write initializes the table through the [`SchemaManager`]. The
//! schema is then cached; columns unknown to it are rejected before the insert
//! rather than silently dropped. Use [`LogSink::register_field`] or
//! `SinkConfig::extra_fields` for extra keys that appear after the first
//! record.
//!
//! # Initialization
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready(schema)
//!       ▲                 │
//!       └──── failure ────┘
//! ```
//!
//! Exactly one caller runs the schema statements; concurrent callers wait on a
//! condition variable until the state leaves `Initializing`.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use thiserror::Error;
use tl_common::{validate_identifier, FieldSpec, Level, LogRecord};
use tl_config::{validate_table_name, ConfigError, RetentionPolicy, SinkConfig};
use tracing::{debug, info, trace};

use crate::address::{resolve_client_address, RequestOrigin};
use crate::db::{Database, DbError, Row, SqlValue};
use crate::retention::{RetentionEnforcer, RetentionError};
use crate::schema::{SchemaError, SchemaManager, TableSchema};

/// Errors returned from [`LogSink::write`]. The record was not stored.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to initialize log table: {0}")]
    Schema(#[from] SchemaError),

    #[error("insert into {table} failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("column '{column}' does not exist in {table}; register it before the first write")]
    UnknownColumn { table: String, column: String },

    #[error("'{0}' is not a valid column name")]
    InvalidColumn(String),

    #[error("sink state lock poisoned")]
    Poisoned,
}

impl From<WriteError> for tl_common::Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Schema(inner) => inner.into(),
            WriteError::UnknownColumn { table, column } => {
                tl_common::Error::UnknownColumn { table, column }
            }
            other => tl_common::Error::Write(other.to_string()),
        }
    }
}

/// Whether a handled record continues to later handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[derive(Debug)]
enum InitState {
    Uninitialized,
    Initializing,
    Ready(Arc<TableSchema>),
}

/// Persists log records into one table.
pub struct LogSink {
    db: Arc<dyn Database>,
    config: SinkConfig,
    table: String,
    schema: SchemaManager,
    retention: RetentionEnforcer,
    state: Mutex<InitState>,
    state_changed: Condvar,
    registered: Mutex<Vec<FieldSpec>>,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("table", &self.table)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LogSink {
    /// Validate the configuration and build a sink. Does not touch the
    /// database; the table is created on first write.
    pub fn new(db: Arc<dyn Database>, config: SinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.prefix_override.is_none() {
            tl_config::validate::validate_prefix(db.table_prefix())?;
        }
        let table = config.full_table_name(db.table_prefix());
        validate_table_name(&table)?;

        let schema = SchemaManager::new(
            db.clone(),
            config.schema_policy,
            config.address_column.clone(),
        );
        let retention = RetentionEnforcer::new(db.clone());

        Ok(Self {
            db,
            config,
            table,
            schema,
            retention,
            state: Mutex::new(InitState::Uninitialized),
            state_changed: Condvar::new(),
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Full (prefixed) table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn retention_policy(&self) -> &RetentionPolicy {
        &self.config.retention
    }

    /// Whether the first-write initialization has completed.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state.lock().as_deref(),
            Ok(InitState::Ready(_))
        )
    }

    /// Cached schema, once initialized.
    pub fn schema(&self) -> Option<Arc<TableSchema>> {
        match self.state.lock().as_deref() {
            Ok(InitState::Ready(schema)) => Some(schema.clone()),
            _ => None,
        }
    }

    /// Whether records at `level` pass this sink's threshold.
    pub fn is_handling(&self, level: Level) -> bool {
        level >= self.config.min_level
    }

    /// Write `record` if it passes the level threshold.
    pub fn handle(
        &self,
        record: &LogRecord,
        origin: &RequestOrigin,
    ) -> Result<Propagation, WriteError> {
        if !self.is_handling(record.level) {
            return Ok(Propagation::Continue);
        }
        self.write_with_origin(record, origin)?;
        Ok(if self.config.bubble {
            Propagation::Continue
        } else {
            Propagation::Stop
        })
    }

    /// Persist one record with no origin data.
    pub fn write(&self, record: &LogRecord) -> Result<(), WriteError> {
        self.write_with_origin(record, &RequestOrigin::default())
    }

    /// Persist one record, resolving the client address from `origin`.
    ///
    /// Appends exactly one row, then runs one retention pass whose failure
    /// does not affect the result.
    pub fn write_with_origin(
        &self,
        record: &LogRecord,
        origin: &RequestOrigin,
    ) -> Result<(), WriteError> {
        let schema = self.ensure_ready(record)?;
        let row = self.build_row(record, origin);

        for column in row.columns() {
            validate_identifier(column).map_err(|_| WriteError::InvalidColumn(column.to_string()))?;
            if !schema.contains(column) {
                return Err(WriteError::UnknownColumn {
                    table: self.table.clone(),
                    column: column.to_string(),
                });
            }
        }

        self.db
            .insert(&self.table, &row)
            .map_err(|source| WriteError::Insert {
                table: self.table.clone(),
                source,
            })?;
        trace!(table = %self.table, columns = row.len(), "inserted log row");

        self.retention
            .maybe_truncate(&self.table, &self.config.retention);
        Ok(())
    }

    /// Flatten a record into a row.
    ///
    /// Base columns come first and are never overridden. Context wins over
    /// extra on key collisions. Declared additional fields missing from both
    /// are set to NULL explicitly.
    pub fn build_row(&self, record: &LogRecord, origin: &RequestOrigin) -> Row {
        let mut row = Row::new();
        row.set("channel", record.channel.as_str());
        row.set("level", record.level.code());
        row.set("message", record.effective_message());
        row.set("time", record.epoch_seconds());
        if let Some(column) = &self.config.address_column {
            row.set(column.as_str(), resolve_client_address(origin));
        }

        // Column names are case-insensitive, so a context key replaces every
        // case variant of itself in extra.
        let mut merged = record.effective_extra().clone();
        for (key, value) in record.effective_context() {
            merged.retain(|existing, _| !existing.eq_ignore_ascii_case(key));
            merged.insert(key.clone(), value.clone());
        }
        for (key, value) in &merged {
            if !row.insert_if_absent(key.as_str(), SqlValue::from_json(value)) {
                debug!(key = %key, "record key collides with an existing column; keeping first value");
            }
        }

        for field in &self.config.additional_fields {
            row.insert_if_absent(field.name.as_str(), SqlValue::Null);
        }
        row
    }

    /// Declare an extra field ahead of the records that carry it.
    ///
    /// Before initialization the field joins the initial schema. Afterwards
    /// the live table is widened immediately (add-only).
    pub fn register_field(&self, field: FieldSpec) -> Result<(), SchemaError> {
        field.validate_unreserved(self.config.address_column.as_deref())?;

        let mut state = self.wait_settled()?;
        if let InitState::Ready(schema) = &*state {
            if schema.contains(&field.name) {
                return Ok(());
            }
            let widened = self.schema.add_fields(&self.table, std::slice::from_ref(&field))?;
            info!(table = %self.table, field = %field.name, "registered field on live table");
            *state = InitState::Ready(Arc::new(widened));
            return Ok(());
        }

        // Still holding the state lock: no initialization can start before
        // the field is queued.
        let mut registered = self.registered.lock().map_err(|_| SchemaError::Poisoned)?;
        if !registered.iter().any(|f| f.same_column(&field.name)) {
            registered.push(field);
        }
        Ok(())
    }

    /// Drop the table and return to the uninitialized state. The next write
    /// recreates it.
    pub fn drop_table(&self) -> Result<(), SchemaError> {
        let mut state = self.wait_settled()?;
        self.schema.drop_table(&self.table)?;
        *state = InitState::Uninitialized;
        Ok(())
    }

    /// Run a retention pass now, returning the number of deleted rows.
    /// Unlike the pass after each write, failures are reported.
    pub fn truncate_now(&self) -> Result<u64, RetentionError> {
        self.retention.truncate(&self.table, &self.config.retention)
    }

    /// Live column names, read from the database.
    pub fn live_columns(&self) -> Result<Vec<String>, SchemaError> {
        self.schema.live_columns(&self.table)
    }

    /// Lock the state once no initialization is in flight.
    fn wait_settled(&self) -> Result<MutexGuard<'_, InitState>, SchemaError> {
        let mut state = self.state.lock().map_err(|_| SchemaError::Poisoned)?;
        while matches!(*state, InitState::Initializing) {
            state = self
                .state_changed
                .wait(state)
                .map_err(|_| SchemaError::Poisoned)?;
        }
        Ok(state)
    }

    fn ensure_ready(&self, record: &LogRecord) -> Result<Arc<TableSchema>, WriteError> {
        {
            let mut state = self.state.lock().map_err(|_| WriteError::Poisoned)?;
            loop {
                if let InitState::Ready(schema) = &*state {
                    return Ok(schema.clone());
                }
                if matches!(*state, InitState::Uninitialized) {
                    *state = InitState::Initializing;
                    break;
                }
                state = self
                    .state_changed
                    .wait(state)
                    .map_err(|_| WriteError::Poisoned)?;
            }
        }

        let result = self.initialize(record);

        let mut state = self.state.lock().map_err(|_| WriteError::Poisoned)?;
        let outcome = match result {
            Ok(schema) => {
                let schema = Arc::new(schema);
                *state = InitState::Ready(schema.clone());
                Ok(schema)
            }
            Err(err) => {
                *state = InitState::Uninitialized;
                Err(err)
            }
        };
        self.state_changed.notify_all();
        outcome
    }

    fn initialize(&self, record: &LogRecord) -> Result<TableSchema, WriteError> {
        let address = self.config.address_column.as_deref();
        let mut extra: Vec<FieldSpec> = self.config.extra_fields.clone();
        {
            let registered = self.registered.lock().map_err(|_| WriteError::Poisoned)?;
            for field in registered.iter() {
                if !extra.iter().any(|f| f.same_column(&field.name)) {
                    extra.push(field.clone());
                }
            }
        }
        for key in record.effective_extra().keys() {
            if tl_common::is_reserved(key, address) {
                continue;
            }
            if !extra.iter().any(|f| f.same_column(key)) {
                extra.push(FieldSpec::text(key.as_str()));
            }
        }

        let schema = self
            .schema
            .ensure_table(&self.table, &extra, &self.config.additional_fields)?;
        info!(
            table = %self.table,
            columns = schema.columns().len(),
            "log sink initialized"
        );
        Ok(schema)
    }
}
