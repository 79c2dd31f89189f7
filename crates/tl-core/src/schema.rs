//! Log table schema management.
//!
//! A log table has fixed base columns (`id`, `channel`, `level`, `message`,
//! `time`), an optional client-address column, and one nullable column per
//! dynamic field. [`SchemaManager::ensure_table`] creates the table when it is
//! missing and otherwise converges its dynamic columns toward the desired set
//! by computing a [`SchemaDiff`] once and applying it statement by statement.
//! Running it again with the same field set issues no DDL.

use std::sync::Arc;

use thiserror::Error;
use tl_common::{is_reserved, validate_identifier, FieldNameError, FieldSpec, BASE_COLUMNS};
use tl_config::SchemaPolicy;
use tracing::{debug, info};

use crate::db::{Database, DbError, Dialect};

/// Errors from schema statements. Never retried here.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid field: {0}")]
    InvalidField(#[from] FieldNameError),

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("failed to read columns of {table}: {source}")]
    Introspect {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("schema statement on {table} failed: {source}")]
    Statement {
        table: String,
        statement: String,
        #[source]
        source: DbError,
    },

    #[error("sink state lock poisoned")]
    Poisoned,
}

impl From<SchemaError> for tl_common::Error {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::InvalidField(inner) => inner.into(),
            other => tl_common::Error::Schema(other.to_string()),
        }
    }
}

/// Full table name: the connection prefix followed by the base name.
pub fn table_name(prefix: &str, base_name: &str) -> String {
    format!("{prefix}{base_name}")
}

/// Live columns of a log table after convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Column changes needed to bring a table to the desired field set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub to_add: Vec<FieldSpec>,
    pub to_remove: Vec<String>,
}

impl SchemaDiff {
    /// Compare live columns with the desired fields.
    ///
    /// `protected` columns are never removed. Under [`SchemaPolicy::AddOnly`]
    /// `to_remove` is always empty.
    pub fn compute(
        live: &[String],
        desired: &[FieldSpec],
        protected: &[&str],
        policy: SchemaPolicy,
    ) -> Self {
        let to_add = desired
            .iter()
            .filter(|field| !live.iter().any(|c| field.same_column(c)))
            .cloned()
            .collect();

        let to_remove = match policy {
            SchemaPolicy::AddOnly => Vec::new(),
            SchemaPolicy::AddAndDrop => live
                .iter()
                .filter(|c| !protected.iter().any(|p| p.eq_ignore_ascii_case(c)))
                .filter(|c| !desired.iter().any(|field| field.same_column(c)))
                .cloned()
                .collect(),
        };

        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

fn column_definition(dialect: Dialect, field: &FieldSpec) -> String {
    let column_type = field
        .column_type
        .as_deref()
        .map(str::trim)
        .unwrap_or(dialect.text_type());
    format!("{} {column_type} NULL DEFAULT NULL", dialect.quote_ident(&field.name))
}

/// `CREATE TABLE IF NOT EXISTS` for a log table with the given dynamic fields.
pub fn create_table_sql(dialect: Dialect, table: &str, fields: &[FieldSpec], charset: &str) -> String {
    let q = |name: &str| dialect.quote_ident(name);
    let mut columns = vec![
        dialect.id_column(),
        format!("{} VARCHAR(255)", q("channel")),
        format!("{} INTEGER", q("level")),
        format!("{} {}", q("message"), dialect.message_type()),
        format!("{} {}", q("time"), dialect.time_type()),
    ];
    columns.extend(fields.iter().map(|field| column_definition(dialect, field)));
    columns.extend(dialect.primary_key_clause());

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        q(table),
        columns.join(",\n    ")
    );
    let charset = charset.trim();
    if !charset.is_empty() {
        sql.push(' ');
        sql.push_str(charset);
    }
    sql
}

pub fn add_column_sql(dialect: Dialect, table: &str, field: &FieldSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote_ident(table),
        column_definition(dialect, field)
    )
}

pub fn drop_column_sql(dialect: Dialect, table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        dialect.quote_ident(table),
        dialect.quote_ident(column)
    )
}

/// Creates, converges and drops log tables through a [`Database`].
#[derive(Clone)]
pub struct SchemaManager {
    db: Arc<dyn Database>,
    policy: SchemaPolicy,
    address_column: Option<String>,
}

impl SchemaManager {
    pub fn new(db: Arc<dyn Database>, policy: SchemaPolicy, address_column: Option<String>) -> Self {
        Self {
            db,
            policy,
            address_column,
        }
    }

    pub fn policy(&self) -> SchemaPolicy {
        self.policy
    }

    /// Desired dynamic columns: the address column first, then additional
    /// fields, then extra fields not already covered. Extra names that collide
    /// with a reserved column are skipped.
    pub fn desired_fields(
        &self,
        extra: &[FieldSpec],
        additional: &[FieldSpec],
    ) -> Result<Vec<FieldSpec>, SchemaError> {
        let address = self.address_column.as_deref();
        let mut desired: Vec<FieldSpec> = Vec::new();

        if let Some(column) = address {
            validate_identifier(column)?;
            desired.push(FieldSpec::typed(column, self.db.dialect().address_type()));
        }

        for field in additional.iter().chain(extra) {
            field.validate()?;
            if is_reserved(&field.name, address) {
                debug!(field = %field.name, "skipping field that shadows a base column");
                continue;
            }
            if !desired.iter().any(|d| d.same_column(&field.name)) {
                desired.push(field.clone());
            }
        }
        Ok(desired)
    }

    /// Make sure `table` exists with every desired column.
    ///
    /// Safe to call repeatedly; an unchanged field set is a no-op.
    pub fn ensure_table(
        &self,
        table: &str,
        extra: &[FieldSpec],
        additional: &[FieldSpec],
    ) -> Result<TableSchema, SchemaError> {
        let desired = self.desired_fields(extra, additional)?;
        self.converge(table, &desired, self.policy)
    }

    /// Add `fields` to an existing table without removing anything.
    pub fn add_fields(&self, table: &str, fields: &[FieldSpec]) -> Result<TableSchema, SchemaError> {
        let desired = self.desired_fields(fields, &[])?;
        self.converge(table, &desired, SchemaPolicy::AddOnly)
    }

    fn converge(
        &self,
        table: &str,
        desired: &[FieldSpec],
        policy: SchemaPolicy,
    ) -> Result<TableSchema, SchemaError> {
        validate_identifier(table).map_err(|_| SchemaError::InvalidTable(table.to_string()))?;
        let dialect = self.db.dialect();

        let live = self.live_columns(table)?;
        if live.is_empty() {
            let sql = create_table_sql(dialect, table, desired, self.db.charset_clause());
            self.run(table, sql)?;
            info!(table, dynamic_columns = desired.len(), "created log table");
            return Ok(TableSchema::new(table, self.live_columns(table)?));
        }

        let protected: Vec<&str> = BASE_COLUMNS
            .iter()
            .copied()
            .chain(self.address_column.as_deref())
            .collect();
        let diff = SchemaDiff::compute(&live, desired, &protected, policy);
        if diff.is_empty() {
            debug!(table, "log table schema up to date");
            return Ok(TableSchema::new(table, live));
        }

        for field in &diff.to_add {
            self.run(table, add_column_sql(dialect, table, field))?;
        }
        for column in &diff.to_remove {
            self.run(table, drop_column_sql(dialect, table, column))?;
        }
        info!(
            table,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            %policy,
            "migrated log table"
        );
        Ok(TableSchema::new(table, self.live_columns(table)?))
    }

    /// Drop the table if it exists. Only for explicit teardown.
    pub fn drop_table(&self, table: &str) -> Result<(), SchemaError> {
        validate_identifier(table).map_err(|_| SchemaError::InvalidTable(table.to_string()))?;
        let sql = format!("DROP TABLE IF EXISTS {}", self.db.dialect().quote_ident(table));
        self.run(table, sql)?;
        info!(table, "dropped log table");
        Ok(())
    }

    pub fn live_columns(&self, table: &str) -> Result<Vec<String>, SchemaError> {
        self.db
            .table_columns(table)
            .map_err(|source| SchemaError::Introspect {
                table: table.to_string(),
                source,
            })
    }

    fn run(&self, table: &str, statement: String) -> Result<(), SchemaError> {
        debug!(table, %statement, "executing schema statement");
        match self.db.execute(&statement) {
            Ok(_) => Ok(()),
            Err(source) => Err(SchemaError::Statement {
                table: table.to_string(),
                statement,
                source,
            }),
        }
    }
}
