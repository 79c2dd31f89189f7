//! Tablelog core: a log-record sink persisting structured entries into a
//! relational table.
//!
//! - [`schema`]: create and converge the log table's columns
//! - [`writer`]: flatten records into rows and insert them
//! - [`retention`]: keep the table under a row ceiling
//! - [`address`]: pick a client address out of request origin hints
//! - [`db`]: the database-access seam, with a SQLite implementation in [`sqlite`]

pub mod address;
pub mod db;
pub mod exit_codes;
pub mod logging;
pub mod retention;
pub mod schema;
pub mod sqlite;
pub mod writer;

pub use address::{resolve_client_address, validate_address, RequestOrigin};
pub use db::{Database, DbError, Dialect, Row, SqlValue};
pub use retention::{RetentionEnforcer, RetentionError, RETENTION_DELETE_CAP};
pub use schema::{table_name, SchemaDiff, SchemaError, SchemaManager, TableSchema};
pub use sqlite::SqliteDatabase;
pub use writer::{LogSink, Propagation, WriteError};

pub use tl_common::{FieldSpec, Level, LogRecord};
pub use tl_config::{RetentionPolicy, SchemaPolicy, SinkConfig};
