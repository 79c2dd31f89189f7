//! Error types for Tablelog.

use thiserror::Error;

/// Result type alias for Tablelog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Tablelog.
///
/// Module-level errors in the config and core crates convert into this type
/// so callers such as the CLI can report a stable code.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid field name: {0}")]
    InvalidField(String),

    // Schema errors (20-29)
    #[error("schema error: {0}")]
    Schema(String),

    // Write errors (30-39)
    #[error("write error: {0}")]
    Write(String),

    #[error("unknown column '{column}' for table {table}")]
    UnknownColumn { table: String, column: String },

    // Retention errors (40-49)
    #[error("retention error: {0}")]
    Retention(String),

    // Database errors (50-59)
    #[error("database error: {0}")]
    Database(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidField(_) => 11,
            Error::Schema(_) => 20,
            Error::Write(_) => 30,
            Error::UnknownColumn { .. } => 31,
            Error::Retention(_) => 40,
            Error::Database(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }
}

impl From<crate::field::FieldNameError> for Error {
    fn from(err: crate::field::FieldNameError) -> Self {
        Error::InvalidField(err.to_string())
    }
}
