//! Tablelog common types and errors.
//!
//! This crate provides the vocabulary shared by the config and core crates:
//! - Log records and the severity ladder
//! - Column field specifications and identifier rules
//! - The unified error type with stable codes

pub mod error;
pub mod field;
pub mod level;
pub mod record;

pub use error::{Error, Result};
pub use field::{is_reserved, validate_identifier, validate_type_hint, FieldNameError, FieldSpec};
pub use level::Level;
pub use record::{FormattedParts, LogRecord};

/// Base columns every log table carries, in creation order.
pub const BASE_COLUMNS: [&str; 5] = ["id", "channel", "level", "message", "time"];
