//! Semantic validation of sink configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;
use tl_common::{validate_identifier, FieldNameError, FieldSpec, BASE_COLUMNS};

use crate::SinkConfig;

/// Configuration errors. Raised at sink construction and always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("failed to parse {format} config: {message}")]
    Parse { format: String, message: String },

    #[error("invalid table name '{0}'")]
    InvalidTable(String),

    #[error("invalid table prefix '{0}'")]
    InvalidPrefix(String),

    #[error("invalid field: {0}")]
    InvalidField(#[from] FieldNameError),

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
}

impl From<ConfigError> for tl_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidField(inner) => inner.into(),
            ConfigError::Io { source, .. } => tl_common::Error::Io(source),
            other => tl_common::Error::Config(other.to_string()),
        }
    }
}

/// Check a full (prefixed) table name.
pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    validate_identifier(name).map_err(|_| ConfigError::InvalidTable(name.to_string()))
}

/// A prefix may be empty; otherwise it must be identifier characters only.
pub fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ConfigError::InvalidPrefix(prefix.to_string()))
    }
}

pub(crate) fn validate_config(config: &SinkConfig) -> Result<(), ConfigError> {
    validate_table_name(&config.table)?;
    if let Some(prefix) = &config.prefix_override {
        validate_prefix(prefix)?;
    }

    let address = config.address_column.as_deref();
    if let Some(column) = address {
        validate_identifier(column)?;
        if BASE_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Err(FieldNameError::Reserved {
                name: column.to_string(),
                reserved: column.to_ascii_lowercase(),
            }
            .into());
        }
    }

    check_field_set(&config.additional_fields, address)?;
    check_field_set(&config.extra_fields, address)?;
    Ok(())
}

fn check_field_set(fields: &[FieldSpec], address: Option<&str>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for field in fields {
        field.validate_unreserved(address)?;
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateField(field.name.clone()));
        }
    }
    Ok(())
}
