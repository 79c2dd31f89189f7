//! Tablelog configuration loading and validation.
//!
//! This crate provides:
//! - Typed sink configuration (`SinkConfig`) and retention policy
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation of table and field names
//! - JSON Schema export for editors and CI checks

pub mod resolve;
pub mod retention;
pub mod sink;
pub mod validate;

pub use resolve::{load_config, resolve_config, resolve_config_path, ConfigSource, ResolvedConfig};
pub use retention::RetentionPolicy;
pub use sink::{config_json_schema, SchemaPolicy, SinkConfig};
pub use validate::{validate_table_name, ConfigError};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TABLELOG_CONFIG";
