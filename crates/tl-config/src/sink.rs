//! Sink configuration surface.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tl_common::{FieldSpec, Level};

use crate::retention::{RetentionPolicy, RetentionSpec};
use crate::validate::{validate_config, ConfigError};

/// How an existing table is reconciled with the declared field set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Only add missing columns.
    #[default]
    AddOnly,
    /// Add missing columns and drop dynamic columns no longer declared.
    /// Data in dropped columns is lost.
    AddAndDrop,
}

impl std::fmt::Display for SchemaPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaPolicy::AddOnly => write!(f, "add_only"),
            SchemaPolicy::AddAndDrop => write!(f, "add_and_drop"),
        }
    }
}

/// Configuration of one log table sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Base table name; the database prefix is prepended.
    #[serde(default = "default_table")]
    pub table: String,

    /// Overrides the prefix reported by the database connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_override: Option<String>,

    /// Statically declared columns, filled with NULL when a record lacks them.
    #[serde(default)]
    pub additional_fields: Vec<FieldSpec>,

    /// Expected extra-field names, created up front instead of being
    /// inferred from the first record.
    #[serde(default)]
    pub extra_fields: Vec<FieldSpec>,

    /// Column receiving the resolved client address; disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_column: Option<String>,

    #[serde(default)]
    #[schemars(with = "RetentionSpec")]
    pub retention: RetentionPolicy,

    #[serde(default)]
    pub schema_policy: SchemaPolicy,

    /// Records below this level are not handled.
    #[serde(default)]
    pub min_level: Level,

    /// Whether handled records continue to later handlers.
    #[serde(default = "default_bubble")]
    pub bubble: bool,
}

fn default_table() -> String {
    "logs".to_string()
}

fn default_bubble() -> bool {
    true
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::new(default_table())
    }
}

impl SinkConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            prefix_override: None,
            additional_fields: Vec::new(),
            extra_fields: Vec::new(),
            address_column: None,
            retention: RetentionPolicy::disabled(),
            schema_policy: SchemaPolicy::AddOnly,
            min_level: Level::Debug,
            bubble: true,
        }
    }

    pub fn with_prefix_override(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_override = Some(prefix.into());
        self
    }

    pub fn with_additional_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.additional_fields = fields;
        self
    }

    pub fn with_extra_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.extra_fields = fields;
        self
    }

    pub fn with_address_column(mut self, column: impl Into<String>) -> Self {
        self.address_column = Some(column.into());
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_bubble(mut self, bubble: bool) -> Self {
        self.bubble = bubble;
        self
    }

    /// Check names, prefixes and field sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(self)
    }

    /// Full table name given the connection's prefix, honoring the override.
    pub fn full_table_name(&self, connection_prefix: &str) -> String {
        let prefix = self.prefix_override.as_deref().unwrap_or(connection_prefix);
        format!("{prefix}{}", self.table)
    }
}

/// JSON Schema describing config files.
pub fn config_json_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(SinkConfig)).unwrap_or_default()
}
