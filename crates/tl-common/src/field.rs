//! Column field specifications and identifier rules.
//!
//! Field names end up as column identifiers in DDL and insert statements, so
//! every name is checked against a conservative identifier grammar before it
//! reaches SQL. Type hints are checked against a grammar that admits column
//! type expressions such as `VARCHAR(64)` or `INTEGER UNSIGNED` and nothing
//! that could terminate a statement.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::BASE_COLUMNS;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("identifier pattern is valid")
});

static TYPE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ,()]*$").expect("type hint pattern is valid")
});

/// Errors raised when a field name or type hint is not usable as SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldNameError {
    #[error("'{0}' is not a valid column identifier")]
    InvalidIdentifier(String),

    #[error("'{name}' collides with reserved column '{reserved}'")]
    Reserved { name: String, reserved: String },

    #[error("invalid column type '{column_type}' for field '{name}'")]
    InvalidType { name: String, column_type: String },
}

/// Check that `name` can be used as a column identifier.
pub fn validate_identifier(name: &str) -> Result<(), FieldNameError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(FieldNameError::InvalidIdentifier(name.to_string()))
    }
}

/// Check that a column type expression contains no statement syntax.
pub fn validate_type_hint(name: &str, column_type: &str) -> Result<(), FieldNameError> {
    if TYPE_HINT.is_match(column_type.trim()) {
        Ok(())
    } else {
        Err(FieldNameError::InvalidType {
            name: name.to_string(),
            column_type: column_type.to_string(),
        })
    }
}

/// Whether `name` collides with a base column or the address column.
///
/// Both supported dialects fold identifier case, so the comparison does too.
pub fn is_reserved(name: &str, address_column: Option<&str>) -> bool {
    BASE_COLUMNS
        .iter()
        .copied()
        .chain(address_column)
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// A dynamically added column: a name plus an optional column type.
///
/// Without a type hint the column is created as nullable text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

impl FieldSpec {
    /// A nullable text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: None,
        }
    }

    /// A field with an explicit column type expression.
    pub fn typed(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: Some(column_type.into()),
        }
    }

    /// Validate the name and, when present, the type hint.
    pub fn validate(&self) -> Result<(), FieldNameError> {
        validate_identifier(&self.name)?;
        if let Some(column_type) = &self.column_type {
            validate_type_hint(&self.name, column_type)?;
        }
        Ok(())
    }

    /// Validate, additionally rejecting reserved names.
    pub fn validate_unreserved(&self, address_column: Option<&str>) -> Result<(), FieldNameError> {
        self.validate()?;
        if is_reserved(&self.name, address_column) {
            return Err(FieldNameError::Reserved {
                name: self.name.clone(),
                reserved: self.name.to_ascii_lowercase(),
            });
        }
        Ok(())
    }

    /// Whether two specs name the same column.
    pub fn same_column(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::text(name)
    }
}

impl From<String> for FieldSpec {
    fn from(name: String) -> Self {
        FieldSpec::text(name)
    }
}

// Config files may list a field as a bare name or as `{ name, type }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpecRepr {
    Name(String),
    Detailed {
        name: String,
        #[serde(rename = "type", default)]
        column_type: Option<String>,
    },
}

impl<'de> Deserialize<'de> for FieldSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match FieldSpecRepr::deserialize(deserializer)? {
            FieldSpecRepr::Name(name) => FieldSpec::text(name),
            FieldSpecRepr::Detailed { name, column_type } => FieldSpec { name, column_type },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_identifiers() {
        for name in ["user_id", "_private", "Session2", "a"] {
            assert!(validate_identifier(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_sql_fragments() {
        for name in ["", "1abc", "user id", "x;DROP TABLE logs", "a`b", "a\"b", "ü"] {
            assert!(validate_identifier(name).is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn rejects_overlong_identifiers() {
        let name = "a".repeat(65);
        assert!(validate_identifier(&name).is_err());
        assert!(validate_identifier(&name[..64]).is_ok());
    }

    #[test]
    fn type_hints() {
        assert!(validate_type_hint("f", "VARCHAR(64)").is_ok());
        assert!(validate_type_hint("f", "DECIMAL(10, 2)").is_ok());
        assert!(validate_type_hint("f", "INTEGER UNSIGNED").is_ok());
        assert!(validate_type_hint("f", "TEXT; DROP TABLE x").is_err());
        assert!(validate_type_hint("f", "TEXT DEFAULT 'x'").is_err());
        assert!(validate_type_hint("f", "TEXT -- comment").is_err());
    }

    #[test]
    fn reserved_is_case_insensitive() {
        assert!(is_reserved("Message", None));
        assert!(is_reserved("ID", None));
        assert!(!is_reserved("address", None));
        assert!(is_reserved("Address", Some("address")));
    }

    #[test]
    fn validate_unreserved_rejects_base_columns() {
        let err = FieldSpec::text("time").validate_unreserved(None).unwrap_err();
        assert!(matches!(err, FieldNameError::Reserved { .. }));
        assert!(FieldSpec::text("ip").validate_unreserved(None).is_ok());
        assert!(FieldSpec::text("ip").validate_unreserved(Some("ip")).is_err());
    }

    #[test]
    fn deserializes_bare_and_detailed() {
        let specs: Vec<FieldSpec> =
            serde_json::from_str(r#"["user", {"name": "size", "type": "INTEGER"}, {"name": "note"}]"#)
                .unwrap();
        assert_eq!(specs[0], FieldSpec::text("user"));
        assert_eq!(specs[1], FieldSpec::typed("size", "INTEGER"));
        assert_eq!(specs[2], FieldSpec::text("note"));
    }

    #[test]
    fn serializes_type_under_type_key() {
        let json = serde_json::to_value(FieldSpec::typed("size", "INTEGER")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "size", "type": "INTEGER"}));
        let json = serde_json::to_value(FieldSpec::text("user")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "user"}));
    }

    proptest! {
        #[test]
        fn valid_identifiers_never_contain_quote_or_space(name in "\\PC{0,80}") {
            if validate_identifier(&name).is_ok() {
                prop_assert!(!name.contains(['"', '`', '\'', ' ', ';']));
                prop_assert!(name.len() <= 64);
            }
        }
    }
}
