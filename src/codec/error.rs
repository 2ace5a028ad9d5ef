//! Codec and registry error types
//!
//! Every `CodecError` is recoverable: malformed or unrecognised inbound data is
//! logged and dropped by the dispatch loop. `RegistryError` is a start-up
//! configuration error and is never produced while the loop is running.

use thiserror::Error;

/// A single validation failure found while assembling or checking a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    pub fn new<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Errors produced while decoding, encoding or updating typed wire values
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    #[error("Unknown type alias: {type_alias}")]
    UnknownType { type_alias: String },

    #[error("Missing required field(s) for {type_alias}: {}", fields.join(", "))]
    MissingField {
        type_alias: String,
        fields: Vec<String>,
    },

    #[error("Unknown enum symbol '{symbol}' for {type_alias}.{field}")]
    UnknownEnumSymbol {
        type_alias: String,
        field: String,
        symbol: String,
    },

    #[error("Wrong type for {type_alias}.{field}: expected {expected}")]
    WrongFieldType {
        type_alias: String,
        field: String,
        expected: &'static str,
    },

    #[error("Bad format for {type_alias}.{field}: {reason}")]
    BadFormat {
        type_alias: String,
        field: String,
        reason: String,
    },

    #[error("Immutable field {type_alias}.{field} cannot change on update")]
    ImmutabilityViolation { type_alias: String, field: String },

    #[error("Invalid {type_alias}: {}", violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "))]
    Invalid {
        type_alias: String,
        violations: Vec<Violation>,
    },

    #[error("Malformed payload: {reason}")]
    Malformed { reason: String },
}

impl CodecError {
    /// Fold a non-empty list of format violations into one error
    pub fn from_violations(type_alias: &str, mut violations: Vec<Violation>) -> Self {
        if violations.len() == 1 {
            let v = violations.remove(0);
            CodecError::BadFormat {
                type_alias: type_alias.to_string(),
                field: v.field,
                reason: v.reason,
            }
        } else {
            CodecError::Invalid {
                type_alias: type_alias.to_string(),
                violations,
            }
        }
    }

    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
        }
    }

    /// Type alias this error refers to, if any
    pub fn type_alias(&self) -> Option<&str> {
        match self {
            CodecError::UnknownType { type_alias }
            | CodecError::MissingField { type_alias, .. }
            | CodecError::UnknownEnumSymbol { type_alias, .. }
            | CodecError::WrongFieldType { type_alias, .. }
            | CodecError::BadFormat { type_alias, .. }
            | CodecError::ImmutabilityViolation { type_alias, .. }
            | CodecError::Invalid { type_alias, .. } => Some(type_alias),
            CodecError::Malformed { .. } => None,
        }
    }
}

/// Registration errors. These indicate a construction bug and are fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Type alias already registered: {0}")]
    DuplicateAlias(String),

    #[error("Enum {table}: symbol '{symbol}' maps to more than one local name")]
    DuplicateSymbol { table: &'static str, symbol: String },

    #[error("Enum {table}: local name '{local}' maps to more than one symbol")]
    DuplicateLocalName { table: &'static str, local: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_violation_becomes_bad_format() {
        let err = CodecError::from_violations("x.y.100", vec![Violation::new("Foo", "bad")]);
        assert!(matches!(err, CodecError::BadFormat { ref field, .. } if field == "Foo"));
    }

    #[test]
    fn test_multiple_violations_become_invalid() {
        let err = CodecError::from_violations(
            "x.y.100",
            vec![Violation::new("Foo", "bad"), Violation::new("Bar", "worse")],
        );
        match err {
            CodecError::Invalid { violations, .. } => assert_eq!(violations.len(), 2),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_display_names_every_field() {
        let err = CodecError::MissingField {
            type_alias: "gs.pwr.100".to_string(),
            fields: vec!["Power".to_string(), "Other".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("Power"));
        assert!(text.contains("Other"));
    }

    #[test]
    fn test_type_alias_accessor() {
        let err = CodecError::UnknownType {
            type_alias: "nope.000".to_string(),
        };
        assert_eq!(err.type_alias(), Some("nope.000"));
        assert_eq!(CodecError::malformed("x").type_alias(), None);
    }
}
