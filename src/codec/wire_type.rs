//! The contract every typed wire value implements

use super::error::{CodecError, Violation};
use super::schema::{decode_fields, encode_fields, Schema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// A strongly-typed value with exactly one wire schema.
///
/// Implementors only supply the alias, the static schema and, where the type
/// has cross-field axioms, [`WireType::validate`]. Conversion in both
/// directions is provided by the generic engine.
pub trait WireType: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + 'static {
    const TYPE_ALIAS: &'static str;

    fn schema() -> &'static Schema;

    /// Cross-field axioms the descriptor table cannot express
    fn validate(&self) -> Vec<Violation> {
        Vec::new()
    }

    fn decode(raw: &Value) -> Result<Self, CodecError> {
        let shape = decode_fields(Self::schema(), raw)?;
        let value: Self = serde_json::from_value(Value::Object(shape)).map_err(|e| {
            CodecError::malformed(format!("{}: {e}", Self::TYPE_ALIAS))
        })?;
        value.checked()
    }

    fn decode_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(format!("{}: {e}", Self::TYPE_ALIAS)))?;
        Self::decode(&raw)
    }

    fn encode(&self) -> Result<Map<String, Value>, CodecError> {
        let violations = self.validate();
        if !violations.is_empty() {
            return Err(CodecError::from_violations(Self::TYPE_ALIAS, violations));
        }
        let shape = serde_json::to_value(self)
            .map_err(|e| CodecError::malformed(format!("{}: {e}", Self::TYPE_ALIAS)))?;
        encode_fields(Self::schema(), &shape)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let wire = self.encode()?;
        serde_json::to_vec(&wire)
            .map_err(|e| CodecError::malformed(format!("{}: {e}", Self::TYPE_ALIAS)))
    }

    #[doc(hidden)]
    fn checked(self) -> Result<Self, CodecError> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(self)
        } else {
            Err(CodecError::from_violations(Self::TYPE_ALIAS, violations))
        }
    }
}

/// Violation when parallel lists differ in length
pub fn same_length(field: &str, lens: &[usize]) -> Option<Violation> {
    match lens.first() {
        Some(first) if lens.iter().any(|l| l != first) => Some(Violation::new(
            field,
            format!("parallel lists must have equal length, got {lens:?}"),
        )),
        _ => None,
    }
}
