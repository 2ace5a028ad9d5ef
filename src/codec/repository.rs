//! Owned instance store for identity-bearing wire types
//!
//! A `Repository` is created at start-up, handed to whoever needs lookups and
//! cleared at teardown. It enforces the update contract: once an instance with
//! a given key exists, its identity fields may never change.

use super::error::CodecError;
use super::schema::Identity;
use super::wire_type::WireType;
use serde_json::Value;
use std::collections::BTreeMap;

pub struct Repository<T: WireType> {
    items: BTreeMap<String, T>,
}

impl<T: WireType> Repository<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Key of `value` as declared by the schema's Key field
    pub fn key_of(value: &T) -> Result<String, CodecError> {
        let schema = T::schema();
        let key = schema.key_field().ok_or_else(|| {
            CodecError::malformed(format!("{} declares no key field", T::TYPE_ALIAS))
        })?;
        let shape = shape_of(value)?;
        match shape.get(key.name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(CodecError::MissingField {
                type_alias: T::TYPE_ALIAS.to_string(),
                fields: vec![key.name.to_string()],
            }),
        }
    }

    /// Insert a new instance or update an existing one.
    ///
    /// Returns the previous value when the key already existed. An update that
    /// changes any identity field is rejected and leaves the stored value as is.
    pub fn upsert(&mut self, value: T) -> Result<Option<T>, CodecError> {
        let key = Self::key_of(&value)?;
        if let Some(existing) = self.items.get(&key) {
            check_immutable(existing, &value)?;
        }
        Ok(self.items.insert(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.items.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: WireType> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn shape_of<T: WireType>(value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::malformed(format!("{}: {e}", T::TYPE_ALIAS)))
}

fn check_immutable<T: WireType>(existing: &T, updated: &T) -> Result<(), CodecError> {
    let before = shape_of(existing)?;
    let after = shape_of(updated)?;
    for field in T::schema()
        .fields
        .iter()
        .filter(|f| f.identity == Identity::Immutable)
    {
        let old = before.get(field.name).unwrap_or(&Value::Null);
        let new = after.get(field.name).unwrap_or(&Value::Null);
        if old != new {
            return Err(CodecError::ImmutabilityViolation {
                type_alias: T::TYPE_ALIAS.to_string(),
                field: field.name.to_string(),
            });
        }
    }
    Ok(())
}
