//! Type registry: type alias -> decode routine
//!
//! The registry is an owned value built once at start-up. Entries are
//! append-only; registering the same alias twice is a configuration error.

use super::error::{CodecError, RegistryError};
use super::schema::{Schema, TYPE_ALIAS_KEY};
use super::wire_type::WireType;
use crate::error::UsageError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Debug;

/// An application's set of payloads: one enum over its wire types
pub trait WirePayload: Clone + Debug + Send + 'static {
    fn type_alias(&self) -> &'static str;

    fn encode(&self) -> Result<Map<String, Value>, CodecError>;
}

type DecodeFn<P> = fn(&Value) -> Result<P, CodecError>;

struct Entry<P> {
    schema: &'static Schema,
    decode: DecodeFn<P>,
}

fn decode_into<T, P>(raw: &Value) -> Result<P, CodecError>
where
    T: WireType,
    P: From<T>,
{
    T::decode(raw).map(P::from)
}

pub struct TypeRegistry<P> {
    entries: HashMap<&'static str, Entry<P>>,
}

impl<P: WirePayload> TypeRegistry<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `T` as a variant of `P`.
    ///
    /// Fails if the alias is taken or any enum table reachable from the schema
    /// is not a bijection.
    pub fn register<T>(&mut self) -> Result<(), RegistryError>
    where
        T: WireType,
        P: From<T>,
    {
        if self.entries.contains_key(T::TYPE_ALIAS) {
            return Err(RegistryError::DuplicateAlias(T::TYPE_ALIAS.to_string()));
        }
        for table in T::schema().symbol_tables() {
            table.validate()?;
        }
        self.entries.insert(
            T::TYPE_ALIAS,
            Entry {
                schema: T::schema(),
                decode: decode_into::<T, P>,
            },
        );
        Ok(())
    }

    pub fn contains(&self, type_alias: &str) -> bool {
        self.entries.contains_key(type_alias)
    }

    pub fn schema(&self, type_alias: &str) -> Option<&'static Schema> {
        self.entries.get(type_alias).map(|e| e.schema)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn decode(&self, type_alias: &str, raw: &Value) -> Result<P, CodecError> {
        let entry = self
            .entries
            .get(type_alias)
            .ok_or_else(|| CodecError::UnknownType {
                type_alias: type_alias.to_string(),
            })?;
        (entry.decode)(raw)
    }

    /// Decode an object whose alias is carried in its own `TypeAlias` key
    pub fn decode_value(&self, raw: &Value) -> Result<P, CodecError> {
        let alias = raw
            .get(TYPE_ALIAS_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::malformed("payload has no TypeAlias"))?;
        self.decode(alias, raw)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<P, CodecError> {
        let raw: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;
        self.decode_value(&raw)
    }

    /// Encode a payload. Encoding a type that was never registered is a
    /// usage error rather than a codec error.
    pub fn encode(&self, payload: &P) -> Result<Map<String, Value>, EncodeError> {
        let alias = payload.type_alias();
        if !self.contains(alias) {
            return Err(EncodeError::Usage(UsageError::UnregisteredType(
                alias.to_string(),
            )));
        }
        payload.encode().map_err(EncodeError::Codec)
    }
}

impl<P: WirePayload> Default for TypeRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Declare an application payload enum over a set of wire types.
///
/// Generates the enum, a `From` impl per variant, [`WirePayload`] and a
/// `register_all` helper that registers every variant with a registry.
#[macro_export]
macro_rules! wire_payloads {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident($ty:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $($variant($ty)),+
        }

        $(
            impl From<$ty> for $name {
                fn from(value: $ty) -> Self {
                    $name::$variant(value)
                }
            }
        )+

        impl $crate::codec::WirePayload for $name {
            fn type_alias(&self) -> &'static str {
                match self {
                    $($name::$variant(_) => <$ty as $crate::codec::WireType>::TYPE_ALIAS),+
                }
            }

            fn encode(
                &self,
            ) -> Result<serde_json::Map<String, serde_json::Value>, $crate::codec::CodecError> {
                match self {
                    $($name::$variant(v) => $crate::codec::WireType::encode(v)),+
                }
            }
        }

        impl $name {
            pub fn register_all(
                registry: &mut $crate::codec::TypeRegistry<$name>,
            ) -> Result<(), $crate::codec::RegistryError> {
                $(registry.register::<$ty>()?;)+
                Ok(())
            }

            pub fn registry() -> Result<$crate::codec::TypeRegistry<$name>, $crate::codec::RegistryError> {
                let mut registry = $crate::codec::TypeRegistry::new();
                Self::register_all(&mut registry)?;
                Ok(registry)
            }
        }
    };
}
