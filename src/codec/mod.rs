//! Type Registry & Codec
//!
//! Bidirectional mapping between typed in-process values and their wire
//! representation: a JSON object carrying a `TypeAlias` plus named fields.
//!
//! - [`schema`] - the generic descriptor-driven decode/encode engine
//! - [`symbols`] - opaque enum symbol tables
//! - [`format`] - per-field format checks
//! - [`wire_type`] - the [`WireType`] contract implemented by each wire type
//! - [`registry`] - alias -> decode routine, owned and append-only
//! - [`repository`] - owned instance store enforcing identity immutability

pub mod error;
pub mod format;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod symbols;
pub mod wire_type;

pub use error::{CodecError, RegistryError, Violation};
pub use format::Format;
pub use registry::{EncodeError, TypeRegistry, WirePayload};
pub use repository::Repository;
pub use schema::{
    DefaultValue, FieldDescriptor, FieldKind, Identity, Presence, Schema, TYPE_ALIAS_KEY,
};
pub use symbols::{GtEnum, SymbolTable};
pub use wire_type::{same_length, WireType};
