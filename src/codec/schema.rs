//! Generic schema-validation engine
//!
//! Every wire type is described by a static [`Schema`]: a type alias plus a
//! table of [`FieldDescriptor`]s. One pair of functions, [`decode_fields`] and
//! [`encode_fields`], turns raw wire JSON into the serde shape of the typed
//! value and back, so individual types never hand-write conversion code.
//!
//! Field names in a descriptor are the serde names of the Rust struct. The wire
//! key differs only for scalar enums, which travel as `<Name>GtEnumSymbol`.

use super::error::{CodecError, Violation};
use super::format::Format;
use super::symbols::SymbolTable;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Key carrying the type alias in every wire object
pub const TYPE_ALIAS_KEY: &str = "TypeAlias";

const ENUM_SUFFIX: &str = "GtEnumSymbol";

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    StrList,
    IntList,
    Enum(&'static SymbolTable),
    EnumList(&'static SymbolTable),
    Object(&'static Schema),
    ObjectList(&'static Schema),
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::Str | FieldKind::Enum(_) => "string",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Bool => "boolean",
            FieldKind::StrList | FieldKind::EnumList(_) => "list of strings",
            FieldKind::IntList => "list of integers",
            FieldKind::Object(_) => "object",
            FieldKind::ObjectList(_) => "list of objects",
        }
    }
}

/// Value substituted for an absent optional field
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(&'static str),
    EmptyList,
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Int(n) => Value::from(n),
            DefaultValue::Float(x) => Value::from(x),
            DefaultValue::Bool(b) => Value::Bool(b),
            DefaultValue::Str(s) => Value::String(s.to_string()),
            DefaultValue::EmptyList => Value::Array(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Presence {
    Required,
    /// Absent maps to `None` on the typed value
    Optional,
    Defaulted(DefaultValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    None,
    /// Identifies an instance in a repository
    Key,
    /// Must not change across an update of the same instance
    Immutable,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
    pub identity: Identity,
    pub format: Option<Format>,
}

impl FieldDescriptor {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
            identity: Identity::None,
            format: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Optional,
            identity: Identity::None,
            format: None,
        }
    }

    pub const fn defaulted(name: &'static str, kind: FieldKind, default: DefaultValue) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Defaulted(default),
            identity: Identity::None,
            format: None,
        }
    }

    pub const fn with_format(self, format: Format) -> Self {
        Self {
            format: Some(format),
            ..self
        }
    }

    pub const fn key(self) -> Self {
        Self {
            identity: Identity::Key,
            ..self
        }
    }

    pub const fn immutable(self) -> Self {
        Self {
            identity: Identity::Immutable,
            ..self
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }

    pub fn wire_key(&self) -> Cow<'static, str> {
        match self.kind {
            FieldKind::Enum(_) => Cow::Owned(format!("{}{ENUM_SUFFIX}", self.name)),
            _ => Cow::Borrowed(self.name),
        }
    }
}

#[derive(Debug)]
pub struct Schema {
    pub type_alias: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl Schema {
    pub const fn new(type_alias: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { type_alias, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.identity == Identity::Key)
    }

    pub fn immutable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.identity != Identity::None)
    }

    /// Every symbol table reachable from this schema, nested objects included
    pub fn symbol_tables(&self) -> Vec<&'static SymbolTable> {
        let mut tables = Vec::new();
        for field in self.fields {
            match field.kind {
                FieldKind::Enum(t) | FieldKind::EnumList(t) => tables.push(t),
                FieldKind::Object(s) | FieldKind::ObjectList(s) => {
                    tables.extend(s.symbol_tables())
                }
                _ => {}
            }
        }
        tables
    }
}

/// Assemble the serde shape of a typed value from its wire object.
///
/// Absent required fields are all reported together. Optional fields that are
/// absent or `null` get their default, or are left out so serde yields `None`.
pub fn decode_fields(schema: &Schema, raw: &Value) -> Result<Map<String, Value>, CodecError> {
    let obj = raw.as_object().ok_or_else(|| {
        CodecError::malformed(format!("{} payload is not an object", schema.type_alias))
    })?;

    if let Some(alias) = obj.get(TYPE_ALIAS_KEY) {
        if alias.as_str() != Some(schema.type_alias) {
            return Err(CodecError::BadFormat {
                type_alias: schema.type_alias.to_string(),
                field: TYPE_ALIAS_KEY.to_string(),
                reason: format!("expected {}, got {alias}", schema.type_alias),
            });
        }
    }

    let present = |field: &FieldDescriptor| {
        obj.get(field.wire_key().as_ref())
            .filter(|v| !v.is_null())
            .cloned()
    };

    let missing: Vec<String> = schema
        .fields
        .iter()
        .filter(|f| f.is_required() && present(*f).is_none())
        .map(|f| f.name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CodecError::MissingField {
            type_alias: schema.type_alias.to_string(),
            fields: missing,
        });
    }

    let mut out = Map::new();
    let mut violations = Vec::new();
    for field in schema.fields {
        match present(field) {
            Some(value) => {
                let local = decode_value(schema, field, &value)?;
                if let Some(format) = field.format {
                    check_format(field, format, &local, &mut violations);
                }
                out.insert(field.name.to_string(), local);
            }
            None => {
                if let Presence::Defaulted(default) = field.presence {
                    out.insert(field.name.to_string(), default.to_value());
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(out)
    } else {
        Err(CodecError::from_violations(schema.type_alias, violations))
    }
}

/// Produce the wire object for the serde shape of a typed value.
///
/// Fields holding no value are omitted entirely; `null` is never emitted.
pub fn encode_fields(schema: &Schema, shape: &Value) -> Result<Map<String, Value>, CodecError> {
    let obj = shape.as_object().ok_or_else(|| {
        CodecError::malformed(format!("{} did not serialize to an object", schema.type_alias))
    })?;

    let mut out = Map::new();
    out.insert(
        TYPE_ALIAS_KEY.to_string(),
        Value::String(schema.type_alias.to_string()),
    );

    let mut violations = Vec::new();
    for field in schema.fields {
        let Some(value) = obj.get(field.name).filter(|v| !v.is_null()) else {
            if field.is_required() {
                return Err(CodecError::MissingField {
                    type_alias: schema.type_alias.to_string(),
                    fields: vec![field.name.to_string()],
                });
            }
            continue;
        };
        if let Some(format) = field.format {
            check_format(field, format, value, &mut violations);
        }
        out.insert(
            field.wire_key().into_owned(),
            encode_value(schema, field, value)?,
        );
    }

    if violations.is_empty() {
        Ok(out)
    } else {
        Err(CodecError::from_violations(schema.type_alias, violations))
    }
}

fn check_format(field: &FieldDescriptor, format: Format, value: &Value, out: &mut Vec<Violation>) {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for item in items {
        if let Err(reason) = format.check(item) {
            out.push(Violation::new(field.name, reason));
        }
    }
}

fn wrong_type(schema: &Schema, field: &FieldDescriptor) -> CodecError {
    CodecError::WrongFieldType {
        type_alias: schema.type_alias.to_string(),
        field: field.name.to_string(),
        expected: field.kind.expected(),
    }
}

fn array<'a>(
    schema: &Schema,
    field: &FieldDescriptor,
    value: &'a Value,
) -> Result<&'a Vec<Value>, CodecError> {
    value.as_array().ok_or_else(|| wrong_type(schema, field))
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

fn decode_value(schema: &Schema, field: &FieldDescriptor, value: &Value) -> Result<Value, CodecError> {
    let ok = |valid: bool| {
        if valid {
            Ok(value.clone())
        } else {
            Err(wrong_type(schema, field))
        }
    };
    match field.kind {
        FieldKind::Str => ok(value.is_string()),
        FieldKind::Int => ok(is_integer(value)),
        FieldKind::Float => ok(value.is_number()),
        FieldKind::Bool => ok(value.is_boolean()),
        FieldKind::StrList => ok(array(schema, field, value)?.iter().all(Value::is_string)),
        FieldKind::IntList => ok(array(schema, field, value)?.iter().all(is_integer)),
        FieldKind::Enum(table) => decode_symbol(schema, field, table, value),
        FieldKind::EnumList(table) => array(schema, field, value)?
            .iter()
            .map(|item| decode_symbol(schema, field, table, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        FieldKind::Object(inner) => {
            if !value.is_object() {
                return Err(wrong_type(schema, field));
            }
            decode_fields(inner, value).map(Value::Object)
        }
        FieldKind::ObjectList(inner) => array(schema, field, value)?
            .iter()
            .map(|item| {
                if item.is_object() {
                    decode_fields(inner, item).map(Value::Object)
                } else {
                    Err(wrong_type(schema, field))
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

fn decode_symbol(
    schema: &Schema,
    field: &FieldDescriptor,
    table: &SymbolTable,
    value: &Value,
) -> Result<Value, CodecError> {
    let symbol = value.as_str().ok_or_else(|| wrong_type(schema, field))?;
    table
        .local_for(symbol)
        .map(|local| Value::String(local.to_string()))
        .ok_or_else(|| CodecError::UnknownEnumSymbol {
            type_alias: schema.type_alias.to_string(),
            field: field.name.to_string(),
            symbol: symbol.to_string(),
        })
}

fn encode_value(schema: &Schema, field: &FieldDescriptor, value: &Value) -> Result<Value, CodecError> {
    match field.kind {
        FieldKind::Enum(table) => encode_symbol(schema, field, table, value),
        FieldKind::EnumList(table) => array(schema, field, value)?
            .iter()
            .map(|item| encode_symbol(schema, field, table, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        FieldKind::Object(inner) => encode_fields(inner, value).map(Value::Object),
        FieldKind::ObjectList(inner) => array(schema, field, value)?
            .iter()
            .map(|item| encode_fields(inner, item).map(Value::Object))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

fn encode_symbol(
    schema: &Schema,
    field: &FieldDescriptor,
    table: &SymbolTable,
    value: &Value,
) -> Result<Value, CodecError> {
    let local = value.as_str().ok_or_else(|| wrong_type(schema, field))?;
    table
        .symbol_for(local)
        .map(|symbol| Value::String(symbol.to_string()))
        .ok_or_else(|| CodecError::UnknownEnumSymbol {
            type_alias: schema.type_alias.to_string(),
            field: field.name.to_string(),
            symbol: local.to_string(),
        })
}
