//! Flat Type Metadata
//!
//! Compiler-free descriptions of messages, enums and APIs as a fetcher
//! returns them: names are fully qualified, references to other types are
//! type URLs, and option values are packed into Any envelopes.

use serde::{Deserialize, Serialize};

use crate::descriptor::{ScalarType, Syntax};
use crate::dynamic::{DynamicMessage, Message, Value};
use crate::error::{ReflectError, Result};
use crate::wellknown;

/// Default domain for type URLs
pub const DEFAULT_BASE_URL: &str = "type.googleapis.com/";

/// Type URL paired with encoded message bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyEnvelope {
    pub type_url: String,
    #[serde(default)]
    pub value: Vec<u8>,
}

impl AnyEnvelope {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Fully-qualified type name: everything after the last `/`
    pub fn type_name(&self) -> &str {
        type_name_of(&self.type_url)
    }

    /// Pack a single option value: scalars and enum numbers travel in the
    /// matching `google.protobuf.*Value` wrapper, messages as themselves.
    pub fn wrap(value: &Value) -> Result<Self> {
        let wrapper = match value {
            Value::Message(m) => {
                let url = format!("{}{}", DEFAULT_BASE_URL, m.descriptor().full_name());
                return Ok(Self::new(url, m.encode_to_vec()));
            }
            Value::List(_) => {
                return Err(ReflectError::InvalidValue {
                    field: "value".to_string(),
                    reason: "lists must be wrapped one element at a time".to_string(),
                })
            }
            Value::Bool(_) => "google.protobuf.BoolValue",
            Value::I32(_) | Value::EnumNumber(_) => "google.protobuf.Int32Value",
            Value::I64(_) => "google.protobuf.Int64Value",
            Value::U32(_) => "google.protobuf.UInt32Value",
            Value::U64(_) => "google.protobuf.UInt64Value",
            Value::F32(_) => "google.protobuf.FloatValue",
            Value::F64(_) => "google.protobuf.DoubleValue",
            Value::String(_) => "google.protobuf.StringValue",
            Value::Bytes(_) => "google.protobuf.BytesValue",
        };
        let descriptor = wellknown::pool()
            .get_message_by_name(wrapper)
            .ok_or_else(|| ReflectError::TypeNotFound(wrapper.to_string()))?;
        let inner = match value {
            Value::EnumNumber(n) => Value::I32(*n),
            other => other.clone(),
        };
        let mut message = DynamicMessage::new(descriptor);
        message.set_field_by_name("value", inner)?;
        Ok(Self::new(
            format!("{}{}", DEFAULT_BASE_URL, wrapper),
            message.encode_to_vec(),
        ))
    }
}

/// Name part of a type URL
pub(crate) fn type_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// A named option with a packed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatOption {
    pub name: String,
    pub value: AnyEnvelope,
}

impl FlatOption {
    pub fn new(name: impl Into<String>, value: AnyEnvelope) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Field type as carried by flat metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatKind {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl FlatKind {
    pub fn scalar(&self) -> Option<ScalarType> {
        let scalar = match self {
            FlatKind::Double => ScalarType::Double,
            FlatKind::Float => ScalarType::Float,
            FlatKind::Int64 => ScalarType::Int64,
            FlatKind::Uint64 => ScalarType::Uint64,
            FlatKind::Int32 => ScalarType::Int32,
            FlatKind::Fixed64 => ScalarType::Fixed64,
            FlatKind::Fixed32 => ScalarType::Fixed32,
            FlatKind::Bool => ScalarType::Bool,
            FlatKind::String => ScalarType::String,
            FlatKind::Bytes => ScalarType::Bytes,
            FlatKind::Uint32 => ScalarType::Uint32,
            FlatKind::Sfixed32 => ScalarType::Sfixed32,
            FlatKind::Sfixed64 => ScalarType::Sfixed64,
            FlatKind::Sint32 => ScalarType::Sint32,
            FlatKind::Sint64 => ScalarType::Sint64,
            FlatKind::Message | FlatKind::Enum => return None,
        };
        Some(scalar)
    }

    pub fn from_scalar(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Double => FlatKind::Double,
            ScalarType::Float => FlatKind::Float,
            ScalarType::Int64 => FlatKind::Int64,
            ScalarType::Uint64 => FlatKind::Uint64,
            ScalarType::Int32 => FlatKind::Int32,
            ScalarType::Fixed64 => FlatKind::Fixed64,
            ScalarType::Fixed32 => FlatKind::Fixed32,
            ScalarType::Bool => FlatKind::Bool,
            ScalarType::String => FlatKind::String,
            ScalarType::Bytes => FlatKind::Bytes,
            ScalarType::Uint32 => FlatKind::Uint32,
            ScalarType::Sfixed32 => FlatKind::Sfixed32,
            ScalarType::Sfixed64 => FlatKind::Sfixed64,
            ScalarType::Sint32 => FlatKind::Sint32,
            ScalarType::Sint64 => FlatKind::Sint64,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FlatKind::Message | FlatKind::Enum)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatField {
    pub name: String,
    pub number: i32,
    pub kind: FlatKind,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Type URL for message and enum fields
    #[serde(default)]
    pub type_url: String,
    /// 1-based index into the message's oneofs; 0 for none
    #[serde(default)]
    pub oneof_index: i32,
    #[serde(default)]
    pub packed: bool,
    #[serde(default)]
    pub json_name: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub options: Vec<FlatOption>,
}

impl FlatField {
    pub fn new(name: impl Into<String>, number: i32, kind: FlatKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            cardinality: Cardinality::Optional,
            type_url: String::new(),
            oneof_index: 0,
            packed: false,
            json_name: None,
            default_value: None,
            options: Vec::new(),
        }
    }

    pub fn reference(name: impl Into<String>, number: i32, kind: FlatKind, type_url: impl Into<String>) -> Self {
        Self {
            type_url: type_url.into(),
            ..Self::new(name, number, kind)
        }
    }

    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated;
        self
    }

    pub fn in_oneof(mut self, index: i32) -> Self {
        self.oneof_index = index;
        self
    }

    pub fn with_option(mut self, option: FlatOption) -> Self {
        self.options.push(option);
        self
    }
}

/// A message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatType {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FlatField>,
    #[serde(default)]
    pub oneofs: Vec<String>,
    #[serde(default)]
    pub options: Vec<FlatOption>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub syntax: Syntax,
}

impl FlatType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            oneofs: Vec::new(),
            options: Vec::new(),
            source_file: None,
            syntax: Syntax::default(),
        }
    }

    pub fn with_field(mut self, field: FlatField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_oneof(mut self, name: impl Into<String>) -> Self {
        self.oneofs.push(name.into());
        self
    }

    pub fn with_option(mut self, option: FlatOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEnumValue {
    pub name: String,
    pub number: i32,
    #[serde(default)]
    pub options: Vec<FlatOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEnum {
    pub name: String,
    #[serde(default)]
    pub values: Vec<FlatEnumValue>,
    #[serde(default)]
    pub options: Vec<FlatOption>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub syntax: Syntax,
}

impl FlatEnum {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            options: Vec::new(),
            source_file: None,
            syntax: Syntax::default(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(FlatEnumValue {
            name: name.into(),
            number,
            options: Vec::new(),
        });
        self
    }

    pub fn with_option(mut self, option: FlatOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }
}

/// What a fetcher returns for one type URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FlatDescription {
    Message(FlatType),
    Enum(FlatEnum),
}

impl FlatDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn name(&self) -> &str {
        let name = match self {
            FlatDescription::Message(t) => &t.name,
            FlatDescription::Enum(e) => &e.name,
        };
        name.strip_prefix('.').unwrap_or(name)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, FlatDescription::Enum(_))
    }

    pub fn source_file(&self) -> Option<&str> {
        let file = match self {
            FlatDescription::Message(t) => t.source_file.as_deref(),
            FlatDescription::Enum(e) => e.source_file.as_deref(),
        };
        file.filter(|f| !f.is_empty())
    }

    pub fn syntax(&self) -> Syntax {
        match self {
            FlatDescription::Message(t) => t.syntax,
            FlatDescription::Enum(e) => e.syntax,
        }
    }
}

impl From<FlatType> for FlatDescription {
    fn from(t: FlatType) -> Self {
        FlatDescription::Message(t)
    }
}

impl From<FlatEnum> for FlatDescription {
    fn from(e: FlatEnum) -> Self {
        FlatDescription::Enum(e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatMethod {
    pub name: String,
    pub request_type_url: String,
    #[serde(default)]
    pub request_streaming: bool,
    pub response_type_url: String,
    #[serde(default)]
    pub response_streaming: bool,
    #[serde(default)]
    pub options: Vec<FlatOption>,
}

impl FlatMethod {
    pub fn new(name: impl Into<String>, request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_type_url: request.into(),
            response_type_url: response.into(),
            ..Default::default()
        }
    }
}

/// A service as API metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatApi {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<FlatMethod>,
    #[serde(default)]
    pub options: Vec<FlatOption>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub syntax: Syntax,
}

impl FlatApi {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn full_name(&self) -> &str {
        self.name.strip_prefix('.').unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_enum_as_int32() {
        let any = AnyEnvelope::wrap(&Value::EnumNumber(3)).unwrap();
        assert_eq!(any.type_url, "type.googleapis.com/google.protobuf.Int32Value");
        assert_eq!(any.type_name(), "google.protobuf.Int32Value");
        assert_eq!(any.value, vec![0x08, 0x03]);
    }

    #[test]
    fn test_wrap_rejects_lists() {
        assert!(AnyEnvelope::wrap(&Value::List(vec![Value::Bool(true)])).is_err());
    }

    #[test]
    fn test_flat_description_from_json() {
        let json = r#"{
            "kind": "enum",
            "name": ".pkg.Color",
            "values": [{"name": "RED", "number": 0}],
            "source_file": "",
            "syntax": "proto3"
        }"#;
        let flat = FlatDescription::from_json(json).unwrap();
        assert!(flat.is_enum());
        assert_eq!(flat.name(), "pkg.Color");
        assert_eq!(flat.source_file(), None);
        assert_eq!(flat.syntax(), Syntax::Proto3);
    }

    #[test]
    fn test_type_name_of() {
        assert_eq!(type_name_of("https://a.com/x/foo.Bar"), "foo.Bar");
        assert_eq!(type_name_of("foo.Bar"), "foo.Bar");
    }
}
