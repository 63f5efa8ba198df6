//! Generic Messages
//!
//! [`DynamicMessage`] stores field values keyed by field number and is driven
//! entirely by a [`MessageDescriptor`]. It is the representation used for
//! option values, for Any payloads whose type has no generated counterpart,
//! and for anything else that only exists at runtime.

mod codec;
pub mod generated;

pub use generated::{CompiledTypes, Generated, GeneratedTypes};

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, ScalarType};
use crate::error::{ReflectError, Result};

// =============================================================================
// Message trait
// =============================================================================

/// A message that knows its descriptor and can encode itself
pub trait Message: fmt::Debug + Send + Sync + 'static {
    fn descriptor(&self) -> MessageDescriptor;

    fn encode_to_vec(&self) -> Vec<u8>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Message {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

// =============================================================================
// Values
// =============================================================================

/// A field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    EnumNumber(i32),
    Message(DynamicMessage),
    List(Vec<Value>),
}

impl Value {
    /// Zero value for a field: an empty list for repeated fields
    pub fn default_for(field: &FieldDescriptor) -> Value {
        if field.is_list() {
            Value::List(Vec::new())
        } else {
            Value::default_for_kind(&field.kind())
        }
    }

    pub fn default_for_kind(kind: &Kind) -> Value {
        match kind {
            Kind::Scalar(s) => match s {
                ScalarType::Bool => Value::Bool(false),
                ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => Value::I32(0),
                ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => Value::I64(0),
                ScalarType::Uint32 | ScalarType::Fixed32 => Value::U32(0),
                ScalarType::Uint64 | ScalarType::Fixed64 => Value::U64(0),
                ScalarType::Float => Value::F32(0.0),
                ScalarType::Double => Value::F64(0.0),
                ScalarType::String => Value::String(String::new()),
                ScalarType::Bytes => Value::Bytes(Vec::new()),
            },
            Kind::Enum(e) => Value::EnumNumber(e.values().first().map_or(0, |v| v.number())),
            Kind::Message(m) => Value::Message(DynamicMessage::new(m.clone())),
        }
    }

    /// Whether this value can be stored in `field`
    pub fn is_valid_for(&self, field: &FieldDescriptor) -> bool {
        let kind = field.kind();
        match self {
            Value::List(items) => field.is_list() && items.iter().all(|v| v.is_valid_singular(&kind)),
            single => !field.is_list() && single.is_valid_singular(&kind),
        }
    }

    fn is_valid_singular(&self, kind: &Kind) -> bool {
        match (self, kind) {
            (Value::Bool(_), Kind::Scalar(ScalarType::Bool)) => true,
            (Value::I32(_), Kind::Scalar(s)) => matches!(
                s,
                ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32
            ),
            (Value::I64(_), Kind::Scalar(s)) => matches!(
                s,
                ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64
            ),
            (Value::U32(_), Kind::Scalar(s)) => {
                matches!(s, ScalarType::Uint32 | ScalarType::Fixed32)
            }
            (Value::U64(_), Kind::Scalar(s)) => {
                matches!(s, ScalarType::Uint64 | ScalarType::Fixed64)
            }
            (Value::F32(_), Kind::Scalar(ScalarType::Float)) => true,
            (Value::F64(_), Kind::Scalar(ScalarType::Double)) => true,
            (Value::String(_), Kind::Scalar(ScalarType::String)) => true,
            (Value::Bytes(_), Kind::Scalar(ScalarType::Bytes)) => true,
            (Value::EnumNumber(_), Kind::Enum(_)) => true,
            (Value::Message(m), Kind::Message(md)) => m.descriptor_ref() == md,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

// =============================================================================
// DynamicMessage
// =============================================================================

/// Descriptor-driven message
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    descriptor: MessageDescriptor,
    fields: BTreeMap<i32, Value>,
    unknown: Vec<u8>,
}

impl DynamicMessage {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
            unknown: Vec::new(),
        }
    }

    /// Decode wire-format bytes
    pub fn decode(descriptor: MessageDescriptor, bytes: &[u8]) -> Result<Self> {
        codec::decode(descriptor, bytes)
    }

    pub(crate) fn descriptor_ref(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn has_field(&self, field: &FieldDescriptor) -> bool {
        self.fields.contains_key(&field.number())
    }

    pub fn get_field(&self, field: &FieldDescriptor) -> Option<&Value> {
        self.fields.get(&field.number())
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<&Value> {
        let field = self.descriptor.get_field_by_name(name)?;
        self.get_field(&field)
    }

    /// Set a field, clearing other members of its oneof
    pub fn set_field(&mut self, field: &FieldDescriptor, value: Value) -> Result<()> {
        if field.parent_message().as_ref() != Some(&self.descriptor) || field.is_extension() {
            return Err(ReflectError::InvalidValue {
                field: field.full_name().to_string(),
                reason: format!("not a field of {}", self.descriptor.full_name()),
            });
        }
        if !value.is_valid_for(field) {
            return Err(ReflectError::InvalidValue {
                field: field.full_name().to_string(),
                reason: format!("{:?} does not match the field type", value),
            });
        }
        self.put(field, value);
        Ok(())
    }

    pub fn set_field_by_name(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self
            .descriptor
            .get_field_by_name(name)
            .ok_or_else(|| ReflectError::InvalidValue {
                field: name.to_string(),
                reason: format!("no such field in {}", self.descriptor.full_name()),
            })?;
        self.set_field(&field, value)
    }

    pub fn clear_field(&mut self, field: &FieldDescriptor) {
        self.fields.remove(&field.number());
    }

    /// Set fields in field-number order
    pub fn fields(&self) -> impl Iterator<Item = (FieldDescriptor, &Value)> + '_ {
        let descriptor = &self.descriptor;
        self.fields
            .iter()
            .filter_map(move |(number, value)| descriptor.get_field(*number).map(|f| (f, value)))
    }

    /// Raw bytes of fields the descriptor does not declare
    pub fn unknown_fields(&self) -> &[u8] {
        &self.unknown
    }

    fn put(&mut self, field: &FieldDescriptor, value: Value) {
        if let Some(oneof) = field.containing_oneof() {
            for sibling in oneof.fields() {
                if sibling.number() != field.number() {
                    self.fields.remove(&sibling.number());
                }
            }
        }
        self.fields.insert(field.number(), value);
    }
}

impl Message for DynamicMessage {
    fn descriptor(&self) -> MessageDescriptor {
        self.descriptor.clone()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::encode(self, &mut buf);
        buf
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorPool, EnumDef, FieldDef, FileDef, MessageDef, OneofDef, Syntax};

    fn pool() -> DescriptorPool {
        let pool = DescriptorPool::new();
        pool.add_file(
            FileDef::new("dyn.proto", "dyn")
                .with_syntax(Syntax::Proto3)
                .with_enum(EnumDef::new("Mood").with_value("CALM", 0).with_value("ANGRY", 3))
                .with_message(
                    MessageDef::new("Sample")
                        .with_oneof(OneofDef::new("choice"))
                        .with_field(FieldDef::scalar("flag", 1, ScalarType::Bool))
                        .with_field(FieldDef::scalar("delta", 2, ScalarType::Sint64))
                        .with_field(FieldDef::scalar("ratio", 3, ScalarType::Float))
                        .with_field(FieldDef::scalar("label", 4, ScalarType::String).in_oneof(0))
                        .with_field(FieldDef::scalar("raw", 5, ScalarType::Bytes).in_oneof(0))
                        .with_field(FieldDef::scalar("ids", 6, ScalarType::Fixed32).repeated())
                        .with_field(FieldDef::enumeration("mood", 7, "Mood"))
                        .with_field(FieldDef::message("next", 8, "Sample")),
                ),
        )
        .unwrap();
        pool
    }

    fn sample(pool: &DescriptorPool) -> DynamicMessage {
        let desc = pool.get_message_by_name("dyn.Sample").unwrap();
        let mut inner = DynamicMessage::new(desc.clone());
        inner.set_field_by_name("label", Value::String("inner".into())).unwrap();

        let mut msg = DynamicMessage::new(desc);
        msg.set_field_by_name("flag", Value::Bool(true)).unwrap();
        msg.set_field_by_name("delta", Value::I64(-42)).unwrap();
        msg.set_field_by_name("ratio", Value::F32(0.5)).unwrap();
        msg.set_field_by_name("raw", Value::Bytes(vec![0, 159, 255])).unwrap();
        msg.set_field_by_name("ids", Value::List(vec![Value::U32(7), Value::U32(1 << 31)]))
            .unwrap();
        msg.set_field_by_name("mood", Value::EnumNumber(3)).unwrap();
        msg.set_field_by_name("next", Value::Message(inner)).unwrap();
        msg
    }

    #[test]
    fn test_encode_decode_preserves_message() {
        let pool = pool();
        let msg = sample(&pool);
        let bytes = msg.encode_to_vec();
        let decoded = DynamicMessage::decode(msg.descriptor(), &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_oneof_members_are_exclusive() {
        let pool = pool();
        let mut msg = sample(&pool);
        assert!(msg.get_field_by_name("raw").is_some());
        msg.set_field_by_name("label", Value::String("x".into())).unwrap();
        assert!(msg.get_field_by_name("raw").is_none());
        assert_eq!(msg.get_field_by_name("label").and_then(Value::as_str), Some("x"));
    }

    #[test]
    fn test_set_field_rejects_wrong_type() {
        let pool = pool();
        let desc = pool.get_message_by_name("dyn.Sample").unwrap();
        let mut msg = DynamicMessage::new(desc);
        let err = msg.set_field_by_name("flag", Value::I32(1)).unwrap_err();
        assert!(matches!(err, ReflectError::InvalidValue { .. }));
        let err = msg.set_field_by_name("ids", Value::U32(1)).unwrap_err();
        assert!(matches!(err, ReflectError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let pool = pool();
        let desc = pool.get_message_by_name("dyn.Sample").unwrap();
        // field 99, varint 150
        let bytes = [0x98, 0x06, 0x96, 0x01];
        let msg = DynamicMessage::decode(desc.clone(), &bytes).unwrap();
        assert_eq!(msg.unknown_fields(), &bytes);
        assert_eq!(msg.encode_to_vec(), bytes.to_vec());
    }

    #[test]
    fn test_downcast_dyn_message() {
        let pool = pool();
        let boxed: Box<dyn Message> = Box::new(sample(&pool));
        assert!(boxed.is::<DynamicMessage>());
        assert!(boxed.downcast_ref::<DynamicMessage>().is_some());
    }
}
