//! Wire-format encoding for [`DynamicMessage`]

use std::collections::HashMap;

use prost::bytes::{Buf, BufMut};
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, skip_field, DecodeContext, WireType,
};

use super::{DynamicMessage, Message, Value};
use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, ScalarType};
use crate::error::{ReflectError, Result};

fn wire_type_of(kind: &Kind) -> WireType {
    match kind {
        Kind::Scalar(s) => match s {
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => {
                WireType::SixtyFourBit
            }
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => {
                WireType::ThirtyTwoBit
            }
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        },
        Kind::Enum(_) => WireType::Varint,
        Kind::Message(_) => WireType::LengthDelimited,
    }
}

fn zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

fn unzigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// =============================================================================
// Encoding
// =============================================================================

pub(crate) fn encode(message: &DynamicMessage, buf: &mut Vec<u8>) {
    for (field, value) in message.fields() {
        encode_field(&field, value, buf);
    }
    buf.put_slice(&message.unknown);
}

fn encode_field(field: &FieldDescriptor, value: &Value, buf: &mut Vec<u8>) {
    let number = field.number() as u32;
    let kind = field.kind();
    match value {
        Value::List(items) if field.is_packed() => {
            if items.is_empty() {
                return;
            }
            let mut payload = Vec::new();
            for item in items {
                encode_raw(&kind, item, &mut payload);
            }
            encode_key(number, WireType::LengthDelimited, buf);
            encode_varint(payload.len() as u64, buf);
            buf.put_slice(&payload);
        }
        Value::List(items) => {
            for item in items {
                encode_key(number, wire_type_of(&kind), buf);
                encode_raw(&kind, item, buf);
            }
        }
        single => {
            encode_key(number, wire_type_of(&kind), buf);
            encode_raw(&kind, single, buf);
        }
    }
}

fn encode_raw(kind: &Kind, value: &Value, buf: &mut Vec<u8>) {
    match (kind, value) {
        (_, Value::Bool(b)) => encode_varint(u64::from(*b), buf),
        (Kind::Scalar(ScalarType::Sint32), Value::I32(v)) => encode_varint(u64::from(zigzag32(*v)), buf),
        (Kind::Scalar(ScalarType::Sfixed32), Value::I32(v)) => buf.put_i32_le(*v),
        (_, Value::I32(v)) | (_, Value::EnumNumber(v)) => encode_varint(i64::from(*v) as u64, buf),
        (Kind::Scalar(ScalarType::Sint64), Value::I64(v)) => encode_varint(zigzag64(*v), buf),
        (Kind::Scalar(ScalarType::Sfixed64), Value::I64(v)) => buf.put_i64_le(*v),
        (_, Value::I64(v)) => encode_varint(*v as u64, buf),
        (Kind::Scalar(ScalarType::Fixed32), Value::U32(v)) => buf.put_u32_le(*v),
        (_, Value::U32(v)) => encode_varint(u64::from(*v), buf),
        (Kind::Scalar(ScalarType::Fixed64), Value::U64(v)) => buf.put_u64_le(*v),
        (_, Value::U64(v)) => encode_varint(*v, buf),
        (_, Value::F32(v)) => buf.put_f32_le(*v),
        (_, Value::F64(v)) => buf.put_f64_le(*v),
        (_, Value::String(s)) => {
            encode_varint(s.len() as u64, buf);
            buf.put_slice(s.as_bytes());
        }
        (_, Value::Bytes(b)) => {
            encode_varint(b.len() as u64, buf);
            buf.put_slice(b);
        }
        (_, Value::Message(m)) => {
            let inner = m.encode_to_vec();
            encode_varint(inner.len() as u64, buf);
            buf.put_slice(&inner);
        }
        // nested lists are rejected by set_field
        (_, Value::List(_)) => {}
    }
}

// =============================================================================
// Decoding
// =============================================================================

pub(crate) fn decode(descriptor: MessageDescriptor, bytes: &[u8]) -> Result<DynamicMessage> {
    let fields: HashMap<i32, FieldDescriptor> = descriptor
        .fields()
        .into_iter()
        .map(|f| (f.number(), f))
        .collect();
    let mut message = DynamicMessage::new(descriptor);
    let mut buf = bytes;

    while buf.has_remaining() {
        let start = buf;
        let (number, wire_type) = decode_key(&mut buf)?;
        let Some(field) = fields.get(&(number as i32)) else {
            skip_field(wire_type, number, &mut buf, DecodeContext::default())?;
            let consumed = start.len() - buf.len();
            message.unknown.extend_from_slice(&start[..consumed]);
            continue;
        };

        let kind = field.kind();
        if field.is_list() {
            let mut items = match message.fields.remove(&field.number()) {
                Some(Value::List(items)) => items,
                _ => Vec::new(),
            };
            let element_wire_type = wire_type_of(&kind);
            if wire_type == WireType::LengthDelimited && element_wire_type != WireType::LengthDelimited {
                let mut packed = take_length_delimited(field, &mut buf)?;
                while packed.has_remaining() {
                    items.push(decode_raw(field, &kind, element_wire_type, &mut packed)?);
                }
            } else {
                items.push(decode_raw(field, &kind, wire_type, &mut buf)?);
            }
            message.fields.insert(field.number(), Value::List(items));
        } else {
            let value = decode_raw(field, &kind, wire_type, &mut buf)?;
            message.put(field, value);
        }
    }
    Ok(message)
}

fn take<'a>(field: &FieldDescriptor, buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    let data: &'a [u8] = *buf;
    if data.len() < len {
        return Err(ReflectError::malformed(field.full_name(), "truncated value"));
    }
    let (head, tail) = data.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_length_delimited<'a>(field: &FieldDescriptor, buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = decode_varint(buf)? as usize;
    take(field, buf, len)
}

fn fixed<const N: usize>(field: &FieldDescriptor, buf: &mut &[u8]) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(field, buf, N)?);
    Ok(out)
}

fn decode_raw(
    field: &FieldDescriptor,
    kind: &Kind,
    wire_type: WireType,
    buf: &mut &[u8],
) -> Result<Value> {
    if wire_type != wire_type_of(kind) {
        return Err(ReflectError::malformed(
            field.full_name(),
            format!("unexpected wire type {:?}", wire_type),
        ));
    }
    let value = match kind {
        Kind::Scalar(s) => match s {
            ScalarType::Bool => Value::Bool(decode_varint(buf)? != 0),
            ScalarType::Int32 => Value::I32(decode_varint(buf)? as i32),
            ScalarType::Sint32 => Value::I32(unzigzag32(decode_varint(buf)? as u32)),
            ScalarType::Sfixed32 => Value::I32(i32::from_le_bytes(fixed(field, buf)?)),
            ScalarType::Int64 => Value::I64(decode_varint(buf)? as i64),
            ScalarType::Sint64 => Value::I64(unzigzag64(decode_varint(buf)?)),
            ScalarType::Sfixed64 => Value::I64(i64::from_le_bytes(fixed(field, buf)?)),
            ScalarType::Uint32 => Value::U32(decode_varint(buf)? as u32),
            ScalarType::Fixed32 => Value::U32(u32::from_le_bytes(fixed(field, buf)?)),
            ScalarType::Uint64 => Value::U64(decode_varint(buf)?),
            ScalarType::Fixed64 => Value::U64(u64::from_le_bytes(fixed(field, buf)?)),
            ScalarType::Float => Value::F32(f32::from_le_bytes(fixed(field, buf)?)),
            ScalarType::Double => Value::F64(f64::from_le_bytes(fixed(field, buf)?)),
            ScalarType::String => {
                let raw = take_length_delimited(field, buf)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|e| ReflectError::malformed(field.full_name(), e.to_string()))?;
                Value::String(text.to_string())
            }
            ScalarType::Bytes => Value::Bytes(take_length_delimited(field, buf)?.to_vec()),
        },
        Kind::Enum(_) => Value::EnumNumber(decode_varint(buf)? as i32),
        Kind::Message(md) => {
            let raw = take_length_delimited(field, buf)?;
            Value::Message(decode(md.clone(), raw)?)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag64(-2), 3);
        assert_eq!(unzigzag32(zigzag32(i32::MIN)), i32::MIN);
        assert_eq!(unzigzag64(zigzag64(i64::MAX)), i64::MAX);
    }
}
