//! 领域类型的字段布局
//!
//! | 类型 | 布局 |
//! |------|------|
//! | Topic | `source: u8` `path: str` |
//! | Variant | `tag: u8` + 载荷；数组为 `count: u32` + 元素 |
//! | Value | Variant `status: u32` `source_time: i64` `server_time: i64` `source_ps: u16` `server_ps: u16` |
//! | TopicValue | Topic Value |
//! | (A, B) | A B |
//!
//! `str` / 字节串均为 `len: u32` + 字节。

use crate::primitives::{
    get_bytes, get_i64, get_string, get_u8, get_u16, get_u32, get_u64, put_bytes, put_len,
};
use crate::{CodecError, WireCodec};
use bytes::{BufMut, BytesMut};
use domain::{SourceType, StatusCode, Topic, TopicValue, Value, Variant};

/// 数组允许的最大嵌套层数。
pub const MAX_ARRAY_DEPTH: usize = 16;

fn source_tag(source_type: SourceType) -> u8 {
    match source_type {
        SourceType::Unknown => 0,
        SourceType::Sys => 1,
        SourceType::Opc => 2,
        SourceType::Plc => 3,
        SourceType::Mqtt => 4,
    }
}

fn source_from_tag(tag: u8) -> Result<SourceType, CodecError> {
    SourceType::ALL
        .into_iter()
        .find(|st| source_tag(*st) == tag)
        .ok_or(CodecError::UnknownTag {
            kind: "source type",
            tag,
        })
}

impl WireCodec for Topic {
    const KIND: &'static str = "topic";

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u8(source_tag(self.source_type()));
        put_bytes(buf, self.path().as_bytes())
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let source_type = source_from_tag(get_u8(buf)?)?;
        let path = get_string(buf)?;
        Ok(Topic::new(source_type, path))
    }
}

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const SBYTE: u8 = 2;
    pub const BYTE: u8 = 3;
    pub const INT16: u8 = 4;
    pub const UINT16: u8 = 5;
    pub const INT32: u8 = 6;
    pub const UINT32: u8 = 7;
    pub const INT64: u8 = 8;
    pub const UINT64: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const DOUBLE: u8 = 11;
    pub const STRING: u8 = 12;
    pub const DATETIME: u8 = 13;
    pub const BYTESTRING: u8 = 14;
    pub const ARRAY: u8 = 15;
}

fn encode_variant(variant: &Variant, buf: &mut BytesMut, depth: usize) -> Result<(), CodecError> {
    match variant {
        Variant::Null => buf.put_u8(tag::NULL),
        Variant::Boolean(v) => {
            buf.put_u8(tag::BOOLEAN);
            buf.put_u8(u8::from(*v));
        }
        Variant::SByte(v) => {
            buf.put_u8(tag::SBYTE);
            buf.put_i8(*v);
        }
        Variant::Byte(v) => {
            buf.put_u8(tag::BYTE);
            buf.put_u8(*v);
        }
        Variant::Int16(v) => {
            buf.put_u8(tag::INT16);
            buf.put_i16(*v);
        }
        Variant::UInt16(v) => {
            buf.put_u8(tag::UINT16);
            buf.put_u16(*v);
        }
        Variant::Int32(v) => {
            buf.put_u8(tag::INT32);
            buf.put_i32(*v);
        }
        Variant::UInt32(v) => {
            buf.put_u8(tag::UINT32);
            buf.put_u32(*v);
        }
        Variant::Int64(v) => {
            buf.put_u8(tag::INT64);
            buf.put_i64(*v);
        }
        Variant::UInt64(v) => {
            buf.put_u8(tag::UINT64);
            buf.put_u64(*v);
        }
        Variant::Float(v) => {
            buf.put_u8(tag::FLOAT);
            buf.put_u32(v.to_bits());
        }
        Variant::Double(v) => {
            buf.put_u8(tag::DOUBLE);
            buf.put_u64(v.to_bits());
        }
        Variant::String(v) => {
            buf.put_u8(tag::STRING);
            put_bytes(buf, v.as_bytes())?;
        }
        Variant::DateTime(v) => {
            buf.put_u8(tag::DATETIME);
            buf.put_i64(*v);
        }
        Variant::ByteString(v) => {
            buf.put_u8(tag::BYTESTRING);
            put_bytes(buf, v)?;
        }
        Variant::Array(items) => {
            // 与解码端同一上限，编码成功的值总能解码
            if depth >= MAX_ARRAY_DEPTH {
                return Err(CodecError::TooDeep(MAX_ARRAY_DEPTH));
            }
            buf.put_u8(tag::ARRAY);
            put_len(buf, items.len())?;
            for item in items {
                encode_variant(item, buf, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn decode_variant(buf: &mut &[u8], depth: usize) -> Result<Variant, CodecError> {
    let variant = match get_u8(buf)? {
        tag::NULL => Variant::Null,
        tag::BOOLEAN => match get_u8(buf)? {
            0 => Variant::Boolean(false),
            1 => Variant::Boolean(true),
            other => {
                return Err(CodecError::UnknownTag {
                    kind: "boolean",
                    tag: other,
                });
            }
        },
        tag::SBYTE => Variant::SByte(get_u8(buf)? as i8),
        tag::BYTE => Variant::Byte(get_u8(buf)?),
        tag::INT16 => Variant::Int16(get_u16(buf)? as i16),
        tag::UINT16 => Variant::UInt16(get_u16(buf)?),
        tag::INT32 => Variant::Int32(get_u32(buf)? as i32),
        tag::UINT32 => Variant::UInt32(get_u32(buf)?),
        tag::INT64 => Variant::Int64(get_i64(buf)?),
        tag::UINT64 => Variant::UInt64(get_u64(buf)?),
        tag::FLOAT => Variant::Float(f32::from_bits(get_u32(buf)?)),
        tag::DOUBLE => Variant::Double(f64::from_bits(get_u64(buf)?)),
        tag::STRING => Variant::String(get_string(buf)?),
        tag::DATETIME => Variant::DateTime(get_i64(buf)?),
        tag::BYTESTRING => Variant::ByteString(get_bytes(buf)?),
        tag::ARRAY => {
            if depth >= MAX_ARRAY_DEPTH {
                return Err(CodecError::TooDeep(MAX_ARRAY_DEPTH));
            }
            let count = get_u32(buf)? as usize;
            // 每个元素至少占一个标签字节
            if count > buf.len() {
                return Err(CodecError::Truncated {
                    needed: count,
                    available: buf.len(),
                });
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_variant(buf, depth + 1)?);
            }
            Variant::Array(items)
        }
        other => {
            return Err(CodecError::UnknownTag {
                kind: "variant",
                tag: other,
            });
        }
    };
    Ok(variant)
}

impl WireCodec for Variant {
    const KIND: &'static str = "variant";

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_variant(self, buf, 0)
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError> {
        decode_variant(buf, 0)
    }
}

impl WireCodec for Value {
    const KIND: &'static str = "value";

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        encode_variant(&self.variant, buf, 0)?;
        buf.put_u32(self.status.0);
        buf.put_i64(self.source_time_ms);
        buf.put_i64(self.server_time_ms);
        buf.put_u16(self.source_picoseconds);
        buf.put_u16(self.server_picoseconds);
        Ok(())
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Value {
            variant: decode_variant(buf, 0)?,
            status: StatusCode(get_u32(buf)?),
            source_time_ms: get_i64(buf)?,
            server_time_ms: get_i64(buf)?,
            source_picoseconds: get_u16(buf)?,
            server_picoseconds: get_u16(buf)?,
        })
    }
}

impl WireCodec for TopicValue {
    const KIND: &'static str = "topic value";

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        self.topic.encode_body(buf)?;
        self.value.encode_body(buf)
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let topic = Topic::decode_body(buf)?;
        let value = Value::decode_body(buf)?;
        Ok(TopicValue { topic, value })
    }
}

impl<A: WireCodec, B: WireCodec> WireCodec for (A, B) {
    const KIND: &'static str = "pair";

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        self.0.encode_body(buf)?;
        self.1.encode_body(buf)
    }

    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let first = A::decode_body(buf)?;
        let second = B::decode_body(buf)?;
        Ok((first, second))
    }
}
