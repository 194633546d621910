//! Value：带质量码与时间戳的类型化数据值。

use crate::topic::Topic;
use std::fmt;

/// 质量/状态码，最高两位表示严重级别（00 good、01 uncertain、10 bad）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0);
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);

    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// 节点声明的内置数据类型，写入时据此把文本转换为 `Variant`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    ByteString,
}

/// 标量或数组载荷。
#[derive(Debug, Clone)]
pub enum Variant {
    Null,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    /// Unix 毫秒时间戳
    DateTime(i64),
    ByteString(Vec<u8>),
    Array(Vec<Variant>),
}

// 浮点按位比较，NaN 也能满足编解码往返相等。
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        use Variant::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (SByte(a), SByte(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (ByteString(a), ByteString(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Variant {}

/// 文本无法转换为目标类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueParseError {
    pub expected: BuiltinType,
    pub input: String,
}

impl fmt::Display for ValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {:?} to {:?}", self.input, self.expected)
    }
}

impl std::error::Error for ValueParseError {}

impl Variant {
    /// 按节点数据类型把请求中的文本转换为类型化值。
    pub fn from_text(ty: BuiltinType, text: &str) -> Result<Variant, ValueParseError> {
        let err = || ValueParseError {
            expected: ty,
            input: text.to_string(),
        };
        let trimmed = text.trim();
        let variant = match ty {
            BuiltinType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Variant::Boolean(true),
                "false" | "0" => Variant::Boolean(false),
                _ => return Err(err()),
            },
            BuiltinType::SByte => Variant::SByte(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Byte => Variant::Byte(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Int16 => Variant::Int16(trimmed.parse().map_err(|_| err())?),
            BuiltinType::UInt16 => Variant::UInt16(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Int32 => Variant::Int32(trimmed.parse().map_err(|_| err())?),
            BuiltinType::UInt32 => Variant::UInt32(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Int64 => Variant::Int64(trimmed.parse().map_err(|_| err())?),
            BuiltinType::UInt64 => Variant::UInt64(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Float => Variant::Float(trimmed.parse().map_err(|_| err())?),
            BuiltinType::Double => Variant::Double(trimmed.parse().map_err(|_| err())?),
            BuiltinType::DateTime => Variant::DateTime(trimmed.parse().map_err(|_| err())?),
            BuiltinType::String => Variant::String(text.to_string()),
            BuiltinType::ByteString => Variant::ByteString(text.as_bytes().to_vec()),
        };
        Ok(variant)
    }

    /// 标量的内置类型；`Null` 与数组返回 `None`。
    pub fn builtin_type(&self) -> Option<BuiltinType> {
        let ty = match self {
            Variant::Null | Variant::Array(_) => return None,
            Variant::Boolean(_) => BuiltinType::Boolean,
            Variant::SByte(_) => BuiltinType::SByte,
            Variant::Byte(_) => BuiltinType::Byte,
            Variant::Int16(_) => BuiltinType::Int16,
            Variant::UInt16(_) => BuiltinType::UInt16,
            Variant::Int32(_) => BuiltinType::Int32,
            Variant::UInt32(_) => BuiltinType::UInt32,
            Variant::Int64(_) => BuiltinType::Int64,
            Variant::UInt64(_) => BuiltinType::UInt64,
            Variant::Float(_) => BuiltinType::Float,
            Variant::Double(_) => BuiltinType::Double,
            Variant::String(_) => BuiltinType::String,
            Variant::DateTime(_) => BuiltinType::DateTime,
            Variant::ByteString(_) => BuiltinType::ByteString,
        };
        Some(ty)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Boolean(v) => write!(f, "{v}"),
            Variant::SByte(v) => write!(f, "{v}"),
            Variant::Byte(v) => write!(f, "{v}"),
            Variant::Int16(v) => write!(f, "{v}"),
            Variant::UInt16(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Int64(v) => write!(f, "{v}"),
            Variant::UInt64(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::String(v) => f.write_str(v),
            Variant::DateTime(v) => write!(f, "{v}"),
            Variant::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// 数据值：载荷 + 状态码 + 源/服务器时间戳。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub variant: Variant,
    pub status: StatusCode,
    pub source_time_ms: i64,
    pub server_time_ms: i64,
    pub source_picoseconds: u16,
    pub server_picoseconds: u16,
}

impl Value {
    /// 以当前时间作为源/服务器时间戳构造。
    pub fn new(variant: Variant, status: StatusCode) -> Self {
        let now = crate::now_epoch_ms();
        Self {
            variant,
            status,
            source_time_ms: now,
            server_time_ms: now,
            source_picoseconds: 0,
            server_picoseconds: 0,
        }
    }

    pub fn good(variant: Variant) -> Self {
        Self::new(variant, StatusCode::GOOD)
    }

    /// 无载荷的错误值，例如读取未知节点。
    pub fn bad(status: StatusCode) -> Self {
        Self::new(Variant::Null, status)
    }
}

/// 通知载荷：Topic 与其最新值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicValue {
    pub topic: Topic,
    pub value: Value,
}

impl TopicValue {
    pub fn new(topic: Topic, value: Value) -> Self {
        Self { topic, value }
    }
}
