//! 总线消息的二进制编解码层。
//!
//! 每个线上类型都实现 [`WireCodec`]，由显式的字段布局描述，不存在任何
//! 不透明的对象序列化兜底。信封格式：
//!
//! ```text
//! +----------------+----------------------+
//! | len: u32 (BE)  | body: len bytes      |
//! +----------------+----------------------+
//! ```
//!
//! 解码只读取声明长度的字节，忽略其后的数据，因此多个信封可以直接拼接。

pub mod envelope;
pub mod error;
mod primitives;
mod types;

pub use envelope::{LENGTH_PREFIX, decode, decode_frame, decode_stream, encode, encode_into};
pub use error::CodecError;
pub use types::MAX_ARRAY_DEPTH;

use bytes::BytesMut;

/// 线上类型的编解码契约。
pub trait WireCodec: Sized {
    /// 类型名，出现在错误信息中。
    const KIND: &'static str;

    /// 把载荷写入 `buf`（不含长度前缀）。
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// 从 `buf` 读取载荷并前移游标。
    fn decode_body(buf: &mut &[u8]) -> Result<Self, CodecError>;
}
