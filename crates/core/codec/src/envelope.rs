//! 长度前缀信封

use crate::{CodecError, WireCodec};
use bytes::{BufMut, Bytes, BytesMut};

/// 长度前缀字节数。
pub const LENGTH_PREFIX: usize = 4;

/// 编码为独立信封。
pub fn encode<T: WireCodec>(value: &T) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// 在 `out` 末尾追加一个信封；失败时 `out` 保持原样。
pub fn encode_into<T: WireCodec>(value: &T, out: &mut BytesMut) -> Result<(), CodecError> {
    let start = out.len();
    out.put_u32(0);
    if let Err(err) = value.encode_body(out) {
        out.truncate(start);
        return Err(err);
    }
    let len = out.len() - start - LENGTH_PREFIX;
    let Ok(prefix) = u32::try_from(len) else {
        out.truncate(start);
        return Err(CodecError::TooLarge(len));
    };
    out[start..start + LENGTH_PREFIX].copy_from_slice(&prefix.to_be_bytes());
    Ok(())
}

/// 解码一个信封，忽略声明长度之后的字节。
pub fn decode<T: WireCodec>(frame: &[u8]) -> Result<T, CodecError> {
    decode_frame(frame).map(|(value, _)| value)
}

/// 解码一个信封，并返回其占用的总字节数（前缀 + 载荷）。
pub fn decode_frame<T: WireCodec>(frame: &[u8]) -> Result<(T, usize), CodecError> {
    let Some(header) = frame.get(..LENGTH_PREFIX) else {
        return Err(CodecError::Truncated {
            needed: LENGTH_PREFIX,
            available: frame.len(),
        });
    };
    let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let total = LENGTH_PREFIX + declared;
    let Some(body) = frame.get(LENGTH_PREFIX..total) else {
        return Err(CodecError::Truncated {
            needed: total,
            available: frame.len(),
        });
    };

    let mut cursor = body;
    let value = T::decode_body(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(CodecError::InvalidLength {
            kind: T::KIND,
            declared,
            used: declared - cursor.len(),
        });
    }
    Ok((value, total))
}

/// 依次解码拼接在一起的多个信封。
pub fn decode_stream<T: WireCodec>(mut buf: &[u8]) -> Result<Vec<T>, CodecError> {
    let mut values = Vec::new();
    while !buf.is_empty() {
        let (value, used) = decode_frame(buf)?;
        values.push(value);
        buf = &buf[used..];
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_ARRAY_DEPTH;
    use domain::Variant;

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let mut variant = Variant::Null;
        for _ in 0..=MAX_ARRAY_DEPTH {
            variant = Variant::Array(vec![variant]);
        }
        let mut out = BytesMut::from(&b"abc"[..]);
        assert_eq!(
            encode_into(&variant, &mut out).unwrap_err(),
            CodecError::TooDeep(MAX_ARRAY_DEPTH)
        );
        assert_eq!(&out[..], b"abc");
    }

    #[test]
    fn encode_appends_prefixed_frame() {
        let mut out = BytesMut::from(&b"abc"[..]);
        encode_into(&Variant::Int32(7), &mut out).unwrap();
        assert_eq!(&out[..3], b"abc");
        let prefix = u32::from_be_bytes([out[3], out[4], out[5], out[6]]) as usize;
        assert_eq!(prefix, out.len() - 3 - LENGTH_PREFIX);
    }
}
