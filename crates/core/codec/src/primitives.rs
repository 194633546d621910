use crate::CodecError;
use bytes::{Buf, BufMut, BytesMut};

fn ensure(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut &[u8]) -> Result<u16, CodecError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut &[u8]) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut &[u8]) -> Result<u64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

pub(crate) fn get_i64(buf: &mut &[u8]) -> Result<i64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

pub(crate) fn put_len(buf: &mut BytesMut, len: usize) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
    buf.put_u32(len);
    Ok(())
}

pub(crate) fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) -> Result<(), CodecError> {
    put_len(buf, bytes.len())?;
    buf.put_slice(bytes);
    Ok(())
}

pub(crate) fn get_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = get_u32(buf)? as usize;
    ensure(buf, len)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

pub(crate) fn get_string(buf: &mut &[u8]) -> Result<String, CodecError> {
    String::from_utf8(get_bytes(buf)?).map_err(|_| CodecError::InvalidUtf8)
}
