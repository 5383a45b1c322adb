//! Byte-level shapes shared across the TDS grammar.
//!
//! All multi-byte integers on the wire are little-endian except the packet
//! header length; `bytes` provides those directly, so this module only covers
//! the composite shapes: length-prefixed UCS-2 strings, length-prefixed byte
//! runs, money, GUIDs and PLP chunk streams.

use bytes::{Buf, BufMut, Bytes};
use encoding_rs::Encoding;

use crate::error::ProtocolError;

/// PLP sentinel for a value of unknown total length (chunked until the
/// terminator).
pub const PLP_UNKNOWN: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// PLP sentinel for NULL.
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Read a UTF-16LE string of `char_count` UCS-2 code units.
pub fn read_utf16(src: &mut impl Buf, char_count: usize) -> Result<String, ProtocolError> {
    if src.remaining() < char_count * 2 {
        return Err(ProtocolError::UnexpectedEof);
    }

    let mut units = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        units.push(src.get_u16_le());
    }

    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidStringData)
}

/// Read a B_VARCHAR: 1-byte character count followed by UTF-16LE data.
pub fn read_b_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = src.get_u8() as usize;
    read_utf16(src, len)
}

/// Read a US_VARCHAR: 2-byte LE character count followed by UTF-16LE data.
pub fn read_us_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = src.get_u16_le() as usize;
    read_utf16(src, len)
}

/// Read a B_VARBYTE: 1-byte byte count followed by raw bytes.
pub fn read_b_varbyte(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = src.get_u8() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.copy_to_bytes(len))
}

/// Write a string as UTF-16LE without a length prefix.
pub fn write_utf16(dst: &mut impl BufMut, s: &str) {
    for unit in s.encode_utf16() {
        dst.put_u16_le(unit);
    }
}

/// Write a B_VARCHAR, truncating at 255 code units.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(255);
    dst.put_u8(len as u8);
    for &unit in &units[..len] {
        dst.put_u16_le(unit);
    }
}

/// Write a US_VARCHAR, truncating at 65535 code units.
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(65535);
    dst.put_u16_le(len as u16);
    for &unit in &units[..len] {
        dst.put_u16_le(unit);
    }
}

/// Write a B_VARBYTE.
pub fn write_b_varbyte(dst: &mut impl BufMut, bytes: &[u8]) {
    dst.put_u8(bytes.len().min(255) as u8);
    dst.put_slice(&bytes[..bytes.len().min(255)]);
}

/// Number of bytes a string occupies as UTF-16LE.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

/// Decode narrow (single-byte charset) string bytes using the charset derived
/// from a column collation. `None` falls back to Windows-1252, the server
/// default.
#[must_use]
pub fn decode_narrow(bytes: &[u8], encoding: Option<&'static Encoding>) -> String {
    let encoding = encoding.unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Decode UTF-16LE string bytes (byte count must be even).
pub fn decode_utf16_bytes(bytes: &[u8]) -> Result<String, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::InvalidStringData);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidStringData)
}

/// Read an 8-byte MONEY value: high dword first, then low dword, both LE.
/// The result is in 1/10000 currency units.
pub fn read_money8(src: &mut impl Buf) -> Result<i64, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let high = src.get_u32_le() as u64;
    let low = src.get_u32_le() as u64;
    Ok(((high << 32) | low) as i64)
}

/// Write an 8-byte MONEY value in 1/10000 units.
pub fn write_money8(dst: &mut impl BufMut, units: i64) {
    let raw = units as u64;
    dst.put_u32_le((raw >> 32) as u32);
    dst.put_u32_le(raw as u32);
}

/// Read a 4-byte SMALLMONEY value in 1/10000 units.
pub fn read_money4(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_i32_le())
}

/// Write a 4-byte SMALLMONEY value in 1/10000 units.
pub fn write_money4(dst: &mut impl BufMut, units: i32) {
    dst.put_i32_le(units);
}

/// Read a GUID in SQL Server byte order and return it in RFC 4122 order.
///
/// SQL Server stores the first three groups little-endian and the final
/// eight bytes big-endian.
pub fn read_guid(src: &mut impl Buf) -> Result<[u8; 16], ProtocolError> {
    if src.remaining() < 16 {
        return Err(ProtocolError::UnexpectedEof);
    }

    let mut out = [0u8; 16];
    out[3] = src.get_u8();
    out[2] = src.get_u8();
    out[1] = src.get_u8();
    out[0] = src.get_u8();
    out[5] = src.get_u8();
    out[4] = src.get_u8();
    out[7] = src.get_u8();
    out[6] = src.get_u8();
    for byte in &mut out[8..] {
        *byte = src.get_u8();
    }

    Ok(out)
}

/// Write a GUID given in RFC 4122 order using SQL Server byte order.
pub fn write_guid(dst: &mut impl BufMut, guid: &[u8; 16]) {
    dst.put_slice(&[guid[3], guid[2], guid[1], guid[0]]);
    dst.put_slice(&[guid[5], guid[4]]);
    dst.put_slice(&[guid[7], guid[6]]);
    dst.put_slice(&guid[8..]);
}

/// Read a PLP (partially length-prefixed) value: an 8-byte total length or
/// sentinel, then 4-byte-length-prefixed chunks until a zero-length
/// terminator. Returns `None` for NULL, otherwise the concatenated chunks.
pub fn read_plp(src: &mut impl Buf) -> Result<Option<Bytes>, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }

    let total = src.get_u64_le();
    if total == PLP_NULL {
        return Ok(None);
    }

    let mut out = bytes::BytesMut::new();
    if total != PLP_UNKNOWN {
        out.reserve(usize::try_from(total).unwrap_or(0));
    }

    loop {
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let chunk_len = src.get_u32_le() as usize;
        if chunk_len == 0 {
            break;
        }
        if src.remaining() < chunk_len {
            return Err(ProtocolError::UnexpectedEof);
        }
        let chunk = src.copy_to_bytes(chunk_len);
        out.extend_from_slice(&chunk);
    }

    if total != PLP_UNKNOWN && out.len() as u64 != total {
        return Err(ProtocolError::violation(format!(
            "PLP length mismatch: declared {total}, received {}",
            out.len()
        )));
    }

    Ok(Some(out.freeze()))
}

/// Write a PLP value as a single chunk (or the NULL sentinel).
pub fn write_plp(dst: &mut impl BufMut, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            dst.put_u64_le(bytes.len() as u64);
            dst.put_u32_le(bytes.len() as u32);
            dst.put_slice(bytes);
            dst.put_u32_le(0);
        }
        None => dst.put_u64_le(PLP_NULL),
    }
}

/// Read a single byte constrained to 0 or 1.
pub fn read_bool(src: &mut impl Buf) -> Result<bool, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    match src.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProtocolError::InvalidValue("BIT byte must be 0 or 1")),
    }
}
