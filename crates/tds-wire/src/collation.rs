//! SQL Server collation handling.
//!
//! A collation travels as 5 bytes: a 32-bit little-endian field packing the
//! LCID, comparison flags and version, followed by a sort id. For narrow
//! (non-Unicode) string columns the collation determines the character set
//! used on the wire; Unicode columns are always UTF-16LE.
//!
//! The LCID to code page assignments mirror the documented Windows tables
//! (MS-LCID); unrecognized locales fall back to Windows-1252, which is what
//! the server itself assumes for legacy collations.

use bytes::{Buf, BufMut};
use encoding_rs::Encoding;

use crate::error::ProtocolError;

/// Flag bit set for UTF-8 collations (SQL Server 2019+).
pub const COLLATION_FLAG_UTF8: u32 = 0x0800_0000;

/// The lower 20 bits of the info field hold the LCID.
pub const LCID_MASK: u32 = 0x000F_FFFF;

/// Wire size of a collation.
pub const COLLATION_SIZE: usize = 5;

/// A SQL Server collation as it appears in type descriptors and ENVCHANGE
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collation {
    /// Packed LCID, comparison flags and version.
    pub lcid: u32,
    /// Sort id, nonzero for SQL collations.
    pub sort_id: u8,
}

impl Collation {
    /// Decode the 5-byte wire form.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < COLLATION_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }
        let lcid = src.get_u32_le();
        let sort_id = src.get_u8();
        Ok(Self { lcid, sort_id })
    }

    /// Encode the 5-byte wire form.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.lcid);
        dst.put_u8(self.sort_id);
    }

    /// Decode a collation from an ENVCHANGE value payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < COLLATION_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }
        let mut cursor = bytes;
        Self::decode(&mut cursor)
    }

    /// Whether this collation stores narrow data as UTF-8 (no transcoding).
    #[must_use]
    pub fn is_utf8(&self) -> bool {
        self.lcid & COLLATION_FLAG_UTF8 != 0
    }

    /// The character set used by narrow string columns under this collation.
    ///
    /// Returns `None` for UTF-8 collations; unknown LCIDs map to
    /// Windows-1252.
    #[must_use]
    pub fn encoding(&self) -> Option<&'static Encoding> {
        if self.is_utf8() {
            return None;
        }
        Some(encoding_for_code_page(self.code_page()))
    }

    /// The Windows code page backing this collation.
    #[must_use]
    pub fn code_page(&self) -> u16 {
        if self.is_utf8() {
            return 65001;
        }
        code_page_for_lcid(self.lcid & 0xFFFF)
    }
}

/// Map a primary LCID to its Windows code page.
fn code_page_for_lcid(lcid: u32) -> u16 {
    match lcid {
        // East Asian locales with dedicated multibyte code pages.
        0x0411 => 932,                            // Japanese
        0x0804 | 0x1004 => 936,                   // Chinese (Simplified)
        0x0404 | 0x0C04 | 0x1404 => 950,          // Chinese (Traditional)
        0x0412 => 949,                            // Korean
        0x041E => 874,                            // Thai
        0x042A => 1258,                           // Vietnamese

        // Central and Eastern European.
        0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x101A | 0x141A | 0x041B | 0x0424
        | 0x0418 | 0x041C => 1250,

        // Cyrillic.
        0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x201A | 0x0440 | 0x0843
        | 0x0444 | 0x0450 | 0x0485 => 1251,

        0x0408 => 1253,                           // Greek
        0x041F | 0x042C => 1254,                  // Turkish, Azerbaijani (Latin)
        0x040D => 1255,                           // Hebrew

        // Arabic script locales.
        0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401
        | 0x2801 | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0429 | 0x0420
        | 0x048C | 0x0463 => 1256,

        0x0425..=0x0427 => 1257,                  // Estonian, Latvian, Lithuanian

        // Everything else is Western European.
        _ => 1252,
    }
}

/// Map a Windows code page to an `encoding_rs` encoding.
fn encoding_for_code_page(code_page: u16) -> &'static Encoding {
    match code_page {
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GB18030,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        65001 => encoding_rs::UTF_8,
        _ => encoding_rs::WINDOWS_1252,
    }
}
