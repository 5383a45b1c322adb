//! Character data: CHAR / VARCHAR / TEXT in the collation charset,
//! NCHAR / NVARCHAR / NTEXT as UTF-16LE.

use bytes::{BufMut, BytesMut};
use tds_wire::codec::{decode_narrow, decode_utf16_bytes, write_utf16};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

const DEFAULT_COLLATION: [u8; 5] = [0x09, 0x04, 0xD0, 0x00, 0x34];

/// Codec for both string families.
#[derive(Debug)]
pub struct CharacterCodec;

impl Codec for CharacterCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        let server_type = ty.server_type();
        (server_type.is_narrow_character()
            || matches!(
                server_type,
                SqlServerType::NChar | SqlServerType::NVarChar | SqlServerType::NText
            ))
            && target == ValueKind::String
    }

    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let text = if ty.server_type().is_narrow_character() {
            decode_narrow(data, ty.charset())
        } else {
            decode_utf16_bytes(data).map_err(|_| CodecError::InvalidEncoding)?
        };
        Ok(SqlValue::String(text))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::String
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::String(text) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let char_count = text.encode_utf16().count();
        let byte_count = char_count * 2;
        let mut bytes = BytesMut::with_capacity(byte_count + 16);

        let formal = if char_count > 4000 {
            bytes.put_u16_le(0xFFFF);
            bytes.put_slice(&DEFAULT_COLLATION);
            bytes.put_u64_le(byte_count as u64);
            bytes.put_u32_le(byte_count as u32);
            write_utf16(&mut bytes, text);
            bytes.put_u32_le(0);
            "nvarchar(max)".to_string()
        } else {
            bytes.put_u16_le((char_count.max(1) * 2) as u16);
            bytes.put_slice(&DEFAULT_COLLATION);
            bytes.put_u16_le(byte_count as u16);
            write_utf16(&mut bytes, text);
            format!("nvarchar({})", char_count.max(1))
        };

        Ok(Encoded::new(TdsDataType::NVarChar, bytes.freeze(), formal))
    }

    fn encode_null(&self) -> Encoded {
        let mut bytes = BytesMut::with_capacity(9);
        bytes.put_u16_le(8000);
        bytes.put_slice(&DEFAULT_COLLATION);
        bytes.put_u16_le(0xFFFF);
        Encoded::new(TdsDataType::NVarChar, bytes.freeze(), "nvarchar(4000)")
    }
}
