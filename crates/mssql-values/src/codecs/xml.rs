//! XML: a UTF-16LE document under PLP framing.

use bytes::{BufMut, BytesMut};
use tds_wire::codec::{decode_utf16_bytes, write_utf16};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for XML columns.
#[derive(Debug)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::Xml
            && matches!(target, ValueKind::Xml | ValueKind::String)
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let text = decode_utf16_bytes(data).map_err(|_| CodecError::InvalidEncoding)?;
        Ok(match target {
            ValueKind::String => SqlValue::String(text),
            _ => SqlValue::Xml(text),
        })
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Xml
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Xml(text) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let byte_count = text.encode_utf16().count() * 2;
        let mut bytes = BytesMut::with_capacity(byte_count + 17);
        bytes.put_u8(0); // no schema collection
        bytes.put_u64_le(byte_count as u64);
        bytes.put_u32_le(byte_count as u32);
        write_utf16(&mut bytes, text);
        bytes.put_u32_le(0);

        Ok(Encoded::new(TdsDataType::Xml, bytes.freeze(), "xml"))
    }

    fn encode_null(&self) -> Encoded {
        let mut bytes = BytesMut::with_capacity(9);
        bytes.put_u8(0);
        bytes.put_u64_le(u64::MAX); // PLP NULL
        Encoded::new(TdsDataType::Xml, bytes.freeze(), "xml")
    }
}
