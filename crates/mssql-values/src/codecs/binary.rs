//! Binary data: BINARY / VARBINARY / IMAGE and opaque UDT bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for the binary family.
#[derive(Debug)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        matches!(
            ty.server_type(),
            SqlServerType::Binary
                | SqlServerType::VarBinary
                | SqlServerType::Image
                | SqlServerType::Udt
        ) && target == ValueKind::Binary
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(data)))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Binary
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Binary(data) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut bytes = BytesMut::with_capacity(data.len() + 16);
        let formal = if data.len() > 8000 {
            bytes.put_u16_le(0xFFFF);
            bytes.put_u64_le(data.len() as u64);
            bytes.put_u32_le(data.len() as u32);
            bytes.put_slice(data);
            bytes.put_u32_le(0);
            "varbinary(max)".to_string()
        } else {
            bytes.put_u16_le(data.len().max(1) as u16);
            bytes.put_u16_le(data.len() as u16);
            bytes.put_slice(data);
            format!("varbinary({})", data.len().max(1))
        };

        Ok(Encoded::new(
            TdsDataType::BigVarBinary,
            bytes.freeze(),
            formal,
        ))
    }

    fn encode_null(&self) -> Encoded {
        let mut bytes = BytesMut::with_capacity(4);
        bytes.put_u16_le(8000);
        bytes.put_u16_le(0xFFFF);
        Encoded::new(TdsDataType::BigVarBinary, bytes.freeze(), "varbinary(8000)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::types::LengthStrategy;

    #[test]
    fn decode_copies_bytes() {
        let ty = TypeInformation::builder(SqlServerType::VarBinary)
            .length_strategy(LengthStrategy::UShortLen)
            .max_length(100)
            .build();
        let value = BinaryCodec
            .decode(&[1, 2, 3], &ty, ValueKind::Binary)
            .unwrap();
        assert_eq!(value, SqlValue::Binary(Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn encode_small_binary() {
        let encoded = BinaryCodec
            .encode(&SqlValue::Binary(Bytes::from_static(&[0xDE, 0xAD])))
            .unwrap();
        assert_eq!(encoded.data_type, TdsDataType::BigVarBinary);
        assert_eq!(&encoded.bytes[..], &[2, 0, 2, 0, 0xDE, 0xAD]);
        assert_eq!(encoded.formal_type, "varbinary(2)");
    }

    #[test]
    fn large_binary_goes_plp() {
        let data = Bytes::from(vec![7u8; 9000]);
        let encoded = BinaryCodec.encode(&SqlValue::Binary(data)).unwrap();
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xFF]);
        assert_eq!(encoded.formal_type, "varbinary(max)");
    }
}
