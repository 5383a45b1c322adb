//! BIT: one byte, 0 or 1.

use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for BIT columns.
#[derive(Debug)]
pub struct BitCodec;

impl Codec for BitCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::Bit && target == ValueKind::Bool
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        match data {
            [0] => Ok(SqlValue::Bool(false)),
            [1] => Ok(SqlValue::Bool(true)),
            [_] => Err(CodecError::InvalidValue("BIT byte must be 0 or 1")),
            _ => Err(CodecError::InvalidValue("BIT must be a single byte")),
        }
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Bool
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Bool(v) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };
        Ok(Encoded::new(
            TdsDataType::BitN,
            vec![0x01, 0x01, u8::from(*v)],
            "bit",
        ))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::BitN, vec![0x01, 0x00], "bit")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::types::LengthStrategy;

    fn bit_type() -> TypeInformation {
        TypeInformation::builder(SqlServerType::Bit)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(1)
            .build()
    }

    #[test]
    fn decodes_zero_and_one() {
        let ty = bit_type();
        assert_eq!(
            BitCodec.decode(&[0], &ty, ValueKind::Bool).unwrap(),
            SqlValue::Bool(false)
        );
        assert_eq!(
            BitCodec.decode(&[1], &ty, ValueKind::Bool).unwrap(),
            SqlValue::Bool(true)
        );
    }

    #[test]
    fn rejects_other_bytes() {
        assert!(BitCodec.decode(&[2], &bit_type(), ValueKind::Bool).is_err());
    }

    #[test]
    fn encode_roundtrip() {
        let encoded = BitCodec.encode(&SqlValue::Bool(true)).unwrap();
        assert_eq!(&encoded.bytes[..], &[0x01, 0x01, 0x01]);
        assert_eq!(encoded.formal_type, "bit");
    }
}
