//! REAL and FLOAT: IEEE 754 little-endian.

use bytes::{BufMut, BytesMut};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for the floating point family.
#[derive(Debug)]
pub struct FloatCodec;

impl Codec for FloatCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        match (ty.server_type(), target) {
            (SqlServerType::Real, ValueKind::Real | ValueKind::Double) => true,
            (SqlServerType::Float, ValueKind::Double) => true,
            _ => false,
        }
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let value = match data.len() {
            4 => f64::from(f32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            8 => f64::from_le_bytes(
                data.try_into()
                    .map_err(|_| CodecError::InvalidValue("invalid float width"))?,
            ),
            _ => return Err(CodecError::InvalidValue("invalid float width")),
        };

        Ok(match target {
            ValueKind::Real => SqlValue::Real(value as f32),
            _ => SqlValue::Double(value),
        })
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        matches!(kind, ValueKind::Real | ValueKind::Double)
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let mut bytes = BytesMut::with_capacity(10);
        let formal = match value {
            SqlValue::Real(v) => {
                bytes.put_u8(4);
                bytes.put_u8(4);
                bytes.put_f32_le(*v);
                "real"
            }
            SqlValue::Double(v) => {
                bytes.put_u8(8);
                bytes.put_u8(8);
                bytes.put_f64_le(*v);
                "float"
            }
            other => return Err(CodecError::Unencodable(other.kind().name())),
        };

        Ok(Encoded::new(TdsDataType::FloatN, bytes.freeze(), formal))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::FloatN, vec![0x08, 0x00], "float")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::types::LengthStrategy;

    fn float_type(server_type: SqlServerType, width: u32) -> TypeInformation {
        TypeInformation::builder(server_type)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(width)
            .build()
    }

    #[test]
    fn encode_double_wire_bytes() {
        let encoded = FloatCodec.encode(&SqlValue::Double(11344.554)).unwrap();
        assert_eq!(encoded.data_type, TdsDataType::FloatN);
        assert_eq!(
            &encoded.bytes[..],
            &[0x08, 0x08, 0xFE, 0xD4, 0x78, 0xE9, 0x46, 0x28, 0xC6, 0x40]
        );
        assert_eq!(encoded.formal_type, "float");
    }

    #[test]
    fn encode_null_wire_bytes() {
        let encoded = FloatCodec.encode_null();
        assert_eq!(&encoded.bytes[..], &[0x08, 0x00]);
        assert_eq!(encoded.formal_type, "float");
    }

    #[test]
    fn decode_double() {
        let ty = float_type(SqlServerType::Float, 8);
        let value = FloatCodec
            .decode(
                &[0xFE, 0xD4, 0x78, 0xE9, 0x46, 0x28, 0xC6, 0x40],
                &ty,
                ValueKind::Double,
            )
            .unwrap();
        let SqlValue::Double(v) = value else {
            panic!("expected double");
        };
        assert!((v - 11344.554).abs() < 0.01);
    }

    #[test]
    fn decode_real_as_double() {
        let ty = float_type(SqlServerType::Real, 4);
        let value = FloatCodec
            .decode(&[0x37, 0x42, 0x31, 0x46], &ty, ValueKind::Double)
            .unwrap();
        let SqlValue::Double(v) = value else {
            panic!("expected double");
        };
        assert!((v - 11344.554).abs() < 0.01);
    }

    #[test]
    fn float_does_not_narrow() {
        let ty = float_type(SqlServerType::Float, 8);
        assert!(!FloatCodec.can_decode(&ty, ValueKind::Real));
        assert!(FloatCodec.can_decode(&float_type(SqlServerType::Real, 4), ValueKind::Real));
    }
}
