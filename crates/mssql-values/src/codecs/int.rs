//! Integer family: TINYINT, SMALLINT, INT, BIGINT.
//!
//! Fixed-width little-endian values; the nullable wire form carries a
//! 1-byte length where 0 means NULL (handled before the codec is reached).
//! Decoding widens but never narrows.

use bytes::{BufMut, BytesMut};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for the four integer widths.
#[derive(Debug)]
pub struct IntegerCodec;

fn width_of(server_type: SqlServerType) -> Option<usize> {
    match server_type {
        SqlServerType::TinyInt => Some(1),
        SqlServerType::SmallInt => Some(2),
        SqlServerType::Int => Some(4),
        SqlServerType::BigInt => Some(8),
        _ => None,
    }
}

fn target_width(target: ValueKind) -> Option<usize> {
    match target {
        ValueKind::TinyInt => Some(1),
        ValueKind::SmallInt => Some(2),
        ValueKind::Int => Some(4),
        ValueKind::BigInt => Some(8),
        _ => None,
    }
}

impl Codec for IntegerCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        match (width_of(ty.server_type()), target_width(target)) {
            (Some(column), Some(requested)) => requested >= column,
            _ => false,
        }
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let raw = match data.len() {
            1 => i64::from(data[0]),
            2 => i64::from(i16::from_le_bytes([data[0], data[1]])),
            4 => i64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            8 => i64::from_le_bytes(
                data.try_into()
                    .map_err(|_| CodecError::InvalidValue("invalid integer width"))?,
            ),
            _ => return Err(CodecError::InvalidValue("invalid integer width")),
        };

        Ok(match target {
            ValueKind::TinyInt => SqlValue::TinyInt(raw as u8),
            ValueKind::SmallInt => SqlValue::SmallInt(raw as i16),
            ValueKind::Int => SqlValue::Int(raw as i32),
            _ => SqlValue::BigInt(raw),
        })
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        target_width(kind).is_some()
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let mut bytes = BytesMut::with_capacity(10);
        let formal = match value {
            SqlValue::TinyInt(v) => {
                bytes.put_u8(1);
                bytes.put_u8(1);
                bytes.put_u8(*v);
                "tinyint"
            }
            SqlValue::SmallInt(v) => {
                bytes.put_u8(2);
                bytes.put_u8(2);
                bytes.put_i16_le(*v);
                "smallint"
            }
            SqlValue::Int(v) => {
                bytes.put_u8(4);
                bytes.put_u8(4);
                bytes.put_i32_le(*v);
                "int"
            }
            SqlValue::BigInt(v) => {
                bytes.put_u8(8);
                bytes.put_u8(8);
                bytes.put_i64_le(*v);
                "bigint"
            }
            other => return Err(CodecError::Unencodable(other.kind().name())),
        };

        Ok(Encoded::new(TdsDataType::IntN, bytes.freeze(), formal))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::IntN, vec![0x04, 0x00], "int")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::types::LengthStrategy;

    fn int_type(server_type: SqlServerType, width: u32) -> TypeInformation {
        TypeInformation::builder(server_type)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(width)
            .build()
    }

    #[test]
    fn widening_only() {
        let codec = IntegerCodec;
        let int = int_type(SqlServerType::Int, 4);
        assert!(codec.can_decode(&int, ValueKind::Int));
        assert!(codec.can_decode(&int, ValueKind::BigInt));
        assert!(!codec.can_decode(&int, ValueKind::SmallInt));
        assert!(!codec.can_decode(&int, ValueKind::Double));
    }

    #[test]
    fn decodes_each_width() {
        let codec = IntegerCodec;

        let tiny = int_type(SqlServerType::TinyInt, 1);
        assert_eq!(
            codec.decode(&[0xFF], &tiny, ValueKind::TinyInt).unwrap(),
            SqlValue::TinyInt(255)
        );

        let small = int_type(SqlServerType::SmallInt, 2);
        assert_eq!(
            codec
                .decode(&[0xFE, 0xFF], &small, ValueKind::SmallInt)
                .unwrap(),
            SqlValue::SmallInt(-2)
        );

        let int = int_type(SqlServerType::Int, 4);
        assert_eq!(
            codec
                .decode(&[0x2A, 0, 0, 0], &int, ValueKind::Int)
                .unwrap(),
            SqlValue::Int(42)
        );

        let big = int_type(SqlServerType::BigInt, 8);
        assert_eq!(
            codec
                .decode(&[1, 0, 0, 0, 0, 0, 0, 0x80], &big, ValueKind::BigInt)
                .unwrap(),
            SqlValue::BigInt(i64::MIN + 1)
        );
    }

    #[test]
    fn widens_to_requested_kind() {
        let codec = IntegerCodec;
        let small = int_type(SqlServerType::SmallInt, 2);
        assert_eq!(
            codec
                .decode(&[0x05, 0x00], &small, ValueKind::BigInt)
                .unwrap(),
            SqlValue::BigInt(5)
        );
    }

    #[test]
    fn encode_int() {
        let encoded = IntegerCodec.encode(&SqlValue::Int(42)).unwrap();
        assert_eq!(encoded.data_type, TdsDataType::IntN);
        assert_eq!(&encoded.bytes[..], &[0x04, 0x04, 0x2A, 0, 0, 0]);
        assert_eq!(encoded.formal_type, "int");
    }

    #[test]
    fn encode_null_is_zero_length() {
        let encoded = IntegerCodec.encode_null();
        assert_eq!(&encoded.bytes[..], &[0x04, 0x00]);
    }
}
