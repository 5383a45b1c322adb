//! MONEY / SMALLMONEY: integers in 1/10000 currency units.
//!
//! The 8-byte form stores the high dword before the low dword, both
//! little-endian; the 4-byte form is a plain little-endian integer. Under
//! the BYTELEN strategy a value length of 8 means money and 4 smallmoney.

use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

const MONEY_SCALE: u32 = 4;

/// Codec for the money family.
#[derive(Debug)]
pub struct MoneyCodec;

impl Codec for MoneyCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        matches!(
            ty.server_type(),
            SqlServerType::Money | SqlServerType::SmallMoney
        ) && target == ValueKind::Decimal
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let units: i64 = match data.len() {
            8 => {
                let high = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let low = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
                ((u64::from(high) << 32) | u64::from(low)) as i64
            }
            4 => i64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            _ => return Err(CodecError::InvalidValue("invalid money width")),
        };

        let value = Decimal::try_from_i128_with_scale(i128::from(units), MONEY_SCALE)
            .map_err(|_| CodecError::OutOfRange("money overflow"))?;
        Ok(SqlValue::Decimal(value))
    }

    // Decimal parameters encode through the decimal codec; this codec's
    // encoder produces the money wire form when addressed directly.
    fn can_encode(&self, _kind: ValueKind) -> bool {
        false
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Decimal(v) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut scaled = *v;
        scaled.rescale(MONEY_SCALE);
        let units = i64::try_from(scaled.mantissa())
            .map_err(|_| CodecError::OutOfRange("money overflow"))?;

        let mut bytes = BytesMut::with_capacity(10);
        bytes.put_u8(8);
        bytes.put_u8(8);
        let raw = units as u64;
        bytes.put_u32_le((raw >> 32) as u32);
        bytes.put_u32_le(raw as u32);

        Ok(Encoded::new(TdsDataType::MoneyN, bytes.freeze(), "money"))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::MoneyN, vec![0x08, 0x00], "money")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tds_wire::types::LengthStrategy;

    fn money_type(server_type: SqlServerType, width: u32) -> TypeInformation {
        TypeInformation::builder(server_type)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(width)
            .build()
    }

    #[test]
    fn decodes_money() {
        // 50.0000 -> 500000 units, entirely in the low dword.
        let ty = money_type(SqlServerType::Money, 8);
        let data = [0x00, 0x00, 0x00, 0x00, 0x20, 0xA1, 0x07, 0x00];

        let value = MoneyCodec.decode(&data, &ty, ValueKind::Decimal).unwrap();
        assert_eq!(
            value,
            SqlValue::Decimal(Decimal::from_str("50.0000").unwrap())
        );
    }

    #[test]
    fn decodes_smallmoney() {
        let ty = money_type(SqlServerType::SmallMoney, 4);
        let data = (-12_345i32).to_le_bytes();

        let value = MoneyCodec.decode(&data, &ty, ValueKind::Decimal).unwrap();
        assert_eq!(
            value,
            SqlValue::Decimal(Decimal::from_str("-1.2345").unwrap())
        );
    }

    #[test]
    fn money_roundtrip() {
        let original = Decimal::from_str("-42.5000").unwrap();
        let encoded = MoneyCodec.encode(&SqlValue::Decimal(original)).unwrap();
        assert_eq!(encoded.data_type, TdsDataType::MoneyN);

        let ty = money_type(SqlServerType::Money, 8);
        let decoded = MoneyCodec
            .decode(&encoded.bytes[2..], &ty, ValueKind::Decimal)
            .unwrap();
        assert_eq!(decoded, SqlValue::Decimal(original));
    }

    #[test]
    fn rejects_odd_width() {
        let ty = money_type(SqlServerType::Money, 8);
        assert!(MoneyCodec.decode(&[0; 3], &ty, ValueKind::Decimal).is_err());
    }
}
