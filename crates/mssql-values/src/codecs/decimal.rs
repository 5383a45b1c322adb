//! DECIMAL / NUMERIC: sign byte plus little-endian magnitude.

use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for exact numerics.
#[derive(Debug)]
pub struct DecimalCodec;

impl Codec for DecimalCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        matches!(
            ty.server_type(),
            SqlServerType::Decimal | SqlServerType::Numeric
        ) && target == ValueKind::Decimal
    }

    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let (sign, magnitude) = data
            .split_first()
            .ok_or(CodecError::UnexpectedEof {
                needed: 1,
                available: 0,
            })?;

        if ty.precision() > 38 || magnitude.len() > 16 {
            return Err(CodecError::OutOfRange("decimal wider than 38 digits"));
        }

        let mut le = [0u8; 16];
        le[..magnitude.len()].copy_from_slice(magnitude);
        let unsigned = u128::from_le_bytes(le);
        let mantissa = i128::try_from(unsigned)
            .map_err(|_| CodecError::OutOfRange("decimal magnitude overflow"))?;

        let mut value = Decimal::try_from_i128_with_scale(mantissa, u32::from(ty.scale()))
            .map_err(|_| CodecError::OutOfRange("decimal magnitude overflow"))?;
        // Sign byte: 0 is negative, nonzero is positive.
        value.set_sign_negative(*sign == 0);

        Ok(SqlValue::Decimal(value))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Decimal
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Decimal(v) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let scale = v.scale() as u8;
        let magnitude = v.mantissa().unsigned_abs();

        let mut bytes = BytesMut::with_capacity(21);
        bytes.put_u8(17); // max length
        bytes.put_u8(38); // precision
        bytes.put_u8(scale);
        bytes.put_u8(17); // value length: sign + 16-byte magnitude
        bytes.put_u8(if v.is_sign_negative() { 0 } else { 1 });
        bytes.put_slice(&magnitude.to_le_bytes());

        Ok(Encoded::new(
            TdsDataType::DecimalN,
            bytes.freeze(),
            format!("decimal(38,{scale})"),
        ))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(
            TdsDataType::DecimalN,
            vec![17, 38, 0, 0],
            "decimal(38,0)",
        )
    }
}
