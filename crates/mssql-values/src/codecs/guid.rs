//! UNIQUEIDENTIFIER: 16 bytes in SQL Server's mixed byte order.

use bytes::BytesMut;
use tds_wire::codec::{read_guid, write_guid};
use tds_wire::types::{SqlServerType, TdsDataType, TypeInformation};
use uuid::Uuid;

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Codec for GUID columns.
#[derive(Debug)]
pub struct GuidCodec;

impl Codec for GuidCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::Guid && target == ValueKind::Uuid
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        if data.len() != 16 {
            return Err(CodecError::InvalidValue("GUID must be 16 bytes"));
        }
        let mut cursor = data;
        let rfc = read_guid(&mut cursor).map_err(|_| CodecError::UnexpectedEof {
            needed: 16,
            available: data.len(),
        })?;
        Ok(SqlValue::Uuid(Uuid::from_bytes(rfc)))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Uuid
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Uuid(uuid) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut bytes = BytesMut::with_capacity(18);
        bytes.extend_from_slice(&[16, 16]);
        write_guid(&mut bytes, uuid.as_bytes());
        Ok(Encoded::new(
            TdsDataType::Guid,
            bytes.freeze(),
            "uniqueidentifier",
        ))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::Guid, vec![16, 0], "uniqueidentifier")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::types::LengthStrategy;

    fn guid_type() -> TypeInformation {
        TypeInformation::builder(SqlServerType::Guid)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(16)
            .build()
    }

    #[test]
    fn roundtrip() {
        let uuid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let encoded = GuidCodec.encode(&SqlValue::Uuid(uuid)).unwrap();

        // Mixed endianness on the wire.
        assert_eq!(
            &encoded.bytes[2..6],
            &[0x33, 0x22, 0x11, 0x00]
        );

        let decoded = GuidCodec
            .decode(&encoded.bytes[2..], &guid_type(), ValueKind::Uuid)
            .unwrap();
        assert_eq!(decoded, SqlValue::Uuid(uuid));
    }

    #[test]
    fn rejects_short_guid() {
        assert!(GuidCodec
            .decode(&[0; 15], &guid_type(), ValueKind::Uuid)
            .is_err());
    }
}
