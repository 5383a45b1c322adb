//! Codec dispatch.
//!
//! The registry is an ordered codec list; resolution picks the first codec
//! whose `can_decode` accepts the `(TypeInformation, ValueKind)` pair. The
//! order groups the common scalar families first.

use std::fmt;
use std::sync::OnceLock;

use bytes::{Buf, Bytes};
use tds_wire::codec::read_plp;
use tds_wire::token::{Column, RowValue};
use tds_wire::types::{Length, LengthStrategy, SqlServerType, TdsDataType, TypeInformation};

use crate::codecs;
use crate::error::CodecError;
use crate::value::{SqlValue, ValueKind};

/// An RPC-encoded parameter value: the wire data type token, the type
/// descriptor and value bytes that follow it, and the formal type used in
/// parameter declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// The wire data type token to announce.
    pub data_type: TdsDataType,
    /// Descriptor and value bytes following the type token. The descriptor
    /// announces the codec's maximum length, not the value's.
    pub bytes: Bytes,
    /// Formal type for declarations, e.g. `float` or `nvarchar(4000)`.
    pub formal_type: String,
}

impl Encoded {
    pub(crate) fn new(
        data_type: TdsDataType,
        bytes: impl Into<Bytes>,
        formal_type: impl Into<String>,
    ) -> Self {
        Self {
            data_type,
            bytes: bytes.into(),
            formal_type: formal_type.into(),
        }
    }
}

/// A codec for one SQL Server scalar family.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Whether this codec decodes the given column type into the given
    /// target kind.
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool;

    /// Decode non-null value bytes into the target kind. `data` holds
    /// exactly the value (PLP chunks already concatenated); type attributes
    /// come from `ty`.
    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError>;

    /// Whether this codec encodes values of the given kind.
    fn can_encode(&self, kind: ValueKind) -> bool;

    /// Encode a parameter value as type descriptor plus value bytes.
    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError>;

    /// Encode NULL for this codec's canonical type.
    fn encode_null(&self) -> Encoded;
}

/// The ordered codec table.
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

impl CodecRegistry {
    /// The built-in codec set covering every supported scalar family.
    fn with_standard_codecs() -> Self {
        Self {
            codecs: vec![
                Box::new(codecs::int::IntegerCodec),
                Box::new(codecs::bit::BitCodec),
                Box::new(codecs::float::FloatCodec),
                Box::new(codecs::decimal::DecimalCodec),
                Box::new(codecs::money::MoneyCodec),
                Box::new(codecs::temporal::DateCodec),
                Box::new(codecs::temporal::TimeCodec),
                Box::new(codecs::temporal::DateTimeCodec),
                Box::new(codecs::temporal::DateTimeOffsetCodec),
                Box::new(codecs::character::CharacterCodec),
                Box::new(codecs::binary::BinaryCodec),
                Box::new(codecs::guid::GuidCodec),
                Box::new(codecs::xml::XmlCodec),
            ],
        }
    }

    /// The process-wide registry.
    pub fn standard() -> &'static Self {
        static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_standard_codecs)
    }

    fn resolve(
        &self,
        ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<&dyn Codec, CodecError> {
        self.codecs
            .iter()
            .map(AsRef::as_ref)
            .find(|codec| codec.can_decode(ty, target))
            .ok_or(CodecError::TypeMismatch {
                server_type: ty.server_type().formal_name(),
                target: target.name(),
            })
    }

    /// Decode a value from a buffer positioned at its length prefix.
    pub fn decode(
        &self,
        buf: &mut Bytes,
        ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let codec = self.resolve(ty, target)?;

        if ty.length_strategy() == LengthStrategy::PartLen {
            return match read_plp(buf).map_err(wire_eof)? {
                Some(data) => codec.decode(&data, ty, target),
                None => Ok(SqlValue::Null),
            };
        }

        match Length::decode(buf, ty).map_err(wire_eof)? {
            Length::Null => Ok(SqlValue::Null),
            Length::Known(len) => {
                let len = len as usize;
                if buf.remaining() < len {
                    return Err(CodecError::UnexpectedEof {
                        needed: len,
                        available: buf.remaining(),
                    });
                }
                let data = buf.copy_to_bytes(len);
                codec.decode(&data, ty, target)
            }
            Length::UnknownPlp => Err(CodecError::InvalidValue(
                "chunked length outside a PLP column",
            )),
        }
    }

    /// Decode an already-extracted row value.
    pub fn decode_value(
        &self,
        value: &RowValue,
        ty: &TypeInformation,
        target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let codec = self.resolve(ty, target)?;
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        codec.decode(&value.data, ty, target)
    }

    /// Encode a parameter value, dispatching on the value's own kind.
    pub fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let kind = value.kind();
        self.codecs
            .iter()
            .find(|codec| codec.can_encode(kind))
            .ok_or(CodecError::Unencodable(kind.name()))?
            .encode(value)
    }

    /// Encode NULL for a parameter of the given kind.
    pub fn encode_null(&self, kind: ValueKind) -> Result<Encoded, CodecError> {
        Ok(self
            .codecs
            .iter()
            .find(|codec| codec.can_encode(kind))
            .ok_or(CodecError::Unencodable(kind.name()))?
            .encode_null())
    }
}

fn wire_eof(_: tds_wire::ProtocolError) -> CodecError {
    CodecError::UnexpectedEof {
        needed: 1,
        available: 0,
    }
}

/// Decode a value from a buffer using the standard registry.
pub fn decode(
    buf: &mut Bytes,
    column: &Column,
    target: ValueKind,
) -> Result<SqlValue, CodecError> {
    CodecRegistry::standard().decode(buf, &column.type_info, target)
}

/// Decode a row value using the standard registry.
pub fn decode_column(
    value: &RowValue,
    column: &Column,
    target: ValueKind,
) -> Result<SqlValue, CodecError> {
    CodecRegistry::standard().decode_value(value, &column.type_info, target)
}

/// Encode a parameter value using the standard registry.
pub fn encode(value: &SqlValue) -> Result<Encoded, CodecError> {
    CodecRegistry::standard().encode(value)
}

/// Encode a NULL parameter of the given kind using the standard registry.
pub fn encode_null(kind: ValueKind) -> Result<Encoded, CodecError> {
    CodecRegistry::standard().encode_null(kind)
}

/// The default target kind a column decodes to.
#[must_use]
pub fn value_kind(ty: &TypeInformation) -> ValueKind {
    match ty.server_type() {
        SqlServerType::TinyInt => ValueKind::TinyInt,
        SqlServerType::SmallInt => ValueKind::SmallInt,
        SqlServerType::Int => ValueKind::Int,
        SqlServerType::BigInt => ValueKind::BigInt,
        SqlServerType::Bit => ValueKind::Bool,
        SqlServerType::Real => ValueKind::Real,
        SqlServerType::Float => ValueKind::Double,
        SqlServerType::Decimal
        | SqlServerType::Numeric
        | SqlServerType::Money
        | SqlServerType::SmallMoney => ValueKind::Decimal,
        SqlServerType::Date => ValueKind::Date,
        SqlServerType::Time => ValueKind::Time,
        SqlServerType::DateTime2
        | SqlServerType::DateTime
        | SqlServerType::SmallDateTime => ValueKind::DateTime,
        SqlServerType::DateTimeOffset => ValueKind::DateTimeOffset,
        SqlServerType::Char
        | SqlServerType::VarChar
        | SqlServerType::Text
        | SqlServerType::NChar
        | SqlServerType::NVarChar
        | SqlServerType::NText => ValueKind::String,
        SqlServerType::Binary
        | SqlServerType::VarBinary
        | SqlServerType::Image
        | SqlServerType::Udt => ValueKind::Binary,
        SqlServerType::Guid => ValueKind::Uuid,
        SqlServerType::Xml => ValueKind::Xml,
    }
}
