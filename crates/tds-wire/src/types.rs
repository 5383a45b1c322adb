//! The TDS type system.
//!
//! A column or parameter is described by a [`TypeInformation`]: the logical
//! server type, the length strategy its values use on the wire, and the
//! type-specific attributes (max length, precision/scale, collation). Ahead
//! of every value the wire carries a [`Length`] encoded per the strategy.

use bytes::{Buf, BufMut};

use crate::codec::{read_us_varchar, PLP_NULL, PLP_UNKNOWN};
use crate::collation::Collation;
use crate::error::ProtocolError;

/// Raw TDS data type tokens as they appear in type descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TdsDataType {
    /// 1-byte unsigned integer.
    Int1 = 0x30,
    /// Non-nullable bit.
    Bit = 0x32,
    /// 2-byte signed integer.
    Int2 = 0x34,
    /// 4-byte signed integer.
    Int4 = 0x38,
    /// 8-byte signed integer.
    Int8 = 0x7F,
    /// Nullable integer, width in the descriptor.
    IntN = 0x26,
    /// Nullable bit.
    BitN = 0x68,
    /// 4-byte IEEE 754 float.
    Float4 = 0x3B,
    /// 8-byte IEEE 754 float.
    Float8 = 0x3E,
    /// Nullable float, width in the descriptor.
    FloatN = 0x6D,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// Nullable money, width in the descriptor.
    MoneyN = 0x6E,
    /// Legacy decimal.
    Decimal = 0x37,
    /// Legacy numeric.
    Numeric = 0x3F,
    /// Nullable decimal.
    DecimalN = 0x6A,
    /// Nullable numeric.
    NumericN = 0x6C,
    /// Legacy 8-byte datetime.
    DateTime = 0x3D,
    /// Legacy 4-byte smalldatetime.
    DateTime4 = 0x3A,
    /// Nullable legacy datetime, width in the descriptor.
    DateTimeN = 0x6F,
    /// 3-byte date.
    Date = 0x28,
    /// Time with fractional-second scale.
    Time = 0x29,
    /// Datetime2 with fractional-second scale.
    DateTime2 = 0x2A,
    /// Datetimeoffset with fractional-second scale.
    DateTimeOffset = 0x2B,
    /// Unique identifier.
    Guid = 0x24,
    /// Large variable-length narrow string.
    BigVarChar = 0xA7,
    /// Large fixed-length narrow string.
    BigChar = 0xAF,
    /// Large variable-length binary.
    BigVarBinary = 0xA5,
    /// Large fixed-length binary.
    BigBinary = 0xAD,
    /// Variable-length Unicode string.
    NVarChar = 0xE7,
    /// Fixed-length Unicode string.
    NChar = 0xEF,
    /// Legacy narrow LOB.
    Text = 0x23,
    /// Legacy Unicode LOB.
    NText = 0x63,
    /// Legacy binary LOB.
    Image = 0x22,
    /// XML document.
    Xml = 0xF1,
    /// User-defined type.
    Udt = 0xF0,
}

impl TdsDataType {
    /// Parse a data type token, rejecting anything outside the grammar.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x30 => Ok(Self::Int1),
            0x32 => Ok(Self::Bit),
            0x34 => Ok(Self::Int2),
            0x38 => Ok(Self::Int4),
            0x7F => Ok(Self::Int8),
            0x26 => Ok(Self::IntN),
            0x68 => Ok(Self::BitN),
            0x3B => Ok(Self::Float4),
            0x3E => Ok(Self::Float8),
            0x6D => Ok(Self::FloatN),
            0x3C => Ok(Self::Money),
            0x7A => Ok(Self::Money4),
            0x6E => Ok(Self::MoneyN),
            0x37 => Ok(Self::Decimal),
            0x3F => Ok(Self::Numeric),
            0x6A => Ok(Self::DecimalN),
            0x6C => Ok(Self::NumericN),
            0x3D => Ok(Self::DateTime),
            0x3A => Ok(Self::DateTime4),
            0x6F => Ok(Self::DateTimeN),
            0x28 => Ok(Self::Date),
            0x29 => Ok(Self::Time),
            0x2A => Ok(Self::DateTime2),
            0x2B => Ok(Self::DateTimeOffset),
            0x24 => Ok(Self::Guid),
            0xA7 => Ok(Self::BigVarChar),
            0xAF => Ok(Self::BigChar),
            0xA5 => Ok(Self::BigVarBinary),
            0xAD => Ok(Self::BigBinary),
            0xE7 => Ok(Self::NVarChar),
            0xEF => Ok(Self::NChar),
            0x23 => Ok(Self::Text),
            0x63 => Ok(Self::NText),
            0x22 => Ok(Self::Image),
            0xF1 => Ok(Self::Xml),
            0xF0 => Ok(Self::Udt),
            other => Err(ProtocolError::UnknownDataType(other)),
        }
    }
}

/// Logical SQL Server scalar type of a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlServerType {
    /// 1-byte unsigned integer.
    TinyInt,
    /// 2-byte signed integer.
    SmallInt,
    /// 4-byte signed integer.
    Int,
    /// 8-byte signed integer.
    BigInt,
    /// Single bit.
    Bit,
    /// 4-byte IEEE 754.
    Real,
    /// 8-byte IEEE 754.
    Float,
    /// 4-byte currency in 1/10000 units.
    SmallMoney,
    /// 8-byte currency in 1/10000 units.
    Money,
    /// Exact numeric with precision and scale.
    Decimal,
    /// Exact numeric with precision and scale.
    Numeric,
    /// Calendar date.
    Date,
    /// Time of day with fractional-second scale.
    Time,
    /// Date and time with fractional-second scale.
    DateTime2,
    /// Date, time and timezone offset.
    DateTimeOffset,
    /// Legacy 4-byte date and time.
    SmallDateTime,
    /// Legacy 8-byte date and time.
    DateTime,
    /// Fixed-length narrow string.
    Char,
    /// Variable-length narrow string.
    VarChar,
    /// Legacy narrow LOB.
    Text,
    /// Fixed-length Unicode string.
    NChar,
    /// Variable-length Unicode string.
    NVarChar,
    /// Legacy Unicode LOB.
    NText,
    /// Fixed-length binary.
    Binary,
    /// Variable-length binary.
    VarBinary,
    /// Legacy binary LOB.
    Image,
    /// Unique identifier.
    Guid,
    /// XML document.
    Xml,
    /// User-defined type.
    Udt,
}

impl SqlServerType {
    /// Fixed value width in bytes, for FIXEDLEN types.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::TinyInt | Self::Bit => Some(1),
            Self::SmallInt => Some(2),
            Self::Int | Self::Real | Self::SmallMoney | Self::SmallDateTime => Some(4),
            Self::BigInt | Self::Float | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// The formal (declaration) name of the type, without arguments.
    #[must_use]
    pub const fn formal_name(self) -> &'static str {
        match self {
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Bit => "bit",
            Self::Real => "real",
            Self::Float => "float",
            Self::SmallMoney => "smallmoney",
            Self::Money => "money",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime2 => "datetime2",
            Self::DateTimeOffset => "datetimeoffset",
            Self::SmallDateTime => "smalldatetime",
            Self::DateTime => "datetime",
            Self::Char => "char",
            Self::VarChar => "varchar",
            Self::Text => "text",
            Self::NChar => "nchar",
            Self::NVarChar => "nvarchar",
            Self::NText => "ntext",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
            Self::Image => "image",
            Self::Guid => "uniqueidentifier",
            Self::Xml => "xml",
            Self::Udt => "udt",
        }
    }

    /// Whether values are character data in the collation charset.
    #[must_use]
    pub const fn is_narrow_character(self) -> bool {
        matches!(self, Self::Char | Self::VarChar | Self::Text)
    }

    /// Whether values are UTF-16LE character data.
    #[must_use]
    pub const fn is_unicode_character(self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText | Self::Xml)
    }
}

/// How the length of a value is carried ahead of its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthStrategy {
    /// No prefix; the width is implied by the type.
    FixedLen,
    /// 1-byte length; 0 is NULL for nullable variants.
    ByteLen,
    /// 2-byte LE length; 0xFFFF is NULL.
    UShortLen,
    /// 4-byte LE length; 0xFFFFFFFF is NULL.
    LongLen,
    /// 8-byte LE header with chunked data (PLP).
    PartLen,
}

/// The parsed length of one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// The value is NULL; no data bytes follow.
    Null,
    /// The value spans exactly this many bytes.
    Known(u32),
    /// A PLP value of undeclared total length; data arrives in chunks.
    UnknownPlp,
}

impl Length {
    /// Decode a length prefix per the type's strategy.
    ///
    /// For `PartLen` this consumes only the 8-byte header; the chunk stream
    /// that follows is the caller's to read.
    pub fn decode(src: &mut impl Buf, ty: &TypeInformation) -> Result<Self, ProtocolError> {
        match ty.length_strategy() {
            LengthStrategy::FixedLen => Ok(Self::Known(ty.max_length())),
            LengthStrategy::ByteLen => {
                if src.remaining() < 1 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                match src.get_u8() {
                    0 => Ok(Self::Null),
                    n => Ok(Self::Known(u32::from(n))),
                }
            }
            LengthStrategy::UShortLen => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                match src.get_u16_le() {
                    0xFFFF => Ok(Self::Null),
                    n => Ok(Self::Known(u32::from(n))),
                }
            }
            LengthStrategy::LongLen => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                match src.get_u32_le() {
                    0xFFFF_FFFF => Ok(Self::Null),
                    n => Ok(Self::Known(n)),
                }
            }
            LengthStrategy::PartLen => {
                if src.remaining() < 8 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                match src.get_u64_le() {
                    PLP_NULL => Ok(Self::Null),
                    PLP_UNKNOWN => Ok(Self::UnknownPlp),
                    n => match u32::try_from(n) {
                        Ok(n) => Ok(Self::Known(n)),
                        Err(_) => Ok(Self::UnknownPlp),
                    },
                }
            }
        }
    }

    /// Encode a length prefix per the type's strategy.
    pub fn encode(&self, dst: &mut impl BufMut, ty: &TypeInformation) {
        match ty.length_strategy() {
            LengthStrategy::FixedLen => {}
            LengthStrategy::ByteLen => match self {
                Self::Null => dst.put_u8(0),
                Self::Known(n) => dst.put_u8(*n as u8),
                Self::UnknownPlp => dst.put_u8(0),
            },
            LengthStrategy::UShortLen => match self {
                Self::Null => dst.put_u16_le(0xFFFF),
                Self::Known(n) => dst.put_u16_le(*n as u16),
                Self::UnknownPlp => dst.put_u16_le(0xFFFF),
            },
            LengthStrategy::LongLen => match self {
                Self::Null => dst.put_u32_le(0xFFFF_FFFF),
                Self::Known(n) => dst.put_u32_le(*n),
                Self::UnknownPlp => dst.put_u32_le(0xFFFF_FFFF),
            },
            LengthStrategy::PartLen => match self {
                Self::Null => dst.put_u64_le(PLP_NULL),
                Self::Known(n) => dst.put_u64_le(u64::from(*n)),
                Self::UnknownPlp => dst.put_u64_le(PLP_UNKNOWN),
            },
        }
    }

    /// Whether the value is NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Width of a TIME value in bytes for a given fractional-second scale.
pub const fn time_value_width(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

/// Sentinel max-length announcing a PLP (MAX) variant of a USHORTLEN type.
pub const MAX_SENTINEL: u16 = 0xFFFF;

/// Immutable description of a column or parameter type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInformation {
    server_type: SqlServerType,
    length_strategy: LengthStrategy,
    max_length: u32,
    precision: u8,
    scale: u8,
    flags: u16,
    collation: Option<Collation>,
    udt_type_name: Option<String>,
}

impl TypeInformation {
    /// Start building a type description.
    #[must_use]
    pub fn builder(server_type: SqlServerType) -> TypeInformationBuilder {
        TypeInformationBuilder::new(server_type)
    }

    /// The logical server type.
    #[must_use]
    pub fn server_type(&self) -> SqlServerType {
        self.server_type
    }

    /// The length strategy values of this type use.
    #[must_use]
    pub fn length_strategy(&self) -> LengthStrategy {
        self.length_strategy
    }

    /// Maximum value length in bytes.
    #[must_use]
    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Precision for the decimal family, 0 otherwise.
    #[must_use]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Scale for the decimal and time families, 0 otherwise.
    #[must_use]
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Raw column flags from the metadata.
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Whether the column is declared nullable.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    /// Collation for string types.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    /// Charset for narrow string values, derived from the collation.
    #[must_use]
    pub fn charset(&self) -> Option<&'static encoding_rs::Encoding> {
        self.collation.and_then(|c| c.encoding())
    }

    /// Type name for UDT columns.
    #[must_use]
    pub fn udt_type_name(&self) -> Option<&str> {
        self.udt_type_name.as_deref()
    }

    /// Decode a type descriptor.
    ///
    /// With `read_flags` set, the descriptor is preceded by the COLMETADATA
    /// user-type (u32) and flags (u16) fields. The 1-byte data type token
    /// follows, then the type-specific attributes.
    pub fn decode(src: &mut impl Buf, read_flags: bool) -> Result<Self, ProtocolError> {
        let flags = if read_flags {
            if src.remaining() < 6 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let _user_type = src.get_u32_le();
            src.get_u16_le()
        } else {
            0
        };

        if src.remaining() < 1 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let data_type = TdsDataType::from_u8(src.get_u8())?;
        Self::decode_descriptor(src, data_type, flags)
    }

    fn decode_descriptor(
        src: &mut impl Buf,
        data_type: TdsDataType,
        flags: u16,
    ) -> Result<Self, ProtocolError> {
        use LengthStrategy::*;
        use SqlServerType::*;

        let mut builder = match data_type {
            TdsDataType::Int1 => Self::fixed(TinyInt),
            TdsDataType::Int2 => Self::fixed(SmallInt),
            TdsDataType::Int4 => Self::fixed(Int),
            TdsDataType::Int8 => Self::fixed(BigInt),
            TdsDataType::Bit => Self::fixed(Bit),
            TdsDataType::Float4 => Self::fixed(Real),
            TdsDataType::Float8 => Self::fixed(Float),
            TdsDataType::Money => Self::fixed(Money),
            TdsDataType::Money4 => Self::fixed(SmallMoney),
            TdsDataType::DateTime => Self::fixed(DateTime),
            TdsDataType::DateTime4 => Self::fixed(SmallDateTime),

            TdsDataType::IntN => {
                let width = read_u8(src)?;
                let server_type = match width {
                    1 => TinyInt,
                    2 => SmallInt,
                    4 => Int,
                    8 => BigInt,
                    _ => return Err(ProtocolError::InvalidValue("invalid INTN width")),
                };
                TypeInformationBuilder::new(server_type)
                    .length_strategy(ByteLen)
                    .max_length(u32::from(width))
            }
            TdsDataType::BitN => {
                let width = read_u8(src)?;
                if width != 1 {
                    return Err(ProtocolError::InvalidValue("invalid BITN width"));
                }
                TypeInformationBuilder::new(Bit)
                    .length_strategy(ByteLen)
                    .max_length(1)
            }
            TdsDataType::FloatN => {
                let width = read_u8(src)?;
                let server_type = match width {
                    4 => Real,
                    8 => Float,
                    _ => return Err(ProtocolError::InvalidValue("invalid FLTN width")),
                };
                TypeInformationBuilder::new(server_type)
                    .length_strategy(ByteLen)
                    .max_length(u32::from(width))
            }
            TdsDataType::MoneyN => {
                let width = read_u8(src)?;
                let server_type = match width {
                    4 => SmallMoney,
                    8 => Money,
                    _ => return Err(ProtocolError::InvalidValue("invalid MONEYN width")),
                };
                TypeInformationBuilder::new(server_type)
                    .length_strategy(ByteLen)
                    .max_length(u32::from(width))
            }
            TdsDataType::DateTimeN => {
                let width = read_u8(src)?;
                let server_type = match width {
                    4 => SmallDateTime,
                    8 => DateTime,
                    _ => return Err(ProtocolError::InvalidValue("invalid DATETIMN width")),
                };
                TypeInformationBuilder::new(server_type)
                    .length_strategy(ByteLen)
                    .max_length(u32::from(width))
            }

            TdsDataType::Guid => {
                let width = read_u8(src)?;
                if width != 16 {
                    return Err(ProtocolError::InvalidValue("invalid GUID width"));
                }
                TypeInformationBuilder::new(Guid)
                    .length_strategy(ByteLen)
                    .max_length(16)
            }

            TdsDataType::Decimal | TdsDataType::DecimalN => {
                Self::decimal_family(src, Decimal)?
            }
            TdsDataType::Numeric | TdsDataType::NumericN => {
                Self::decimal_family(src, Numeric)?
            }

            TdsDataType::Date => TypeInformationBuilder::new(Date)
                .length_strategy(ByteLen)
                .max_length(3),
            TdsDataType::Time => {
                let scale = read_scale(src)?;
                TypeInformationBuilder::new(Time)
                    .length_strategy(ByteLen)
                    .max_length(time_value_width(scale) as u32)
                    .scale(scale)
            }
            TdsDataType::DateTime2 => {
                let scale = read_scale(src)?;
                TypeInformationBuilder::new(DateTime2)
                    .length_strategy(ByteLen)
                    .max_length(time_value_width(scale) as u32 + 3)
                    .scale(scale)
            }
            TdsDataType::DateTimeOffset => {
                let scale = read_scale(src)?;
                TypeInformationBuilder::new(DateTimeOffset)
                    .length_strategy(ByteLen)
                    .max_length(time_value_width(scale) as u32 + 5)
                    .scale(scale)
            }

            TdsDataType::BigVarChar => Self::ushort_string(src, VarChar)?,
            TdsDataType::BigChar => Self::ushort_string(src, Char)?,
            TdsDataType::NVarChar => Self::ushort_string(src, NVarChar)?,
            TdsDataType::NChar => Self::ushort_string(src, NChar)?,

            TdsDataType::BigVarBinary => {
                let max = read_u16(src)?;
                let builder = TypeInformationBuilder::new(VarBinary);
                if max == MAX_SENTINEL {
                    builder.length_strategy(PartLen).max_length(u32::MAX)
                } else {
                    builder.length_strategy(UShortLen).max_length(u32::from(max))
                }
            }
            TdsDataType::BigBinary => {
                let max = read_u16(src)?;
                TypeInformationBuilder::new(Binary)
                    .length_strategy(UShortLen)
                    .max_length(u32::from(max))
            }

            TdsDataType::Text => {
                let max = read_u32(src)?;
                let collation = Collation::decode(src)?;
                TypeInformationBuilder::new(Text)
                    .length_strategy(LongLen)
                    .max_length(max)
                    .collation(collation)
            }
            TdsDataType::NText => {
                let max = read_u32(src)?;
                let collation = Collation::decode(src)?;
                TypeInformationBuilder::new(NText)
                    .length_strategy(LongLen)
                    .max_length(max)
                    .collation(collation)
            }
            TdsDataType::Image => {
                let max = read_u32(src)?;
                TypeInformationBuilder::new(Image)
                    .length_strategy(PartLen)
                    .max_length(max)
            }

            TdsDataType::Xml => {
                let schema_present = read_u8(src)?;
                if schema_present != 0 {
                    let _database = read_us_varchar(src)?;
                    let _owning_schema = read_us_varchar(src)?;
                    let _collection = read_us_varchar(src)?;
                }
                TypeInformationBuilder::new(Xml)
                    .length_strategy(PartLen)
                    .max_length(u32::MAX)
            }
            TdsDataType::Udt => {
                let max = read_u16(src)?;
                let _database = read_us_varchar(src)?;
                let _schema = read_us_varchar(src)?;
                let type_name = read_us_varchar(src)?;
                let _assembly = read_us_varchar(src)?;
                TypeInformationBuilder::new(Udt)
                    .length_strategy(PartLen)
                    .max_length(u32::from(max))
                    .udt_type_name(type_name)
            }
        };

        builder.flags = flags;
        Ok(builder.build())
    }

    /// Encode this description as a wire type descriptor (the data type
    /// token and its attributes, without the COLMETADATA user-type/flags
    /// prefix).
    pub fn encode(&self, dst: &mut impl BufMut) {
        use LengthStrategy::*;
        use SqlServerType::*;

        const DEFAULT_COLLATION: [u8; 5] = [0x09, 0x04, 0xD0, 0x00, 0x34];

        let collation_bytes = |collation: Option<Collation>| -> [u8; 5] {
            match collation {
                Some(c) => {
                    let mut bytes = [0u8; 5];
                    bytes[..4].copy_from_slice(&c.lcid.to_le_bytes());
                    bytes[4] = c.sort_id;
                    bytes
                }
                None => DEFAULT_COLLATION,
            }
        };

        match (self.server_type, self.length_strategy) {
            // Non-nullable fixed-width encodings.
            (TinyInt, FixedLen) => dst.put_u8(TdsDataType::Int1 as u8),
            (SmallInt, FixedLen) => dst.put_u8(TdsDataType::Int2 as u8),
            (Int, FixedLen) => dst.put_u8(TdsDataType::Int4 as u8),
            (BigInt, FixedLen) => dst.put_u8(TdsDataType::Int8 as u8),
            (Bit, FixedLen) => dst.put_u8(TdsDataType::Bit as u8),
            (Real, FixedLen) => dst.put_u8(TdsDataType::Float4 as u8),
            (Float, FixedLen) => dst.put_u8(TdsDataType::Float8 as u8),
            (Money, FixedLen) => dst.put_u8(TdsDataType::Money as u8),
            (SmallMoney, FixedLen) => dst.put_u8(TdsDataType::Money4 as u8),
            (DateTime, FixedLen) => dst.put_u8(TdsDataType::DateTime as u8),
            (SmallDateTime, FixedLen) => dst.put_u8(TdsDataType::DateTime4 as u8),

            // Nullable scalar encodings with a width byte.
            (TinyInt | SmallInt | Int | BigInt, _) => {
                dst.put_u8(TdsDataType::IntN as u8);
                dst.put_u8(self.max_length as u8);
            }
            (Bit, _) => {
                dst.put_u8(TdsDataType::BitN as u8);
                dst.put_u8(1);
            }
            (Real | Float, _) => {
                dst.put_u8(TdsDataType::FloatN as u8);
                dst.put_u8(self.max_length as u8);
            }
            (Money | SmallMoney, _) => {
                dst.put_u8(TdsDataType::MoneyN as u8);
                dst.put_u8(self.max_length as u8);
            }
            (DateTime | SmallDateTime, _) => {
                dst.put_u8(TdsDataType::DateTimeN as u8);
                dst.put_u8(self.max_length as u8);
            }
            (Guid, _) => {
                dst.put_u8(TdsDataType::Guid as u8);
                dst.put_u8(16);
            }
            (Decimal, _) => {
                dst.put_u8(TdsDataType::DecimalN as u8);
                dst.put_u8(self.max_length as u8);
                dst.put_u8(self.precision);
                dst.put_u8(self.scale);
            }
            (Numeric, _) => {
                dst.put_u8(TdsDataType::NumericN as u8);
                dst.put_u8(self.max_length as u8);
                dst.put_u8(self.precision);
                dst.put_u8(self.scale);
            }
            (Date, _) => dst.put_u8(TdsDataType::Date as u8),
            (Time, _) => {
                dst.put_u8(TdsDataType::Time as u8);
                dst.put_u8(self.scale);
            }
            (DateTime2, _) => {
                dst.put_u8(TdsDataType::DateTime2 as u8);
                dst.put_u8(self.scale);
            }
            (DateTimeOffset, _) => {
                dst.put_u8(TdsDataType::DateTimeOffset as u8);
                dst.put_u8(self.scale);
            }

            (VarChar | Char, strategy) => {
                let token = if self.server_type == VarChar {
                    TdsDataType::BigVarChar
                } else {
                    TdsDataType::BigChar
                };
                dst.put_u8(token as u8);
                dst.put_u16_le(self.ushort_max(strategy));
                dst.put_slice(&collation_bytes(self.collation));
            }
            (NVarChar | NChar, strategy) => {
                let token = if self.server_type == NVarChar {
                    TdsDataType::NVarChar
                } else {
                    TdsDataType::NChar
                };
                dst.put_u8(token as u8);
                dst.put_u16_le(self.ushort_max(strategy));
                dst.put_slice(&collation_bytes(self.collation));
            }
            (VarBinary | Binary, strategy) => {
                let token = if self.server_type == VarBinary {
                    TdsDataType::BigVarBinary
                } else {
                    TdsDataType::BigBinary
                };
                dst.put_u8(token as u8);
                dst.put_u16_le(self.ushort_max(strategy));
            }

            (Text, _) => {
                dst.put_u8(TdsDataType::Text as u8);
                dst.put_u32_le(self.max_length);
                dst.put_slice(&collation_bytes(self.collation));
            }
            (NText, _) => {
                dst.put_u8(TdsDataType::NText as u8);
                dst.put_u32_le(self.max_length);
                dst.put_slice(&collation_bytes(self.collation));
            }
            (Image, _) => {
                dst.put_u8(TdsDataType::Image as u8);
                dst.put_u32_le(self.max_length);
            }
            (Xml, _) => {
                dst.put_u8(TdsDataType::Xml as u8);
                dst.put_u8(0);
            }
            (Udt, _) => {
                dst.put_u8(TdsDataType::Udt as u8);
                dst.put_u16_le(self.max_length as u16);
                for part in [
                    "",
                    "",
                    self.udt_type_name.as_deref().unwrap_or(""),
                    "",
                ] {
                    crate::codec::write_us_varchar(dst, part);
                }
            }
        }
    }

    fn ushort_max(&self, strategy: LengthStrategy) -> u16 {
        if strategy == LengthStrategy::PartLen {
            MAX_SENTINEL
        } else {
            self.max_length.min(u32::from(u16::MAX)) as u16
        }
    }

    fn fixed(server_type: SqlServerType) -> TypeInformationBuilder {
        let width = server_type
            .fixed_width()
            .map(|w| w as u32)
            .unwrap_or_default();
        TypeInformationBuilder::new(server_type)
            .length_strategy(LengthStrategy::FixedLen)
            .max_length(width)
    }

    fn decimal_family(
        src: &mut impl Buf,
        server_type: SqlServerType,
    ) -> Result<TypeInformationBuilder, ProtocolError> {
        let max = read_u8(src)?;
        let precision = read_u8(src)?;
        let scale = read_u8(src)?;
        if precision > 38 {
            return Err(ProtocolError::InvalidValue("decimal precision exceeds 38"));
        }
        if scale > precision {
            return Err(ProtocolError::InvalidValue("decimal scale exceeds precision"));
        }
        Ok(TypeInformationBuilder::new(server_type)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(u32::from(max))
            .precision(precision)
            .scale(scale))
    }

    fn ushort_string(
        src: &mut impl Buf,
        server_type: SqlServerType,
    ) -> Result<TypeInformationBuilder, ProtocolError> {
        let max = read_u16(src)?;
        let collation = Collation::decode(src)?;
        let builder = TypeInformationBuilder::new(server_type).collation(collation);
        if max == MAX_SENTINEL {
            Ok(builder
                .length_strategy(LengthStrategy::PartLen)
                .max_length(u32::MAX))
        } else {
            Ok(builder
                .length_strategy(LengthStrategy::UShortLen)
                .max_length(u32::from(max)))
        }
    }
}

fn read_u8(src: &mut impl Buf) -> Result<u8, ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_u8())
}

fn read_u16(src: &mut impl Buf) -> Result<u16, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_u16_le())
}

fn read_u32(src: &mut impl Buf) -> Result<u32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_u32_le())
}

fn read_scale(src: &mut impl Buf) -> Result<u8, ProtocolError> {
    let scale = read_u8(src)?;
    if scale > 7 {
        return Err(ProtocolError::InvalidValue("time scale must be 0..=7"));
    }
    Ok(scale)
}

/// Builder for [`TypeInformation`].
#[derive(Debug, Clone)]
pub struct TypeInformationBuilder {
    server_type: SqlServerType,
    length_strategy: LengthStrategy,
    max_length: u32,
    precision: u8,
    scale: u8,
    flags: u16,
    collation: Option<Collation>,
    udt_type_name: Option<String>,
}

impl TypeInformationBuilder {
    fn new(server_type: SqlServerType) -> Self {
        Self {
            server_type,
            length_strategy: LengthStrategy::FixedLen,
            max_length: server_type.fixed_width().map(|w| w as u32).unwrap_or(0),
            precision: 0,
            scale: 0,
            flags: 0,
            collation: None,
            udt_type_name: None,
        }
    }

    /// Set the length strategy.
    #[must_use]
    pub fn length_strategy(mut self, strategy: LengthStrategy) -> Self {
        self.length_strategy = strategy;
        self
    }

    /// Set the maximum length in bytes.
    #[must_use]
    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the precision.
    #[must_use]
    pub fn precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Set the scale.
    #[must_use]
    pub fn scale(mut self, scale: u8) -> Self {
        self.scale = scale;
        self
    }

    /// Set the column flags.
    #[must_use]
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Set the collation.
    #[must_use]
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Set the UDT type name.
    #[must_use]
    pub fn udt_type_name(mut self, name: impl Into<String>) -> Self {
        self.udt_type_name = Some(name.into());
        self
    }

    /// Finish the description.
    #[must_use]
    pub fn build(self) -> TypeInformation {
        TypeInformation {
            server_type: self.server_type,
            length_strategy: self.length_strategy,
            max_length: self.max_length,
            precision: self.precision,
            scale: self.scale,
            flags: self.flags,
            collation: self.collation,
            udt_type_name: self.udt_type_name,
        }
    }
}
