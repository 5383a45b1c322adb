//! The decoded value model.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A decoded SQL Server scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,
    /// BIT.
    Bool(bool),
    /// TINYINT (unsigned on the server).
    TinyInt(u8),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Real(f32),
    /// FLOAT.
    Double(f64),
    /// DECIMAL / NUMERIC / MONEY / SMALLMONEY.
    Decimal(Decimal),
    /// Character data of any string family.
    String(String),
    /// Binary data of any binary family.
    Binary(Bytes),
    /// UNIQUEIDENTIFIER.
    Uuid(Uuid),
    /// DATE.
    Date(NaiveDate),
    /// TIME.
    Time(NaiveTime),
    /// DATETIME2 / DATETIME / SMALLDATETIME.
    DateTime(NaiveDateTime),
    /// DATETIMEOFFSET.
    DateTimeOffset(DateTime<FixedOffset>),
    /// XML.
    Xml(String),
}

impl SqlValue {
    /// Whether the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::TinyInt(_) => ValueKind::TinyInt,
            Self::SmallInt(_) => ValueKind::SmallInt,
            Self::Int(_) => ValueKind::Int,
            Self::BigInt(_) => ValueKind::BigInt,
            Self::Real(_) => ValueKind::Real,
            Self::Double(_) => ValueKind::Double,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::String(_) => ValueKind::String,
            Self::Binary(_) => ValueKind::Binary,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Date(_) => ValueKind::Date,
            Self::Time(_) => ValueKind::Time,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::DateTimeOffset(_) => ValueKind::DateTimeOffset,
            Self::Xml(_) => ValueKind::Xml,
        }
    }

    /// The value as `i64` if it is any integer width.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `f64` if it is floating point.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice if it is character data.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Xml(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a decimal if it is exact numeric.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<SqlValue>> for SqlValue {
    fn from(value: Option<SqlValue>) -> Self {
        value.unwrap_or(Self::Null)
    }
}

/// Target kind used to resolve a codec for decoding, and to tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// NULL.
    Null,
    /// `bool`.
    Bool,
    /// `u8`.
    TinyInt,
    /// `i16`.
    SmallInt,
    /// `i32`.
    Int,
    /// `i64`.
    BigInt,
    /// `f32`.
    Real,
    /// `f64`.
    Double,
    /// `rust_decimal::Decimal`.
    Decimal,
    /// `String`.
    String,
    /// `bytes::Bytes`.
    Binary,
    /// `uuid::Uuid`.
    Uuid,
    /// `chrono::NaiveDate`.
    Date,
    /// `chrono::NaiveTime`.
    Time,
    /// `chrono::NaiveDateTime`.
    DateTime,
    /// `chrono::DateTime<FixedOffset>`.
    DateTimeOffset,
    /// XML text.
    Xml,
}

impl ValueKind {
    /// Display name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::TinyInt => "u8",
            Self::SmallInt => "i16",
            Self::Int => "i32",
            Self::BigInt => "i64",
            Self::Real => "f32",
            Self::Double => "f64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetimeoffset",
            Self::Xml => "xml",
        }
    }
}
