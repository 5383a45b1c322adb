//! Date and time family.
//!
//! - DATE: 3-byte LE day count since 0001-01-01.
//! - TIME(n): 3/4/5-byte LE count scaled by 10^(7-n) to 100 ns units.
//! - DATETIME2(n): time bytes followed by 3 date bytes.
//! - DATETIMEOFFSET(n): datetime2 bytes (in UTC) followed by a signed
//!   little-endian minute offset.
//! - DATETIME: 4-byte days since 1900-01-01 plus 4-byte 1/300-second ticks.
//! - SMALLDATETIME: 2-byte days since 1900-01-01 plus 2-byte minutes.

use bytes::{BufMut, BytesMut};
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use tds_wire::types::{time_value_width, SqlServerType, TdsDataType, TypeInformation};

use crate::error::CodecError;
use crate::registry::{Codec, Encoded};
use crate::value::{SqlValue, ValueKind};

/// Multipliers from a scaled time count to 100 ns units, indexed by scale.
const SCALED_MULTIPLIERS: [u64; 8] = [
    10_000_000, 1_000_000, 100_000, 10_000, 1_000, 100, 10, 1,
];

fn ce_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).expect("valid epoch")
}

fn legacy_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).expect("valid epoch")
}

fn decode_days(data: &[u8]) -> u32 {
    u32::from(data[0]) | u32::from(data[1]) << 8 | u32::from(data[2]) << 16
}

fn date_from_days(days: u32) -> NaiveDate {
    ce_epoch() + Duration::days(i64::from(days))
}

fn days_from_date(date: NaiveDate) -> Result<u32, CodecError> {
    let days = date.signed_duration_since(ce_epoch()).num_days();
    u32::try_from(days).map_err(|_| CodecError::OutOfRange("date before year 1"))
}

fn time_from_scaled(data: &[u8], scale: u8) -> Result<NaiveTime, CodecError> {
    if scale > 7 {
        return Err(CodecError::InvalidScale(scale));
    }
    if data.is_empty() || data.len() > 8 {
        return Err(CodecError::InvalidValue("invalid time width"));
    }

    let mut raw = [0u8; 8];
    raw[..data.len()].copy_from_slice(data);
    let scaled = u64::from_le_bytes(raw);

    let units = scaled
        .checked_mul(SCALED_MULTIPLIERS[scale as usize])
        .ok_or(CodecError::OutOfRange("time overflows a day"))?;
    let nanos = units
        .checked_mul(100)
        .ok_or(CodecError::OutOfRange("time overflows a day"))?;

    let secs = u32::try_from(nanos / 1_000_000_000)
        .map_err(|_| CodecError::OutOfRange("time overflows a day"))?;
    let nano_part = (nanos % 1_000_000_000) as u32;

    NaiveTime::from_num_seconds_from_midnight_opt(secs, nano_part)
        .ok_or(CodecError::OutOfRange("time overflows a day"))
}

fn scaled_from_time(time: NaiveTime, scale: u8) -> u64 {
    let nanos =
        u64::from(time.num_seconds_from_midnight()) * 1_000_000_000 + u64::from(time.nanosecond());
    nanos / 100 / SCALED_MULTIPLIERS[scale as usize]
}

fn put_scaled_time(dst: &mut impl BufMut, time: NaiveTime, scale: u8) {
    let scaled = scaled_from_time(time, scale);
    let width = time_value_width(scale);
    dst.put_slice(&scaled.to_le_bytes()[..width]);
}

fn put_days(dst: &mut impl BufMut, days: u32) {
    dst.put_slice(&days.to_le_bytes()[..3]);
}

/// Codec for DATE.
#[derive(Debug)]
pub struct DateCodec;

impl Codec for DateCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::Date && target == ValueKind::Date
    }

    fn decode(
        &self,
        data: &[u8],
        _ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        if data.len() != 3 {
            return Err(CodecError::InvalidValue("DATE must be 3 bytes"));
        }
        Ok(SqlValue::Date(date_from_days(decode_days(data))))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Date
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Date(date) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut bytes = BytesMut::with_capacity(4);
        bytes.put_u8(3);
        put_days(&mut bytes, days_from_date(*date)?);
        Ok(Encoded::new(TdsDataType::Date, bytes.freeze(), "date"))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::Date, vec![0x00], "date")
    }
}

/// Codec for TIME(n).
#[derive(Debug)]
pub struct TimeCodec;

impl Codec for TimeCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::Time && target == ValueKind::Time
    }

    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        Ok(SqlValue::Time(time_from_scaled(data, ty.scale())?))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::Time
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::Time(time) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut bytes = BytesMut::with_capacity(8);
        bytes.put_u8(7); // scale
        bytes.put_u8(5); // value length
        put_scaled_time(&mut bytes, *time, 7);
        Ok(Encoded::new(TdsDataType::Time, bytes.freeze(), "time"))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::Time, vec![0x07, 0x00], "time")
    }
}

/// Codec for DATETIME2(n) and the legacy DATETIME / SMALLDATETIME shapes.
#[derive(Debug)]
pub struct DateTimeCodec;

impl DateTimeCodec {
    fn decode_datetime2(data: &[u8], scale: u8) -> Result<NaiveDateTime, CodecError> {
        if data.len() < 4 {
            return Err(CodecError::UnexpectedEof {
                needed: 4,
                available: data.len(),
            });
        }
        let (time_bytes, date_bytes) = data.split_at(data.len() - 3);
        let time = time_from_scaled(time_bytes, scale)?;
        let date = date_from_days(decode_days(date_bytes));
        Ok(date.and_time(time))
    }

    fn decode_legacy(data: &[u8]) -> Result<NaiveDateTime, CodecError> {
        let days = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let ticks = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

        let date = legacy_epoch() + Duration::days(i64::from(days));
        // Ticks are 1/300 of a second since midnight.
        let nanos = u64::from(ticks) * 10_000_000 / 3;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            (nanos / 1_000_000_000) as u32,
            (nanos % 1_000_000_000) as u32,
        )
        .ok_or(CodecError::OutOfRange("datetime ticks overflow a day"))?;
        Ok(date.and_time(time))
    }

    fn decode_small(data: &[u8]) -> Result<NaiveDateTime, CodecError> {
        let days = u16::from_le_bytes([data[0], data[1]]);
        let minutes = u16::from_le_bytes([data[2], data[3]]);

        let date = legacy_epoch() + Duration::days(i64::from(days));
        let time =
            NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
                .ok_or(CodecError::OutOfRange("smalldatetime minutes overflow a day"))?;
        Ok(date.and_time(time))
    }
}

impl Codec for DateTimeCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        matches!(
            ty.server_type(),
            SqlServerType::DateTime2 | SqlServerType::DateTime | SqlServerType::SmallDateTime
        ) && target == ValueKind::DateTime
    }

    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        let value = match ty.server_type() {
            SqlServerType::DateTime2 => Self::decode_datetime2(data, ty.scale())?,
            SqlServerType::DateTime if data.len() == 8 => Self::decode_legacy(data)?,
            SqlServerType::SmallDateTime if data.len() == 4 => Self::decode_small(data)?,
            _ => return Err(CodecError::InvalidValue("invalid datetime width")),
        };
        Ok(SqlValue::DateTime(value))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::DateTime
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::DateTime(datetime) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let mut bytes = BytesMut::with_capacity(12);
        bytes.put_u8(7); // scale
        bytes.put_u8(8); // value length
        put_scaled_time(&mut bytes, datetime.time(), 7);
        put_days(&mut bytes, days_from_date(datetime.date())?);
        Ok(Encoded::new(
            TdsDataType::DateTime2,
            bytes.freeze(),
            "datetime2",
        ))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(TdsDataType::DateTime2, vec![0x07, 0x00], "datetime2")
    }
}

/// Codec for DATETIMEOFFSET(n).
#[derive(Debug)]
pub struct DateTimeOffsetCodec;

impl Codec for DateTimeOffsetCodec {
    fn can_decode(&self, ty: &TypeInformation, target: ValueKind) -> bool {
        ty.server_type() == SqlServerType::DateTimeOffset && target == ValueKind::DateTimeOffset
    }

    fn decode(
        &self,
        data: &[u8],
        ty: &TypeInformation,
        _target: ValueKind,
    ) -> Result<SqlValue, CodecError> {
        if data.len() < 6 {
            return Err(CodecError::UnexpectedEof {
                needed: 6,
                available: data.len(),
            });
        }

        let (datetime_bytes, offset_bytes) = data.split_at(data.len() - 2);
        let utc = DateTimeCodec::decode_datetime2(datetime_bytes, ty.scale())?;

        let offset_minutes = i16::from_le_bytes([offset_bytes[0], offset_bytes[1]]);
        let offset = FixedOffset::east_opt(i32::from(offset_minutes) * 60)
            .ok_or(CodecError::OutOfRange("offset outside +-24h"))?;

        Ok(SqlValue::DateTimeOffset(offset.from_utc_datetime(&utc)))
    }

    fn can_encode(&self, kind: ValueKind) -> bool {
        kind == ValueKind::DateTimeOffset
    }

    fn encode(&self, value: &SqlValue) -> Result<Encoded, CodecError> {
        let SqlValue::DateTimeOffset(datetime) = value else {
            return Err(CodecError::Unencodable(value.kind().name()));
        };

        let utc = datetime.naive_utc();
        let offset_minutes = (datetime.offset().local_minus_utc() / 60) as i16;

        let mut bytes = BytesMut::with_capacity(14);
        bytes.put_u8(7); // scale
        bytes.put_u8(10); // value length
        put_scaled_time(&mut bytes, utc.time(), 7);
        put_days(&mut bytes, days_from_date(utc.date())?);
        bytes.put_i16_le(offset_minutes);
        Ok(Encoded::new(
            TdsDataType::DateTimeOffset,
            bytes.freeze(),
            "datetimeoffset",
        ))
    }

    fn encode_null(&self) -> Encoded {
        Encoded::new(
            TdsDataType::DateTimeOffset,
            vec![0x07, 0x00],
            "datetimeoffset",
        )
    }
}

/// A `DateTime<FixedOffset>` built from UTC parts, for tests and callers.
pub fn datetime_offset(
    utc: NaiveDateTime,
    offset_minutes: i32,
) -> Option<DateTime<FixedOffset>> {
    FixedOffset::east_opt(offset_minutes * 60).map(|offset| offset.from_utc_datetime(&utc))
}
