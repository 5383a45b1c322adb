//! Property tests: `decode(encode(value))` is the identity within each
//! codec's documented precision.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use rust_decimal::Decimal;

use mssql_values::codecs::character::CharacterCodec;
use mssql_values::codecs::decimal::DecimalCodec;
use mssql_values::codecs::float::FloatCodec;
use mssql_values::codecs::guid::GuidCodec;
use mssql_values::codecs::int::IntegerCodec;
use mssql_values::codecs::money::MoneyCodec;
use mssql_values::codecs::temporal::{DateCodec, DateTimeCodec, TimeCodec};
use mssql_values::{Codec, SqlValue, ValueKind};
use tds_wire::types::{LengthStrategy, SqlServerType, TypeInformation};

fn bytelen_type(server_type: SqlServerType, max: u32, scale: u8) -> TypeInformation {
    TypeInformation::builder(server_type)
        .length_strategy(LengthStrategy::ByteLen)
        .max_length(max)
        .scale(scale)
        .build()
}

proptest! {
    #[test]
    fn int_roundtrip(value in any::<i32>()) {
        let encoded = IntegerCodec.encode(&SqlValue::Int(value)).unwrap();
        // Skip the width and length bytes of the nullable wire form.
        let ty = bytelen_type(SqlServerType::Int, 4, 0);
        let decoded = IntegerCodec.decode(&encoded.bytes[2..], &ty, ValueKind::Int).unwrap();
        prop_assert_eq!(decoded, SqlValue::Int(value));
    }

    #[test]
    fn bigint_roundtrip(value in any::<i64>()) {
        let encoded = IntegerCodec.encode(&SqlValue::BigInt(value)).unwrap();
        let ty = bytelen_type(SqlServerType::BigInt, 8, 0);
        let decoded = IntegerCodec.decode(&encoded.bytes[2..], &ty, ValueKind::BigInt).unwrap();
        prop_assert_eq!(decoded, SqlValue::BigInt(value));
    }

    #[test]
    fn double_roundtrip_is_bit_exact(value in any::<f64>()) {
        prop_assume!(!value.is_nan());
        let encoded = FloatCodec.encode(&SqlValue::Double(value)).unwrap();
        let ty = bytelen_type(SqlServerType::Float, 8, 0);
        let decoded = FloatCodec.decode(&encoded.bytes[2..], &ty, ValueKind::Double).unwrap();
        prop_assert_eq!(decoded, SqlValue::Double(value));
    }

    #[test]
    fn decimal_roundtrip_is_exact(mantissa in any::<i64>(), scale in 0u32..=9) {
        let value = Decimal::from_i128_with_scale(i128::from(mantissa), scale);
        let encoded = DecimalCodec.encode(&SqlValue::Decimal(value)).unwrap();

        let ty = TypeInformation::builder(SqlServerType::Numeric)
            .length_strategy(LengthStrategy::ByteLen)
            .max_length(17)
            .precision(38)
            .scale(scale as u8)
            .build();
        let decoded = DecimalCodec
            .decode(&encoded.bytes[4..], &ty, ValueKind::Decimal)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::Decimal(value));
    }

    #[test]
    fn money_roundtrip_is_exact(units in any::<i64>()) {
        let value = Decimal::from_i128_with_scale(i128::from(units), 4);
        let encoded = MoneyCodec.encode(&SqlValue::Decimal(value)).unwrap();

        let ty = bytelen_type(SqlServerType::Money, 8, 0);
        let decoded = MoneyCodec
            .decode(&encoded.bytes[2..], &ty, ValueKind::Decimal)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::Decimal(value));
    }

    #[test]
    fn string_roundtrip(text in "\\PC{0,200}") {
        let encoded = CharacterCodec.encode(&SqlValue::String(text.clone())).unwrap();

        let ty = TypeInformation::builder(SqlServerType::NVarChar)
            .length_strategy(LengthStrategy::UShortLen)
            .max_length(8000)
            .build();
        // Skip max length (2), collation (5) and value length (2).
        let decoded = CharacterCodec
            .decode(&encoded.bytes[9..], &ty, ValueKind::String)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::String(text));
    }

    #[test]
    fn guid_roundtrip(raw in any::<[u8; 16]>()) {
        let uuid = uuid::Uuid::from_bytes(raw);
        let encoded = GuidCodec.encode(&SqlValue::Uuid(uuid)).unwrap();

        let ty = bytelen_type(SqlServerType::Guid, 16, 0);
        let decoded = GuidCodec
            .decode(&encoded.bytes[2..], &ty, ValueKind::Uuid)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::Uuid(uuid));
    }

    #[test]
    fn date_roundtrip(days in 0i64..=3_652_058) {
        let epoch = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let date = epoch + chrono::Duration::days(days);

        let encoded = DateCodec.encode(&SqlValue::Date(date)).unwrap();
        let ty = bytelen_type(SqlServerType::Date, 3, 0);
        let decoded = DateCodec
            .decode(&encoded.bytes[1..], &ty, ValueKind::Date)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::Date(date));
    }

    #[test]
    fn time_roundtrip_at_full_scale(seconds in 0u32..86_400, hundred_nanos in 0u32..10_000_000) {
        let nanos = hundred_nanos * 100;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos).unwrap();

        let encoded = TimeCodec.encode(&SqlValue::Time(time)).unwrap();
        let ty = bytelen_type(SqlServerType::Time, 5, 7);
        let decoded = TimeCodec
            .decode(&encoded.bytes[2..], &ty, ValueKind::Time)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::Time(time));
    }

    #[test]
    fn datetime2_roundtrip(days in 0i64..=3_652_058, seconds in 0u32..86_400) {
        let epoch = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let datetime = (epoch + chrono::Duration::days(days))
            .and_time(NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap());

        let encoded = DateTimeCodec.encode(&SqlValue::DateTime(datetime)).unwrap();
        let ty = bytelen_type(SqlServerType::DateTime2, 8, 7);
        let decoded = DateTimeCodec
            .decode(&encoded.bytes[2..], &ty, ValueKind::DateTime)
            .unwrap();
        prop_assert_eq!(decoded, SqlValue::DateTime(datetime));
    }

    #[test]
    fn binary_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        use mssql_values::codecs::binary::BinaryCodec;

        let value = SqlValue::Binary(Bytes::from(data));
        let encoded = BinaryCodec.encode(&value).unwrap();

        let ty = TypeInformation::builder(SqlServerType::VarBinary)
            .length_strategy(LengthStrategy::UShortLen)
            .max_length(8000)
            .build();
        let decoded = BinaryCodec
            .decode(&encoded.bytes[4..], &ty, ValueKind::Binary)
            .unwrap();
        prop_assert_eq!(decoded, value);
    }
}
