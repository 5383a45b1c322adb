//! # mssql-values
//!
//! Typed codecs between SQL Server wire values and Rust values.
//!
//! Each SQL Server scalar family has one codec that knows its bit-exact
//! little-endian wire shape. The [`CodecRegistry`] resolves a column's
//! [`TypeInformation`](tds_wire::TypeInformation) and a requested
//! [`ValueKind`] to the first codec that accepts the pair, mirroring the
//! server's own type families:
//!
//! - integers (TINYINT through BIGINT), BIT
//! - REAL / FLOAT
//! - DECIMAL / NUMERIC, MONEY / SMALLMONEY
//! - DATE, TIME, DATETIME2, DATETIMEOFFSET, DATETIME, SMALLDATETIME
//! - CHAR / VARCHAR / TEXT (collation charset), NCHAR / NVARCHAR / NTEXT
//! - BINARY / VARBINARY / IMAGE, GUID, XML
//!
//! Decoding never tears a connection down: failures surface as
//! [`CodecError`] on the affected value only.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codecs;
pub mod error;
pub mod registry;
pub mod value;

pub use error::CodecError;
pub use registry::{
    decode, decode_column, encode, encode_null, value_kind, Codec, CodecRegistry, Encoded,
};
pub use value::{SqlValue, ValueKind};
