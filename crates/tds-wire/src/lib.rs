//! # tds-wire
//!
//! Pure implementation of the MS-TDS (Tabular Data Stream) wire grammar used
//! by Microsoft SQL Server, TDS 7.4 and newer.
//!
//! This crate is intentionally IO-agnostic: it knows how to read and write
//! packet headers, tokens, type descriptors and client request bodies, but it
//! contains no networking logic and makes no assumptions about the async
//! runtime. The framing and session crates build on top of it.
//!
//! ## Layout
//!
//! - [`packet`]: the 8-byte packet header and packet type/status constants.
//! - [`codec`]: byte-level shapes shared by every message, such as
//!   length-prefixed UCS-2 strings, money, GUIDs and PLP chunk streams.
//! - [`types`]: [`TypeInformation`], the length strategies and the
//!   [`Length`] value decoded ahead of every column value.
//! - [`collation`]: the 5-byte collation and its derived character set.
//! - [`token`]: readers and writers for the tokens of a tabular response.
//! - [`headers`]: the all-headers block carried by SQL batch and RPC
//!   requests, and the transaction descriptor it transports.
//! - [`batch`], [`rpc`]: client request payloads.
//! - [`prelogin`], [`login`]: the connection handshake messages.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod codec;
pub mod collation;
pub mod error;
pub mod headers;
pub mod login;
pub mod packet;
pub mod prelogin;
pub mod rpc;
pub mod token;
pub mod types;

pub use collation::Collation;
pub use error::ProtocolError;
pub use headers::{AllHeaders, TransactionDescriptor};
pub use login::Login7;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin};
pub use token::{
    Column, ColumnMetadata, DoneStatus, DoneToken, EnvChangeToken, EnvChangeType, EnvChangeValue,
    FeatureAck, FeatureExtAckToken, LoginAckToken, MessageToken, OrderToken, RowToken, RowValue,
    Token, TokenStreamReader, TokenType,
};
pub use types::{Length, LengthStrategy, SqlServerType, TdsDataType, TypeInformation};
