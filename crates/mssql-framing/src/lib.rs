//! # mssql-framing
//!
//! Async framing layer for TDS: splits logical messages into packets of the
//! negotiated size, reassembles inbound packets into logical messages, and
//! carries the TLS handshake records that TDS wraps inside PRELOGIN packets.
//!
//! ```text
//! byte stream <-> TdsCodec (packets) <-> MessageAssembler (messages) <-> session
//! ```
//!
//! The transport is split into read and write halves so an ATTENTION packet
//! can be written while a read of a large result set is in flight.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod framed;
pub mod message;
pub mod packet_codec;
pub mod tls;

pub use error::FramingError;
pub use framed::{PacketReader, PacketStream, PacketWriter};
pub use message::{Message, MessageAssembler};
pub use packet_codec::{split_message, split_message_with_reset, Packet, TdsCodec};
pub use tls::{MaybeTls, TlsPreloginStream};
