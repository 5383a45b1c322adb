//! Wire-level protocol errors.

use thiserror::Error;

/// Errors raised while reading or writing the TDS wire grammar.
///
/// Every variant is a protocol violation: the peer sent bytes that do not
/// match the grammar, or a value outside its documented domain. These errors
/// are fatal for the connection that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer bytes remain than the grammar requires.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// A value violated its domain (e.g. a BIT byte other than 0 or 1).
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Unknown packet type byte in a packet header.
    #[error("invalid packet type 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Packet header length field smaller than the header itself or larger
    /// than the negotiated maximum.
    #[error("bad packet length {0}")]
    BadPacketLength(u16),

    /// Unknown token type byte at the head of a token.
    #[error("invalid token type 0x{0:02X}")]
    InvalidTokenType(u8),

    /// A data type byte that is not part of the supported TDS type grammar.
    #[error("unknown data type 0x{0:02X}")]
    UnknownDataType(u8),

    /// Unknown ENVCHANGE type byte.
    #[error("invalid environment change type {0}")]
    InvalidEnvChangeType(u8),

    /// A transaction descriptor whose length is not exactly 8 bytes.
    #[error("transaction descriptor length mismatch: {0} bytes")]
    InvalidTransactionDescriptor(usize),

    /// Unknown PRELOGIN option token.
    #[error("invalid prelogin option 0x{0:02X}")]
    InvalidPreloginOption(u8),

    /// Malformed UTF-16 in a wire string.
    #[error("invalid UTF-16 string data")]
    InvalidStringData,

    /// Any other violation of the protocol contract, described in text.
    #[error("protocol violation: {0}")]
    Violation(String),
}

impl ProtocolError {
    /// Shorthand for a textual protocol violation.
    pub fn violation(msg: impl Into<String>) -> Self {
        Self::Violation(msg.into())
    }
}
