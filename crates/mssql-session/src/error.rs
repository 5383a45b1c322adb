//! Session errors.

use std::sync::Arc;

use thiserror::Error;

use mssql_framing::FramingError;
use tds_wire::ProtocolError;

/// Errors surfaced by the connection and exchange engine.
///
/// Transport and protocol failures are fatal: they move the connection to
/// CLOSED and fail every dependent stream. Server-reported errors and codec
/// errors stay scoped to the exchange or value they belong to.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The transport failed; the connection is closed.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] Arc<std::io::Error>),

    /// The peer violated the wire protocol; the connection is closed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server reported an error of class above 10.
    #[error("server error {number} (class {class}): {message}")]
    Server {
        /// Server-defined error number.
        number: i32,
        /// State qualifying the number.
        state: u8,
        /// Severity class.
        class: u8,
        /// Message text.
        message: String,
        /// Reporting server.
        server: String,
        /// Reporting procedure.
        procedure: String,
        /// Line within the batch or procedure.
        line: u32,
    },

    /// A value failed to decode or encode; the exchange continues.
    #[error(transparent)]
    Codec(#[from] mssql_values::CodecError),

    /// The operation is not legal in the connection's current state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The TCP connect did not finish within the allowed time.
    #[error("connect timed out")]
    ConnectTimeout,

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Whether this error closes the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::Protocol(_) | Self::ConnectionClosed
        )
    }

    pub(crate) fn from_server_message(msg: &tds_wire::token::MessageToken) -> Self {
        Self::Server {
            number: msg.number,
            state: msg.state,
            class: msg.class,
            message: msg.message.clone(),
            server: msg.server.clone(),
            procedure: msg.procedure.clone(),
            line: msg.line,
        }
    }
}

impl From<FramingError> for Error {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::Io(io) => Self::ConnectionLost(Arc::new(io)),
            FramingError::Protocol(protocol) => Self::Protocol(protocol),
            FramingError::BadPacketLength { length, .. } => {
                Self::Protocol(ProtocolError::BadPacketLength(length as u16))
            }
            FramingError::PacketIdGap { expected, actual } => Self::Protocol(
                ProtocolError::violation(format!("packet id gap: expected {expected}, got {actual}")),
            ),
            FramingError::TruncatedPacket => {
                Self::Protocol(ProtocolError::violation("connection closed mid-message"))
            }
            FramingError::ConnectionClosed => Self::ConnectionClosed,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionLost(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(Error::Protocol(ProtocolError::UnexpectedEof).is_fatal());
        assert!(!Error::IllegalState("busy").is_fatal());
        assert!(!Error::Server {
            number: 208,
            state: 1,
            class: 16,
            message: String::new(),
            server: String::new(),
            procedure: String::new(),
            line: 1,
        }
        .is_fatal());
    }
}
