//! Framing errors.

use thiserror::Error;

/// Errors raised by the packet framing layer.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Transport failure underneath the codec.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire grammar violation inside a packet.
    #[error(transparent)]
    Protocol(#[from] tds_wire::ProtocolError),

    /// A header announced a length below the header size or above the
    /// negotiated maximum.
    #[error("bad packet length {length} (max {max})")]
    BadPacketLength {
        /// The announced total length.
        length: usize,
        /// The largest length this codec accepts.
        max: usize,
    },

    /// Packet sequence numbers within a message were not contiguous.
    #[error("packet id gap: expected {expected}, received {actual}")]
    PacketIdGap {
        /// The sequence number that should have arrived.
        expected: u8,
        /// The sequence number that did arrive.
        actual: u8,
    },

    /// The transport closed in the middle of a logical message.
    #[error("connection closed mid-message")]
    TruncatedPacket,

    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,
}
