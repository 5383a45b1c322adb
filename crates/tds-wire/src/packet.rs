//! TDS packet header definitions.
//!
//! Every unit on the wire is a packet: an 8-byte header followed by up to
//! `packet size - 8` payload bytes. The header's length field is the only
//! big-endian integer in the whole protocol.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Smallest negotiable packet size.
pub const MIN_PACKET_SIZE: usize = 512;

/// Largest negotiable packet size.
pub const MAX_PACKET_SIZE: usize = 32767;

/// Default packet size before the server renegotiates it.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// TDS packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Pre-TDS7 login.
    PreTds7Login = 0x02,
    /// Remote procedure call.
    Rpc = 0x03,
    /// Tabular response from the server.
    TabularResult = 0x04,
    /// Attention signal (query cancellation).
    Attention = 0x06,
    /// Bulk load data.
    BulkLoadData = 0x07,
    /// Federated authentication token.
    FedAuthToken = 0x08,
    /// Transaction manager request.
    TransactionManager = 0x0E,
    /// TDS7+ login.
    Tds7Login = 0x10,
    /// SSPI authentication.
    Sspi = 0x11,
    /// Pre-login negotiation.
    PreLogin = 0x12,
}

impl PacketType {
    const ALL: [PacketType; 11] = [
        Self::SqlBatch,
        Self::PreTds7Login,
        Self::Rpc,
        Self::TabularResult,
        Self::Attention,
        Self::BulkLoadData,
        Self::FedAuthToken,
        Self::TransactionManager,
        Self::Tds7Login,
        Self::Sspi,
        Self::PreLogin,
    ];

    /// Parse a packet type byte, rejecting values outside the grammar.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|&candidate| candidate as u8 == value)
            .ok_or(ProtocolError::InvalidPacketType(value))
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Last packet of a logical message.
        const END_OF_MESSAGE = 0x01;
        /// The event carried by this message is to be ignored.
        const IGNORE_EVENT = 0x02;
        /// Reset connection state before processing. First packet only.
        const RESET_CONNECTION = 0x08;
        /// Reset connection state but keep the open transaction.
        const RESET_CONNECTION_KEEP_TRANSACTION = 0x10;
    }
}

/// The 8-byte header carried by every packet.
///
/// `spid` and `window` are server-side concerns; a client writes zeros.
/// `packet_id` increments mod 256 across the packets of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Type of the message this packet belongs to.
    pub packet_type: PacketType,
    /// Status flags.
    pub status: PacketStatus,
    /// Total length including this header, big-endian on the wire.
    pub length: u16,
    /// Server process id.
    pub spid: u16,
    /// Sequence number within the message.
    pub packet_id: u8,
    /// Unused window field.
    pub window: u8,
}

impl PacketHeader {
    /// A client header with zeroed spid, packet id and window.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Parse a header from the next 8 bytes.
    ///
    /// The length field is validated against the header size here; the
    /// framing layer additionally bounds it by the negotiated maximum.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }

        let header = Self {
            packet_type: PacketType::from_u8(src.get_u8())?,
            status: PacketStatus::from_bits_truncate(src.get_u8()),
            length: src.get_u16(),
            spid: src.get_u16(),
            packet_id: src.get_u8(),
            window: src.get_u8(),
        };

        if (header.length as usize) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::BadPacketLength(header.length));
        }
        Ok(header)
    }

    /// Write the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Payload length: the total length minus the header.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Whether this packet terminates its logical message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }

    /// A copy with the given sequence number.
    #[must_use]
    pub const fn with_packet_id(mut self, id: u8) -> Self {
        self.packet_id = id;
        self
    }
}
