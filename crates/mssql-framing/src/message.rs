//! Logical message reassembly.
//!
//! A logical message is the concatenation of packet payloads sharing one
//! packet type, up to and including the packet with END_OF_MESSAGE set.
//! Sequence numbers must increase mod 256 within a message; a gap means
//! packets were lost or reordered underneath us and the connection is no
//! longer trustworthy.

use bytes::{Bytes, BytesMut};
use tds_wire::packet::PacketType;

use crate::error::FramingError;
use crate::packet_codec::Packet;

/// A complete logical message.
#[derive(Debug, Clone)]
pub struct Message {
    /// The packet type all fragments shared.
    pub packet_type: PacketType,
    /// Concatenated payloads.
    pub payload: Bytes,
}

impl Message {
    /// Payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Reassembles packets into logical messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
    next_packet_id: Option<u8>,
}

impl MessageAssembler {
    /// A fresh assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet; returns the finished message when this packet
    /// carried END_OF_MESSAGE.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>, FramingError> {
        if let Some(expected) = self.next_packet_id {
            if packet.header.packet_id != expected {
                return Err(FramingError::PacketIdGap {
                    expected,
                    actual: packet.header.packet_id,
                });
            }
        }
        self.next_packet_id = Some(packet.header.packet_id.wrapping_add(1));

        if self.packet_type.is_none() {
            self.packet_type = Some(packet.header.packet_type);
        }
        self.buffer.extend_from_slice(&packet.payload);

        if !packet.is_end_of_message() {
            return Ok(None);
        }

        let packet_type = self.packet_type.take().unwrap_or(packet.header.packet_type);
        self.next_packet_id = None;
        Ok(Some(Message {
            packet_type,
            payload: self.buffer.split().freeze(),
        }))
    }

    /// Whether a message is partially assembled.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Drop any partial message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.next_packet_id = None;
    }
}
