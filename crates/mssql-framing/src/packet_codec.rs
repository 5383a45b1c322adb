//! TDS packet codec and outbound message splitting.

use bytes::{BufMut, Bytes, BytesMut};
use tds_wire::packet::{
    PacketHeader, PacketStatus, PacketType, MAX_PACKET_SIZE, PACKET_HEADER_SIZE,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;

/// One TDS packet: header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The packet header; length and packet id are stamped by the encoder.
    pub header: PacketHeader,
    /// Payload without the header.
    pub payload: Bytes,
}

impl Packet {
    /// A packet with the given header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Total size including the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Whether this packet terminates its logical message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Split a logical message into packets of at most `packet_size` bytes.
///
/// Non-final packets carry status 0; the last carries END_OF_MESSAGE. The
/// packet id field is left for the encoder's per-connection counter.
#[must_use]
pub fn split_message(packet_type: PacketType, payload: Bytes, packet_size: usize) -> Vec<Packet> {
    split_message_with_reset(packet_type, payload, packet_size, false)
}

/// Split a logical message, optionally requesting a connection reset.
///
/// The RESET_CONNECTION status may only appear on the first packet of a
/// message. Nothing in this crate sets it; callers opt in explicitly.
#[must_use]
pub fn split_message_with_reset(
    packet_type: PacketType,
    payload: Bytes,
    packet_size: usize,
    reset_connection: bool,
) -> Vec<Packet> {
    let chunk_size = packet_size.saturating_sub(PACKET_HEADER_SIZE).max(1);
    let chunk_count = payload.len().div_ceil(chunk_size).max(1);

    let mut packets = Vec::with_capacity(chunk_count);
    let mut remaining = payload;

    for i in 0..chunk_count {
        let chunk = remaining.split_to(remaining.len().min(chunk_size));

        let mut status = if i + 1 == chunk_count {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::empty()
        };
        if i == 0 && reset_connection {
            status |= PacketStatus::RESET_CONNECTION;
        }

        let header = PacketHeader::new(packet_type, status, 0);
        packets.push(Packet::new(header, chunk));
    }

    packets
}

/// Packet-level codec for `tokio_util` framing.
///
/// The decoder validates headers and buffers until a whole packet is
/// available; the encoder stamps the length and the connection's packet id
/// counter.
#[derive(Debug)]
pub struct TdsCodec {
    max_packet_size: usize,
    packet_id: u8,
}

impl TdsCodec {
    /// A codec accepting packets up to the protocol maximum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_id: 1,
        }
    }

    /// Restrict the accepted packet size.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(MAX_PACKET_SIZE);
        self
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        id
    }

    /// Reset the outbound sequence counter to 1.
    pub fn reset_packet_id(&mut self) {
        self.packet_id = 1;
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Header length is big-endian at bytes 2..4.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < PACKET_HEADER_SIZE || length > self.max_packet_size {
            return Err(FramingError::BadPacketLength {
                length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut packet_bytes = src.split_to(length).freeze();
        let header = PacketHeader::decode(&mut packet_bytes)?;

        tracing::trace!(
            packet_type = ?header.packet_type,
            length,
            packet_id = header.packet_id,
            eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, packet_bytes)))
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = item.total_size();
        if total > self.max_packet_size {
            return Err(FramingError::BadPacketLength {
                length: total,
                max: self.max_packet_size,
            });
        }

        let header = item
            .header
            .with_packet_id(self.next_packet_id());

        dst.reserve(total);
        PacketHeader {
            length: total as u16,
            ..header
        }
        .encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total,
            packet_id = header.packet_id,
            "encoded packet"
        );

        Ok(())
    }
}
