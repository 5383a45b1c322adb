//! Property tests: splitting a logical message and reassembling it through
//! the codec is the identity, and the emitted packets keep their invariants.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

use mssql_framing::{split_message, MessageAssembler, TdsCodec};
use tds_wire::packet::{PacketType, PACKET_HEADER_SIZE};

proptest! {
    #[test]
    fn split_reassemble_identity(
        payload in proptest::collection::vec(any::<u8>(), 0..20_000),
        packet_size in prop_oneof![Just(512usize), Just(4096), Just(8192)],
    ) {
        let original = Bytes::from(payload);
        let packets = split_message(PacketType::SqlBatch, original.clone(), packet_size);

        // Chunk sizes and the end-of-message flag.
        prop_assert!(!packets.is_empty());
        for (i, packet) in packets.iter().enumerate() {
            prop_assert!(packet.payload.len() <= packet_size - PACKET_HEADER_SIZE);
            prop_assert_eq!(packet.is_end_of_message(), i + 1 == packets.len());
        }

        // Drive the packets through the encoder and decoder.
        let mut encoder = TdsCodec::new();
        let mut wire = BytesMut::new();
        for packet in packets {
            encoder.encode(packet, &mut wire).unwrap();
        }

        let mut decoder = TdsCodec::new();
        let mut assembler = MessageAssembler::new();
        let mut reassembled = None;
        let mut last_packet_id: Option<u8> = None;

        while let Some(packet) = decoder.decode(&mut wire).unwrap() {
            // Header invariants: correct length, contiguous ids mod 256.
            prop_assert_eq!(
                packet.header.length as usize,
                PACKET_HEADER_SIZE + packet.payload.len()
            );
            if let Some(previous) = last_packet_id {
                prop_assert_eq!(packet.header.packet_id, previous.wrapping_add(1));
            }
            last_packet_id = Some(packet.header.packet_id);

            if let Some(message) = assembler.push(packet).unwrap() {
                prop_assert!(reassembled.is_none());
                reassembled = Some(message);
            }
        }

        prop_assert!(wire.is_empty());
        let message = reassembled.expect("one complete message");
        prop_assert_eq!(message.packet_type, PacketType::SqlBatch);
        prop_assert_eq!(message.payload, original);
    }

    #[test]
    fn arbitrary_byte_streams_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut decoder = TdsCodec::new();
        let mut src = BytesMut::from(&bytes[..]);
        // Errors are acceptable; panics and infinite loops are not.
        for _ in 0..64 {
            match decoder.decode(&mut src) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }
    }
}
