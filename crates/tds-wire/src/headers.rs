//! The all-headers block prepended to SQL batch and RPC requests.
//!
//! TDS 7.2+ requires every SQL_BATCH and RPC payload to start with an
//! ALL_HEADERS section. This core always sends exactly one header, the
//! transactional header, carrying the session's transaction descriptor and
//! the outstanding request count.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// The 8-byte opaque transaction handle issued by the server.
///
/// All zeros while the session is in auto-commit; the server assigns a value
/// through an ENVCHANGE when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionDescriptor([u8; 8]);

impl TransactionDescriptor {
    /// Descriptor length on the wire.
    pub const LENGTH: usize = 8;

    /// The all-zeros descriptor used outside explicit transactions.
    pub const EMPTY: Self = Self([0; 8]);

    /// Build a descriptor from the bytes of an ENVCHANGE value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidTransactionDescriptor(bytes.len()))?;
        Ok(Self(array))
    }

    /// The raw descriptor bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// The descriptor as a little-endian integer, for atomic storage.
    #[must_use]
    pub const fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// Rebuild a descriptor from its atomic representation.
    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw.to_le_bytes())
    }

    /// Whether this is the empty (auto-commit) descriptor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 8]
    }
}

/// The ALL_HEADERS block with its single transactional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllHeaders {
    /// Transaction descriptor of the issuing session.
    pub transaction_descriptor: TransactionDescriptor,
    /// Number of requests in flight, 1 without MARS.
    pub outstanding_requests: u32,
}

/// Header type of the transaction descriptor header.
const HEADER_TYPE_TRANSACTION: u16 = 0x0002;

/// Encoded size of the whole block: total length (4) + header length (4) +
/// header type (2) + descriptor (8) + outstanding requests (4).
pub const ALL_HEADERS_LENGTH: usize = 22;

/// Encoded size of the transactional header, including its own length field.
const TRANSACTION_HEADER_LENGTH: usize = 18;

impl AllHeaders {
    /// Build the block for a request issued under the given descriptor.
    #[must_use]
    pub fn transactional(
        transaction_descriptor: TransactionDescriptor,
        outstanding_requests: u32,
    ) -> Self {
        Self {
            transaction_descriptor,
            outstanding_requests,
        }
    }

    /// Total encoded length of the block.
    #[must_use]
    pub const fn len(&self) -> usize {
        ALL_HEADERS_LENGTH
    }

    /// The block is never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Write the block.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(ALL_HEADERS_LENGTH as u32);
        dst.put_u32_le(TRANSACTION_HEADER_LENGTH as u32);
        dst.put_u16_le(HEADER_TYPE_TRANSACTION);
        dst.put_slice(self.transaction_descriptor.as_bytes());
        dst.put_u32_le(self.outstanding_requests);
    }

    /// Parse and validate a block.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < ALL_HEADERS_LENGTH {
            return Err(ProtocolError::UnexpectedEof);
        }

        let total_length = src.get_u32_le();
        if total_length as usize != ALL_HEADERS_LENGTH {
            return Err(ProtocolError::violation(format!(
                "unexpected ALL_HEADERS length {total_length}"
            )));
        }
        let header_length = src.get_u32_le();
        if header_length as usize != TRANSACTION_HEADER_LENGTH {
            return Err(ProtocolError::violation(format!(
                "unexpected transaction header length {header_length}"
            )));
        }
        let header_type = src.get_u16_le();
        if header_type != HEADER_TYPE_TRANSACTION {
            return Err(ProtocolError::violation(format!(
                "unexpected header type 0x{header_type:04X}"
            )));
        }

        let mut descriptor = [0u8; 8];
        src.copy_to_slice(&mut descriptor);
        let outstanding_requests = src.get_u32_le();

        Ok(Self {
            transaction_descriptor: TransactionDescriptor(descriptor),
            outstanding_requests,
        })
    }
}
