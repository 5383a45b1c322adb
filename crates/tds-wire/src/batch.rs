//! SQL batch request encoding (packet type 0x01).
//!
//! A batch payload is the all-headers block followed by the SQL text in
//! UTF-16LE, with no length prefix; the packet framing delimits it.

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{decode_utf16_bytes, write_utf16};
use crate::error::ProtocolError;
use crate::headers::{AllHeaders, TransactionDescriptor};

/// A SQL batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlBatch {
    sql: String,
}

impl SqlBatch {
    /// Create a batch for the given SQL text.
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// The SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Encode the batch payload under the given transaction descriptor.
    #[must_use]
    pub fn encode(&self, descriptor: TransactionDescriptor) -> Bytes {
        let mut buf = BytesMut::with_capacity(22 + self.sql.len() * 2);
        AllHeaders::transactional(descriptor, 1).encode(&mut buf);
        write_utf16(&mut buf, &self.sql);
        buf.freeze()
    }

    /// Decode a batch payload (used by the scripted-server tests).
    pub fn decode(src: &mut impl Buf) -> Result<(Self, AllHeaders), ProtocolError> {
        let headers = AllHeaders::decode(src)?;
        let text_bytes = src.copy_to_bytes(src.remaining());
        let sql = decode_utf16_bytes(&text_bytes)?;
        Ok((Self { sql }, headers))
    }
}
