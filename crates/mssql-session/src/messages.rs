//! Outbound client messages and decoded inbound messages.

use bytes::Bytes;

use tds_wire::batch::SqlBatch;
use tds_wire::packet::PacketType;
use tds_wire::prelogin::PreLogin;
use tds_wire::rpc::RpcRequest;
use tds_wire::token::{ColumnMetadata, Token};
use tds_wire::Login7;

use crate::context::SessionContext;

/// A logical request message produced by the caller.
///
/// The transaction descriptor is not part of the message: it is read from
/// the session at encode time, so a request built before an ENVCHANGE still
/// sees the descriptor that is current when it is written.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// A SQL batch (packet type 0x01).
    SqlBatch(SqlBatch),
    /// An RPC request (packet type 0x03).
    Rpc(RpcRequest),
    /// A PRELOGIN request (packet type 0x12).
    Prelogin(PreLogin),
    /// A LOGIN7 request (packet type 0x10).
    Login(Box<Login7>),
    /// An ATTENTION signal (packet type 0x06, empty payload).
    Attention,
}

impl ClientMessage {
    /// A SQL batch for the given text.
    pub fn sql_batch(sql: impl Into<String>) -> Self {
        Self::SqlBatch(SqlBatch::new(sql))
    }

    /// The packet type this message travels as.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::SqlBatch(_) => PacketType::SqlBatch,
            Self::Rpc(_) => PacketType::Rpc,
            Self::Prelogin(_) => PacketType::PreLogin,
            Self::Login(_) => PacketType::Tds7Login,
            Self::Attention => PacketType::Attention,
        }
    }

    /// Encode the message body against the session's current state.
    #[must_use]
    pub fn encode(&self, context: &SessionContext) -> Bytes {
        match self {
            Self::SqlBatch(batch) => batch.encode(context.transaction_descriptor()),
            Self::Rpc(rpc) => rpc.encode(context.transaction_descriptor()),
            Self::Prelogin(prelogin) => prelogin.encode(),
            Self::Login(login) => login.encode(),
            Self::Attention => Bytes::new(),
        }
    }
}

/// A decoded inbound logical message.
#[derive(Debug)]
pub enum DecodedMessage {
    /// The PRELOGIN response option table.
    Prelogin(PreLogin),
    /// The tokens of a tabular response.
    Tokens(Vec<Token>),
}

/// Decoder context carried across messages of one response.
#[derive(Debug, Default)]
pub struct DecodeContext {
    /// The column metadata rows decode against.
    pub metadata: Option<ColumnMetadata>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::ConnectionState;
    use tds_wire::headers::AllHeaders;

    #[test]
    fn batch_snapshots_current_descriptor() {
        use bytes::Bytes;
        use tds_wire::token::{EnvChangeToken, EnvChangeType, EnvChangeValue};

        let context = SessionContext::new(ConnectionState::Ready);
        let message = ClientMessage::sql_batch("SELECT 1");

        let before = message.encode(&context);
        let headers = AllHeaders::decode(&mut &before[..]).unwrap();
        assert!(headers.transaction_descriptor.is_empty());

        context
            .apply(&Token::EnvChange(EnvChangeToken {
                change_type: EnvChangeType::BeginTransaction,
                new_value: EnvChangeValue::Binary(Bytes::from_static(&[8, 7, 6, 5, 4, 3, 2, 1])),
                old_value: EnvChangeValue::Binary(Bytes::new()),
            }))
            .unwrap();

        let after = message.encode(&context);
        let headers = AllHeaders::decode(&mut &after[..]).unwrap();
        assert_eq!(
            headers.transaction_descriptor.as_bytes(),
            &[8, 7, 6, 5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn attention_is_empty() {
        let context = SessionContext::new(ConnectionState::Ready);
        assert!(ClientMessage::Attention.encode(&context).is_empty());
        assert_eq!(
            ClientMessage::Attention.packet_type(),
            PacketType::Attention
        );
    }
}
