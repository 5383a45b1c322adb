//! Connection-wide session state.
//!
//! The decoder applies every ENVCHANGE, FEATUREEXTACK, INFO and ERROR token
//! to this context regardless of the lifecycle state. Each cell is an
//! independent single-slot atomic: writers are the inbound decoder only,
//! readers take a consistent snapshot when they start building a request.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use tds_wire::collation::Collation;
use tds_wire::headers::TransactionDescriptor;
use tds_wire::packet::{DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use tds_wire::token::{EnvChangeType, Token};

use crate::error::Error;
use crate::state::{ConnectionState, StateCell};

/// Transaction status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Statements commit individually.
    AutoCommit = 0,
    /// An explicit transaction was used and has ended.
    Explicit = 1,
    /// A transaction is open; the descriptor identifies it.
    Started = 2,
}

impl TransactionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Explicit,
            2 => Self::Started,
            _ => Self::AutoCommit,
        }
    }
}

/// Shared per-connection state.
#[derive(Debug)]
pub struct SessionContext {
    state: StateCell,
    transaction_descriptor: AtomicU64,
    transaction_status: AtomicU8,
    collation: Mutex<Option<Collation>>,
    column_encryption: AtomicBool,
    packet_size: AtomicU32,
}

impl SessionContext {
    /// A context starting in the given lifecycle state.
    #[must_use]
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: StateCell::new(initial),
            transaction_descriptor: AtomicU64::new(TransactionDescriptor::EMPTY.to_u64()),
            transaction_status: AtomicU8::new(TransactionStatus::AutoCommit as u8),
            collation: Mutex::new(None),
            column_encryption: AtomicBool::new(false),
            packet_size: AtomicU32::new(DEFAULT_PACKET_SIZE as u32),
        }
    }

    /// The state cell.
    #[must_use]
    pub fn state(&self) -> &StateCell {
        &self.state
    }

    /// Snapshot of the transaction descriptor.
    #[must_use]
    pub fn transaction_descriptor(&self) -> TransactionDescriptor {
        TransactionDescriptor::from_u64(self.transaction_descriptor.load(Ordering::Acquire))
    }

    /// Snapshot of the transaction status.
    #[must_use]
    pub fn transaction_status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.transaction_status.load(Ordering::Acquire))
    }

    /// The database collation, once the server has announced it.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        *self.collation.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Whether the server acknowledged column encryption support.
    #[must_use]
    pub fn column_encryption_supported(&self) -> bool {
        self.column_encryption.load(Ordering::Acquire)
    }

    /// The negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size.load(Ordering::Acquire) as usize
    }

    /// Apply a token's side effects to the session.
    pub fn apply(&self, token: &Token) -> Result<(), Error> {
        match token {
            Token::EnvChange(env) => match env.change_type {
                EnvChangeType::BeginTransaction | EnvChangeType::EnlistDtcTransaction => {
                    let bytes = env
                        .transaction_descriptor()
                        .ok_or_else(|| {
                            tds_wire::ProtocolError::violation("missing transaction descriptor")
                        })?;
                    let descriptor = TransactionDescriptor::from_bytes(bytes)?;
                    self.transaction_descriptor
                        .store(descriptor.to_u64(), Ordering::Release);
                    self.transaction_status
                        .store(TransactionStatus::Started as u8, Ordering::Release);
                    tracing::debug!("transaction started");
                }
                EnvChangeType::CommitTransaction | EnvChangeType::RollbackTransaction => {
                    self.transaction_descriptor
                        .store(TransactionDescriptor::EMPTY.to_u64(), Ordering::Release);
                    self.transaction_status
                        .store(TransactionStatus::Explicit as u8, Ordering::Release);
                    tracing::debug!(kind = ?env.change_type, "transaction ended");
                }
                EnvChangeType::SqlCollation => {
                    if let Some(collation) = env.collation() {
                        *self
                            .collation
                            .lock()
                            .unwrap_or_else(|poison| poison.into_inner()) = Some(collation);
                    }
                }
                EnvChangeType::PacketSize => {
                    if let Some(size) = env.packet_size() {
                        let clamped =
                            size.clamp(MIN_PACKET_SIZE as u32, MAX_PACKET_SIZE as u32);
                        self.packet_size.store(clamped, Ordering::Release);
                        tracing::debug!(size = clamped, "packet size renegotiated");
                    }
                }
                EnvChangeType::Routing => {
                    tracing::debug!("routing announced by server");
                }
                _ => {}
            },
            Token::FeatureExtAck(ack) => {
                if ack.column_encryption_supported() {
                    self.column_encryption.store(true, Ordering::Release);
                }
            }
            Token::Info(info) => {
                tracing::debug!(
                    number = info.number,
                    class = info.class,
                    message = %info.message,
                    "server info"
                );
            }
            Token::Error(error) => {
                tracing::warn!(
                    number = error.number,
                    class = error.class,
                    message = %error.message,
                    "server error"
                );
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tds_wire::token::{EnvChangeToken, EnvChangeValue, FeatureAck, FeatureExtAckToken};

    fn env(change_type: EnvChangeType, new_value: EnvChangeValue) -> Token {
        Token::EnvChange(EnvChangeToken {
            change_type,
            new_value,
            old_value: EnvChangeValue::Binary(Bytes::new()),
        })
    }

    #[test]
    fn begin_transaction_sets_descriptor() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        assert!(ctx.transaction_descriptor().is_empty());

        ctx.apply(&env(
            EnvChangeType::BeginTransaction,
            EnvChangeValue::Binary(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8])),
        ))
        .unwrap();

        assert_eq!(
            ctx.transaction_descriptor().as_bytes(),
            &[1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(ctx.transaction_status(), TransactionStatus::Started);
    }

    #[test]
    fn short_descriptor_is_protocol_error() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        let err = ctx
            .apply(&env(
                EnvChangeType::BeginTransaction,
                EnvChangeValue::Binary(Bytes::from_static(&[1, 2, 3])),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn commit_clears_descriptor() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        ctx.apply(&env(
            EnvChangeType::BeginTransaction,
            EnvChangeValue::Binary(Bytes::from_static(&[9, 9, 9, 9, 9, 9, 9, 9])),
        ))
        .unwrap();

        ctx.apply(&env(
            EnvChangeType::CommitTransaction,
            EnvChangeValue::Binary(Bytes::new()),
        ))
        .unwrap();

        assert!(ctx.transaction_descriptor().is_empty());
        assert_eq!(ctx.transaction_status(), TransactionStatus::Explicit);
    }

    #[test]
    fn collation_is_recorded() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        ctx.apply(&env(
            EnvChangeType::SqlCollation,
            EnvChangeValue::Binary(Bytes::from_static(&[0x09, 0x04, 0xD0, 0x00, 0x34])),
        ))
        .unwrap();

        let collation = ctx.collation().unwrap();
        assert_eq!(collation.sort_id, 0x34);
    }

    #[test]
    fn packet_size_is_clamped() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        ctx.apply(&env(
            EnvChangeType::PacketSize,
            EnvChangeValue::String("8192".to_string()),
        ))
        .unwrap();
        assert_eq!(ctx.packet_size(), 8192);

        ctx.apply(&env(
            EnvChangeType::PacketSize,
            EnvChangeValue::String("100".to_string()),
        ))
        .unwrap();
        assert_eq!(ctx.packet_size(), MIN_PACKET_SIZE);
    }

    #[test]
    fn feature_ack_records_encryption() {
        let ctx = SessionContext::new(ConnectionState::Ready);
        assert!(!ctx.column_encryption_supported());

        ctx.apply(&Token::FeatureExtAck(FeatureExtAckToken {
            features: vec![FeatureAck {
                feature_id: FeatureExtAckToken::COLUMN_ENCRYPTION,
                data: Bytes::from_static(&[1]),
            }],
        }))
        .unwrap();

        assert!(ctx.column_encryption_supported());
    }
}
