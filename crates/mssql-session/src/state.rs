//! The connection lifecycle state machine.
//!
//! States advance only through compare-and-exchange on an atomic cell; a
//! lost race is a protocol error, never a silent retry. Each state supplies
//! the decoder used to interpret the next inbound logical message: the
//! PRELOGIN state parses an option table, every later state parses a token
//! stream.

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;

use tds_wire::prelogin::PreLogin;
use tds_wire::token::{Token, TokenStreamReader};
use tds_wire::ProtocolError;

use crate::error::Error;
use crate::messages::{DecodeContext, DecodedMessage};

/// Lifecycle states of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// PRELOGIN request sent, awaiting the server's option table.
    PreLogin = 0,
    /// TLS handshake in flight, wrapped in PRELOGIN packets.
    SslNegotiation = 1,
    /// LOGIN7 sent, awaiting LOGINACK.
    Login = 2,
    /// Login acknowledged, draining the remaining login response.
    PostLogin = 3,
    /// Idle and able to start an exchange.
    Ready = 4,
    /// Writing an exchange's request messages.
    Sending = 5,
    /// Reading an exchange's response stream.
    Receiving = 6,
    /// Terminal: the connection is unusable.
    Closed = 7,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::PreLogin,
            1 => Self::SslNegotiation,
            2 => Self::Login,
            3 => Self::PostLogin,
            4 => Self::Ready,
            5 => Self::Sending,
            6 => Self::Receiving,
            _ => Self::Closed,
        }
    }

    /// Display name used in errors and traces.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreLogin => "PRELOGIN",
            Self::SslNegotiation => "SSL_NEGOTIATION",
            Self::Login => "LOGIN",
            Self::PostLogin => "POST_LOGIN",
            Self::Ready => "READY",
            Self::Sending => "SENDING",
            Self::Receiving => "RECEIVING",
            Self::Closed => "CLOSED",
        }
    }

    /// The decoder this state uses for the next inbound message.
    #[must_use]
    pub fn decoder(self) -> MessageDecoder {
        match self {
            Self::PreLogin | Self::SslNegotiation => decode_prelogin,
            _ => decode_tokens,
        }
    }

    /// The state a received token advances this state to, if any.
    ///
    /// Unsolicited tokens (environment changes on a READY connection,
    /// informational messages) do not advance the machine.
    #[must_use]
    pub fn advance_on(self, token: &Token) -> Option<Self> {
        match (self, token) {
            (Self::Login, Token::LoginAck(_)) => Some(Self::PostLogin),
            (Self::PostLogin, Token::Done(done)) if done.is_final() => Some(Self::Ready),
            (Self::Receiving, Token::Done(done)) if done.is_final() => Some(Self::Ready),
            _ => None,
        }
    }
}

/// Decoder function attached to a state.
pub type MessageDecoder =
    fn(&mut DecodeContext, Bytes) -> Result<DecodedMessage, Error>;

fn decode_prelogin(_ctx: &mut DecodeContext, payload: Bytes) -> Result<DecodedMessage, Error> {
    Ok(DecodedMessage::Prelogin(PreLogin::decode(&payload)?))
}

fn decode_tokens(ctx: &mut DecodeContext, payload: Bytes) -> Result<DecodedMessage, Error> {
    let mut reader = TokenStreamReader::with_metadata(payload, ctx.metadata.take());
    let mut tokens = Vec::new();
    loop {
        match reader.next_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => break,
            Err(err) => {
                ctx.metadata = reader.into_metadata();
                return Err(err.into());
            }
        }
    }
    ctx.metadata = reader.into_metadata();
    Ok(DecodedMessage::Tokens(tokens))
}

/// Compare-and-exchange cell holding the connection state.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// A cell starting in the given state.
    #[must_use]
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// The current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advance from `from` to `to`; the observed state must equal the
    /// witness or the transition fails.
    pub fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), Error> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| {
                Error::Protocol(ProtocolError::violation(format!(
                    "cannot advance state from [{}]",
                    ConnectionState::from_u8(actual).name()
                )))
            })?;
        tracing::debug!(from = from.name(), to = to.name(), "connection state");
        Ok(())
    }

    /// Move to CLOSED from any state.
    pub fn close(&self) {
        self.0.store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::token::{DoneStatus, DoneToken, LoginAckToken};

    fn final_done() -> Token {
        Token::Done(DoneToken::counted(0))
    }

    fn more_done() -> Token {
        Token::Done(DoneToken {
            status: DoneStatus::MORE,
            cur_cmd: 0,
            row_count: 0,
        })
    }

    #[test]
    fn cas_transitions() {
        let cell = StateCell::new(ConnectionState::Ready);
        cell.transition(ConnectionState::Ready, ConnectionState::Sending)
            .unwrap();
        assert_eq!(cell.load(), ConnectionState::Sending);

        // Lost race: the witness no longer matches.
        let err = cell
            .transition(ConnectionState::Ready, ConnectionState::Sending)
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("SENDING"));
    }

    #[test]
    fn close_is_terminal() {
        let cell = StateCell::new(ConnectionState::Receiving);
        cell.close();
        assert_eq!(cell.load(), ConnectionState::Closed);
        assert!(cell
            .transition(ConnectionState::Receiving, ConnectionState::Ready)
            .is_err());
    }

    #[test]
    fn login_advances_on_login_ack() {
        let ack = Token::LoginAck(LoginAckToken {
            interface: 1,
            tds_version: 0x7400_0004,
            program_name: String::new(),
            program_version: 0,
        });

        assert_eq!(
            ConnectionState::Login.advance_on(&ack),
            Some(ConnectionState::PostLogin)
        );
        assert_eq!(ConnectionState::Ready.advance_on(&ack), None);
    }

    #[test]
    fn final_done_returns_to_ready() {
        assert_eq!(
            ConnectionState::Receiving.advance_on(&final_done()),
            Some(ConnectionState::Ready)
        );
        assert_eq!(ConnectionState::Receiving.advance_on(&more_done()), None);
        assert_eq!(
            ConnectionState::PostLogin.advance_on(&final_done()),
            Some(ConnectionState::Ready)
        );
    }

    #[test]
    fn prelogin_state_uses_prelogin_decoder() {
        let mut ctx = DecodeContext::default();
        let payload = tds_wire::prelogin::PreLogin::new(0x7400_0004, Default::default()).encode();

        let decoder = ConnectionState::PreLogin.decoder();
        match decoder(&mut ctx, payload).unwrap() {
            DecodedMessage::Prelogin(_) => {}
            DecodedMessage::Tokens(_) => panic!("wrong decoder"),
        }
    }

    #[test]
    fn ready_state_uses_token_decoder() {
        let mut ctx = DecodeContext::default();
        let mut payload = bytes::BytesMut::new();
        DoneToken::counted(3).encode(tds_wire::token::TokenType::Done, &mut payload);

        let decoder = ConnectionState::Ready.decoder();
        match decoder(&mut ctx, payload.freeze()).unwrap() {
            DecodedMessage::Tokens(tokens) => {
                assert_eq!(tokens.len(), 1);
                assert!(tokens[0].is_final_done());
            }
            DecodedMessage::Prelogin(_) => panic!("wrong decoder"),
        }
    }
}
