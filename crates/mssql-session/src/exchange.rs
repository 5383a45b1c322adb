//! The request/response exchange engine.
//!
//! One exchange at a time: the stream first drains the request source into
//! the encoder, then yields inbound tokens in server order until the first
//! DONE (not DONEPROC/DONEINPROC) with the MORE bit clear. Demand is the
//! caller's polling of [`ExchangeStream::next`]; nothing is buffered beyond
//! the tokens of one logical message.

use std::collections::VecDeque;

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};

use tds_wire::token::Token;
use tds_wire::ProtocolError;

use crate::connection::Connection;
use crate::error::Error;
use crate::messages::{ClientMessage, DecodedMessage};
use crate::state::ConnectionState;

/// The response stream of one exchange.
///
/// Server errors of class above 10 do not interrupt the stream: the engine
/// keeps consuming tokens until the final DONE, returns the connection to
/// READY, and only then surfaces the failure as the stream's last item.
pub struct ExchangeStream<'a, T, S>
where
    T: AsyncRead + AsyncWrite,
    S: Stream<Item = ClientMessage> + Unpin,
{
    conn: &'a mut Connection<T>,
    requests: S,
    requests_done: bool,
    buffered: VecDeque<Token>,
    pending_error: Option<Error>,
    finished: bool,
}

impl<'a, T, S> std::fmt::Debug for ExchangeStream<'a, T, S>
where
    T: AsyncRead + AsyncWrite,
    S: Stream<Item = ClientMessage> + Unpin,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeStream")
            .field("requests_done", &self.requests_done)
            .field("buffered_len", &self.buffered.len())
            .field("pending_error", &self.pending_error)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'a, T, S> ExchangeStream<'a, T, S>
where
    T: AsyncRead + AsyncWrite,
    S: Stream<Item = ClientMessage> + Unpin,
{
    pub(crate) fn new(conn: &'a mut Connection<T>, requests: S) -> Self {
        Self {
            conn,
            requests,
            requests_done: false,
            buffered: VecDeque::new(),
            pending_error: None,
            finished: false,
        }
    }

    /// The next response token, or `None` once the exchange completed.
    ///
    /// A fatal error ends the stream immediately; a server error is
    /// delivered after the stream has drained to its final DONE.
    pub async fn next(&mut self) -> Option<Result<Token, Error>> {
        loop {
            if let Some(token) = self.buffered.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return self.pending_error.take().map(Err);
            }

            if !self.requests_done {
                match self.requests.next().await {
                    Some(message) => {
                        if let Err(err) = self.conn.send_message(&message).await {
                            return Some(self.fail(err));
                        }
                    }
                    None => {
                        self.requests_done = true;
                        if let Err(err) = self
                            .conn
                            .context()
                            .state()
                            .transition(ConnectionState::Sending, ConnectionState::Receiving)
                        {
                            return Some(self.fail(err));
                        }
                    }
                }
                continue;
            }

            let message = match self.conn.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => return Some(self.fail(Error::ConnectionClosed)),
                Err(err) => return Some(self.fail(err)),
            };

            let tokens = match self.conn.decode_message(message) {
                Ok(DecodedMessage::Tokens(tokens)) => tokens,
                Ok(DecodedMessage::Prelogin(_)) => {
                    return Some(self.fail(Error::Protocol(ProtocolError::violation(
                        "unexpected PRELOGIN message during an exchange",
                    ))));
                }
                Err(err) => return Some(self.fail(err)),
            };

            for token in tokens {
                if self.conn.is_cancelling() {
                    // Drain without delivery until the server acknowledges
                    // the attention.
                    if let Token::Done(done) = &token {
                        if done.is_attention_ack() {
                            self.conn.clear_cancelling();
                            self.finished = true;
                            tracing::debug!("attention acknowledged");
                            break;
                        }
                    }
                    continue;
                }

                match token {
                    Token::Error(msg) if !msg.is_informational() => {
                        self.pending_error = Some(Error::from_server_message(&msg));
                    }
                    token => {
                        let is_final = token.is_final_done();
                        self.buffered.push_back(token);
                        if is_final {
                            self.finished = true;
                            break;
                        }
                    }
                }
            }
        }
    }

    fn fail(&mut self, err: Error) -> Result<Token, Error> {
        if err.is_fatal() {
            self.conn.context().state().close();
        }
        self.finished = true;
        self.buffered.clear();
        Err(err)
    }

    /// Whether the exchange has delivered its final DONE.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished && self.buffered.is_empty()
    }
}
