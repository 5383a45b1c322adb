//! # mssql-session
//!
//! The connection core of a reactive SQL Server client: the lifecycle state
//! machine (PRELOGIN through READY), per-state inbound decoders, session
//! environment bookkeeping, and the exchange engine that multiplexes one
//! logical request/response conversation at a time over a connection.
//!
//! ```rust,ignore
//! use futures_util::stream;
//! use mssql_session::{ClientMessage, ConnectOptions, Connection};
//!
//! let mut conn = Connection::connect("localhost", 1433, options).await?;
//! let mut responses = conn.exchange(stream::iter([
//!     ClientMessage::sql_batch("SELECT * FROM accounts"),
//! ]))?;
//! while let Some(token) = responses.next().await {
//!     // rows, metadata and completion markers in server order
//! }
//! ```
//!
//! All decoding and state handling for one connection happens on the task
//! that polls it; cross-task touch points (the write half used for
//! cancellation, the environment cells) are individually synchronized.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod context;
pub mod error;
pub mod exchange;
pub mod messages;
pub mod state;

pub use connection::{AttentionHandle, ConnectOptions, Connection, LoginConfig, TlsOptions};
pub use context::{SessionContext, TransactionStatus};
pub use error::Error;
pub use exchange::ExchangeStream;
pub use messages::{ClientMessage, DecodedMessage};
pub use state::{ConnectionState, MessageDecoder, StateCell};
