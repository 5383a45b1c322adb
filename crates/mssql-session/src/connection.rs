//! The connection: transport halves, lifecycle driving and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use mssql_framing::{
    split_message, MaybeTls, Message, MessageAssembler, PacketReader, PacketStream, PacketWriter,
    TlsPreloginStream,
};
use tds_wire::login::TDS_V7_4;
use tds_wire::packet::PacketType;
use tds_wire::prelogin::{EncryptionLevel, PreLogin};
use tds_wire::token::Token;
use tds_wire::{Login7, ProtocolError};

use crate::context::{SessionContext, TransactionStatus};
use crate::error::Error;
use crate::exchange::ExchangeStream;
use crate::messages::{ClientMessage, DecodeContext, DecodedMessage};
use crate::state::ConnectionState;

/// SQL authentication and session naming for LOGIN7.
#[derive(Debug, Clone, Default)]
pub struct LoginConfig {
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Initial database, empty for the login's default.
    pub database: String,
    /// Client machine name reported to the server.
    pub hostname: String,
    /// Application name reported to the server.
    pub app_name: String,
}

/// TLS material for the PRELOGIN-wrapped handshake.
#[derive(Clone)]
pub struct TlsOptions {
    /// Client configuration; certificate policy belongs to the caller.
    pub config: Arc<rustls::ClientConfig>,
    /// Name presented for certificate validation.
    pub server_name: String,
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// Options for [`Connection::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// TCP connect timeout.
    pub timeout: Duration,
    /// TLS material; `None` refuses encrypted sessions.
    pub tls: Option<TlsOptions>,
    /// Login credentials.
    pub login: LoginConfig,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tls: None,
            login: LoginConfig::default(),
        }
    }
}

/// A TDS connection carrying at most one exchange at a time.
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: PacketReader<ReadHalf<T>>,
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    assembler: MessageAssembler,
    decode: DecodeContext,
    context: Arc<SessionContext>,
    cancelling: Arc<AtomicBool>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn from_parts(transport: T, context: Arc<SessionContext>) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        Self {
            reader: PacketReader::new(read_half),
            writer: Arc::new(Mutex::new(PacketWriter::new(write_half))),
            assembler: MessageAssembler::new(),
            decode: DecodeContext::default(),
            context,
            cancelling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wrap a transport whose handshake completed elsewhere; the connection
    /// starts READY. Used by scripted-transport tests and custom dialers.
    #[must_use]
    pub fn ready(transport: T) -> Self {
        Self::from_parts(
            transport,
            Arc::new(SessionContext::new(ConnectionState::Ready)),
        )
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.context.state().load()
    }

    /// The shared session context.
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Snapshot of the transaction descriptor.
    #[must_use]
    pub fn transaction_descriptor(&self) -> tds_wire::TransactionDescriptor {
        self.context.transaction_descriptor()
    }

    /// Snapshot of the transaction status.
    #[must_use]
    pub fn transaction_status(&self) -> TransactionStatus {
        self.context.transaction_status()
    }

    /// The database collation, once announced.
    #[must_use]
    pub fn collation(&self) -> Option<tds_wire::Collation> {
        self.context.collation()
    }

    /// Whether the server acknowledged column encryption support.
    #[must_use]
    pub fn column_encryption_supported(&self) -> bool {
        self.context.column_encryption_supported()
    }

    /// A handle for cancelling the running exchange from another task.
    #[must_use]
    pub fn attention_handle(&self) -> AttentionHandle<T> {
        AttentionHandle {
            writer: Arc::clone(&self.writer),
            cancelling: Arc::clone(&self.cancelling),
        }
    }

    pub(crate) fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }

    pub(crate) fn clear_cancelling(&self) {
        self.cancelling.store(false, Ordering::Release);
    }

    /// Begin an exchange: forward the request messages, then stream the
    /// response tokens until the final DONE.
    pub fn exchange<S>(&mut self, requests: S) -> Result<ExchangeStream<'_, T, S>, Error>
    where
        S: Stream<Item = ClientMessage> + Unpin,
    {
        match self.state() {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Ready => {
                self.context
                    .state()
                    .transition(ConnectionState::Ready, ConnectionState::Sending)?;
                Ok(ExchangeStream::new(self, requests))
            }
            _ => Err(Error::IllegalState("an exchange is already active")),
        }
    }

    /// Close the connection. Every later exchange fails.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.context.state().close();
        let mut writer = self.writer.lock().await;
        writer.close().await.map_err(Error::from)
    }

    /// Write one client message, split at the negotiated packet size.
    pub(crate) async fn send_message(&self, message: &ClientMessage) -> Result<(), Error> {
        let payload = message.encode(&self.context);
        let packets = split_message(
            message.packet_type(),
            payload,
            self.context.packet_size(),
        );

        tracing::debug!(
            packet_type = ?message.packet_type(),
            packets = packets.len(),
            "request"
        );

        let mut writer = self.writer.lock().await;
        for packet in packets {
            writer.feed(packet).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Read the next logical message, reassembling packets.
    pub(crate) async fn read_message(&mut self) -> Result<Option<Message>, Error> {
        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet).map_err(|err| {
                        self.context.state().close();
                        Error::from(err)
                    })? {
                        return Ok(Some(message));
                    }
                }
                Some(Err(err)) => {
                    self.context.state().close();
                    return Err(err.into());
                }
                None => {
                    let truncated = self.assembler.has_partial();
                    self.context.state().close();
                    if truncated {
                        return Err(Error::Protocol(ProtocolError::violation(
                            "connection closed mid-message",
                        )));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Decode a logical message with the current state's decoder and apply
    /// every token's session side effects and state transitions.
    pub(crate) fn decode_message(&mut self, message: Message) -> Result<DecodedMessage, Error> {
        let decoder = self.state().decoder();
        let decoded = decoder(&mut self.decode, message.payload).inspect_err(|err| {
            if err.is_fatal() {
                self.context.state().close();
            }
        })?;

        if let DecodedMessage::Tokens(tokens) = &decoded {
            for token in tokens {
                self.context.apply(token).inspect_err(|_| {
                    self.context.state().close();
                })?;

                let current = self.state();
                if let Some(next) = current.advance_on(token) {
                    self.context.state().transition(current, next)?;
                }
            }
        }

        Ok(decoded)
    }
}

impl Connection<MaybeTls<TcpStream>> {
    /// Connect, negotiate PRELOGIN (and TLS when agreed), and log in.
    pub async fn connect(
        host: &str,
        port: u16,
        options: ConnectOptions,
    ) -> Result<Self, Error> {
        let tcp = timeout(options.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::ConnectTimeout)??;

        let context = Arc::new(SessionContext::new(ConnectionState::PreLogin));
        let mut stream = PacketStream::new(tcp);

        let offered = if options.tls.is_some() {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        };
        let request = PreLogin::new(TDS_V7_4, offered);
        send_handshake_message(&mut stream, PacketType::PreLogin, request.encode()).await?;

        let payload = read_handshake_message(&mut stream).await?;
        let mut decode = DecodeContext::default();
        let response = match ConnectionState::PreLogin.decoder()(&mut decode, payload)? {
            DecodedMessage::Prelogin(response) => response,
            DecodedMessage::Tokens(_) => {
                return Err(Error::Protocol(ProtocolError::violation(
                    "expected a PRELOGIN response",
                )));
            }
        };

        let transport = if response.encryption.requires_tls() {
            let tls = options
                .tls
                .as_ref()
                .ok_or_else(|| Error::Tls("server requires encryption".to_string()))?;

            context
                .state()
                .transition(ConnectionState::PreLogin, ConnectionState::SslNegotiation)?;

            let server_name = ServerName::try_from(tls.server_name.clone())
                .map_err(|err| Error::Tls(err.to_string()))?;
            let connector = TlsConnector::from(Arc::clone(&tls.config));
            let wrapped = TlsPreloginStream::new(stream.into_inner());
            let mut tls_stream = connector
                .connect(server_name, wrapped)
                .await
                .map_err(|err| Error::Tls(err.to_string()))?;
            tls_stream.get_mut().0.handshake_complete();

            context
                .state()
                .transition(ConnectionState::SslNegotiation, ConnectionState::Login)?;
            MaybeTls::Tls(Box::new(tls_stream))
        } else {
            if options.tls.is_some() {
                return Err(Error::Tls(
                    "server refused the requested encryption".to_string(),
                ));
            }
            context
                .state()
                .transition(ConnectionState::PreLogin, ConnectionState::Login)?;
            MaybeTls::Plain(stream.into_inner())
        };

        let mut conn = Connection::from_parts(transport, context);

        let login = Login7::new(&options.login.username, &options.login.password)
            .with_database(&options.login.database)
            .with_hostname(&options.login.hostname)
            .with_packet_size(conn.context.packet_size() as u32);
        conn.send_message(&ClientMessage::Login(Box::new(login)))
            .await?;

        // Drain the login response; LOGINACK advances to POST_LOGIN, the
        // final DONE to READY.
        while conn.state() != ConnectionState::Ready {
            let Some(message) = conn.read_message().await? else {
                return Err(Error::ConnectionClosed);
            };
            if let DecodedMessage::Tokens(tokens) = conn.decode_message(message)? {
                for token in &tokens {
                    if let Token::Error(msg) = token {
                        if !msg.is_informational() {
                            let err = Error::from_server_message(msg);
                            conn.context.state().close();
                            return Err(err);
                        }
                    }
                }
            }
        }

        Ok(conn)
    }
}

async fn send_handshake_message(
    stream: &mut PacketStream<TcpStream>,
    packet_type: PacketType,
    payload: Bytes,
) -> Result<(), Error> {
    for packet in split_message(packet_type, payload, tds_wire::DEFAULT_PACKET_SIZE) {
        stream.feed(packet).await?;
    }
    stream.flush().await?;
    Ok(())
}

async fn read_handshake_message(stream: &mut PacketStream<TcpStream>) -> Result<Bytes, Error> {
    let mut assembler = MessageAssembler::new();
    loop {
        match stream.next().await {
            Some(Ok(packet)) => {
                if let Some(message) = assembler.push(packet)? {
                    return Ok(message.payload);
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Err(Error::ConnectionClosed),
        }
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state().name())
            .field("cancelling", &self.is_cancelling())
            .finish_non_exhaustive()
    }
}

/// Clone-able handle that cancels the running exchange by writing an
/// ATTENTION packet through the shared write half.
pub struct AttentionHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    cancelling: Arc<AtomicBool>,
}

impl<T> AttentionHandle<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Request cancellation. The response stream drains until the server
    /// acknowledges with a DONE carrying the ATTN flag.
    pub async fn cancel(&self) -> Result<(), Error> {
        self.cancelling.store(true, Ordering::Release);
        tracing::debug!("sending attention");

        let packets = split_message(
            PacketType::Attention,
            Bytes::new(),
            tds_wire::DEFAULT_PACKET_SIZE,
        );
        let mut writer = self.writer.lock().await;
        for packet in packets {
            writer.feed(packet).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Whether a cancellation is pending acknowledgement.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }
}

impl<T> Clone for AttentionHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            cancelling: Arc::clone(&self.cancelling),
        }
    }
}
