//! TLS handshake transport for TDS 7.x.
//!
//! Until login completes, TDS requires TLS handshake records to travel
//! inside PRELOGIN packets. [`TlsPreloginStream`] sits between the TLS
//! implementation and the socket: while the handshake is pending it frames
//! outbound records into PRELOGIN packets and strips the framing from
//! inbound ones; once [`handshake_complete`](TlsPreloginStream::handshake_complete)
//! is called it becomes a transparent pass-through and TLS records flow as
//! ordinary application data.

use std::cmp;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const HEADER_SIZE: usize = 8;
const PACKET_TYPE_PRELOGIN: u8 = 0x12;
const STATUS_END_OF_MESSAGE: u8 = 0x01;

/// Wraps a transport so TLS handshake records travel as PRELOGIN packets.
pub struct TlsPreloginStream<S> {
    stream: S,
    handshaking: bool,

    // Inbound: the PRELOGIN header being collected, then the number of
    // payload bytes still owed to the TLS layer.
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    payload_remaining: usize,

    // Outbound: raw TLS bytes collected until flush, then the framed packet
    // being written.
    pending: Vec<u8>,
    writing: Vec<u8>,
    written: usize,
}

impl<S> TlsPreloginStream<S> {
    /// Wrap a transport in handshake mode.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            handshaking: true,
            header: [0u8; HEADER_SIZE],
            header_filled: 0,
            payload_remaining: 0,
            pending: Vec::new(),
            writing: Vec::new(),
            written: 0,
        }
    }

    /// Switch to pass-through mode once the TLS handshake has finished.
    pub fn handshake_complete(&mut self) {
        self.handshaking = false;
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the transport.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TlsPreloginStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_read(cx, buf);
        }

        // Between packets: collect the 8-byte PRELOGIN header first.
        while this.payload_remaining == 0 {
            while this.header_filled < HEADER_SIZE {
                let mut header_buf = ReadBuf::new(&mut this.header[this.header_filled..]);
                match Pin::new(&mut this.stream).poll_read(cx, &mut header_buf)? {
                    Poll::Ready(()) => {
                        let n = header_buf.filled().len();
                        if n == 0 {
                            return Poll::Ready(Ok(()));
                        }
                        this.header_filled += n;
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            if this.header[0] != PACKET_TYPE_PRELOGIN {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected PRELOGIN packet during TLS handshake, got 0x{:02X}",
                        this.header[0]
                    ),
                )));
            }

            let length = u16::from_be_bytes([this.header[2], this.header[3]]) as usize;
            if length < HEADER_SIZE {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "PRELOGIN packet shorter than its header",
                )));
            }
            this.payload_remaining = length - HEADER_SIZE;
            this.header_filled = 0;

            // Zero-payload packets loop back to the next header.
        }

        // Hand over at most the remainder of the current packet payload.
        let cap = cmp::min(this.payload_remaining, buf.remaining());
        let mut scratch = vec![0u8; cap];
        let mut scratch_buf = ReadBuf::new(&mut scratch);

        match Pin::new(&mut this.stream).poll_read(cx, &mut scratch_buf)? {
            Poll::Ready(()) => {
                let n = scratch_buf.filled().len();
                buf.put_slice(&scratch[..n]);
                this.payload_remaining -= n;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TlsPreloginStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.handshaking {
            return Pin::new(&mut this.stream).poll_write(cx, buf);
        }

        // Handshake records are collected and framed on flush.
        this.pending.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.handshaking {
            if this.writing.is_empty() && !this.pending.is_empty() {
                let total = HEADER_SIZE + this.pending.len();
                let mut packet = Vec::with_capacity(total);
                packet.push(PACKET_TYPE_PRELOGIN);
                packet.push(STATUS_END_OF_MESSAGE);
                packet.extend_from_slice(&(total as u16).to_be_bytes());
                packet.extend_from_slice(&[0, 0]); // spid
                packet.push(1); // packet id
                packet.push(0); // window
                packet.append(&mut this.pending);

                this.writing = packet;
                this.written = 0;

                tracing::trace!(bytes = total, "sending TLS handshake prelogin packet");
            }

            while this.written < this.writing.len() {
                match Pin::new(&mut this.stream).poll_write(cx, &this.writing[this.written..])? {
                    Poll::Ready(n) => this.written += n,
                    Poll::Pending => return Poll::Pending,
                }
            }
            this.writing.clear();
            this.written = 0;
        }

        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// A transport that is either plaintext or TLS over the PRELOGIN wrapper.
pub enum MaybeTls<S> {
    /// Plaintext transport.
    Plain(S),
    /// Negotiated TLS session.
    Tls(Box<tokio_rustls::client::TlsStream<TlsPreloginStream<S>>>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTls<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTls<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
