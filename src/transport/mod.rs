//! Transport (C2): uniform send/recv/close over plain TCP or TLS, plus
//! the address resolver (C3).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod resolver;
pub mod tls;

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpStream, UnixStream},
};
use tokio_rustls::client::TlsStream;

/// The socket's delivery mode (spec §4.2, §9 "active once").
///
/// `Passive` is used only during the synchronous handshake, where the
/// driver calls `recv` and blocks on the result. `OneShot` is the
/// steady-state mode: the driver issues exactly one read, processes the
/// chunk synchronously, then issues the next one — never two reads
/// in flight. This enum exists for tracing/logging clarity; the actual
/// backpressure comes from the driver loop's structure (see
/// `client::command` and `pubsub`), not from a distinct socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    Passive,
    OneShot,
}

/// A connected transport, either plain TCP or TLS over TCP. One `enum`
/// rather than a trait object: the driver only ever holds exactly one
/// concrete kind per connection and never needs dynamic dispatch across
/// unrelated transport families.
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Unix(UnixStream),
}

impl Transport {
    pub async fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        match self {
            Transport::Plain(s) => s.write_all(buf).await,
            Transport::Tls(s) => s.write_all(buf).await,
            Transport::Unix(s) => s.write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        match self {
            Transport::Plain(s) => s.flush().await,
            Transport::Tls(s) => s.flush().await,
            Transport::Unix(s) => s.flush().await,
        }
    }

    /// Synchronous, timeout-bound recv used only during the handshake
    /// (`ActiveMode::Passive`). Returns the bytes read; zero bytes
    /// means the peer closed the connection.
    pub async fn recv(
        &mut self,
        buf: &mut [u8],
        timeout: std::time::Duration,
    ) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        let fut = async {
            match self {
                Transport::Plain(s) => s.read(buf).await,
                Transport::Tls(s) => s.read(buf).await,
                Transport::Unix(s) => s.read(buf).await,
            }
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "recv timed out")),
        }
    }

    pub async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = match self {
            Transport::Plain(s) => s.shutdown().await,
            Transport::Tls(s) => s.shutdown().await,
            Transport::Unix(s) => s.shutdown().await,
        };
    }

    /// No-op for `Unix`, which has no notion of Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        match self {
            Transport::Plain(s) => s.set_nodelay(nodelay),
            Transport::Tls(s) => s.get_ref().0.set_nodelay(nodelay),
            Transport::Unix(_) => Ok(()),
        }
    }
}

/// `AsyncRead`/`AsyncWrite` are implemented directly so the command and
/// pubsub drivers can drive `read_buf` in a plain `select!` loop in
/// `ActiveMode::OneShot`, the same way the teacher's `read_loop` drives
/// its socket halves directly instead of through a boxed trait object.
impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
