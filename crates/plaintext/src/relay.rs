//! Post-handshake passthrough.
//!
//! Plaintext has nothing to decrypt, so once the identity exchange is done the
//! connection is handed on as-is. The only state kept is whatever arrived
//! behind the identity frame, which is replayed ahead of the socket.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use bytes::{Buf, Bytes};
use futures_util::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct PlaintextStream<S> {
    socket: S,
    leftover: Bytes,
}

impl<S> PlaintextStream<S> {
    #[must_use]
    pub const fn new(socket: S, leftover: Bytes) -> Self {
        Self { socket, leftover }
    }

    /// Bytes received during the handshake that have not been read yet.
    #[must_use]
    pub fn pending_leftover(&self) -> &[u8] {
        &self.leftover
    }

    #[must_use]
    pub const fn get_ref(&self) -> &S {
        &self.socket
    }

    /// Returns the socket, or `Err(self)` while handshake bytes are still
    /// waiting to be read.
    pub fn into_inner(self) -> Result<S, Self> {
        if self.leftover.is_empty() {
            Ok(self.socket)
        } else {
            Err(self)
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PlaintextStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if !this.leftover.is_empty() && !buf.is_empty() {
            let len = this.leftover.len().min(buf.len());
            this.leftover.copy_to_slice(&mut buf[..len]);

            trace!(len, remaining = this.leftover.len(), "Forwarding leftover handshake data");

            return Poll::Ready(Ok(len));
        }

        let polled = Pin::new(&mut this.socket).poll_read(cx, buf);

        if let Poll::Ready(Err(err)) = &polled {
            debug!(%err, "Inbound transport error");
        }

        polled
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PlaintextStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let polled = Pin::new(&mut self.get_mut().socket).poll_write(cx, buf);

        if let Poll::Ready(Err(err)) = &polled {
            debug!(%err, "Outbound transport error");
        }

        polled
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_close(cx)
    }
}
