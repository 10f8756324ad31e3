use crate::transport::{Channel, ChannelAddr};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Wraps a channel and reports `remote` as its peer.
///
/// The host's pipeline expects socket-shaped peers; in-process channels carry
/// a `LocalAddr` instead. All I/O goes straight to the inner channel.
#[derive(Debug)]
pub struct AddressSpoofingChannel<C> {
    inner: C,
    remote: SocketAddr,
}

impl<C: Channel> AddressSpoofingChannel<C> {
    pub fn new(inner: C, remote: SocketAddr) -> Self {
        Self { inner, remote }
    }

    /// The address the wrapped channel would have reported.
    pub fn real_remote_address(&self) -> ChannelAddr {
        self.inner.remote_address()
    }
}

impl<C: Channel> Channel for AddressSpoofingChannel<C> {
    fn local_address(&self) -> ChannelAddr {
        self.inner.local_address()
    }

    fn remote_address(&self) -> ChannelAddr {
        ChannelAddr::Inet(self.remote)
    }
}

impl<C: Channel> AsyncRead for AddressSpoofingChannel<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<C: Channel> AsyncWrite for AddressSpoofingChannel<C> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
