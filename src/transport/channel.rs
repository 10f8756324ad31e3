use super::local::LocalAddr;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Endpoint identity reported by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelAddr {
    Inet(SocketAddr),
    Local(LocalAddr),
}

impl ChannelAddr {
    pub fn as_inet(&self) -> Option<SocketAddr> {
        match self {
            ChannelAddr::Inet(addr) => Some(*addr),
            ChannelAddr::Local(_) => None,
        }
    }

    pub fn is_inet(&self) -> bool {
        matches!(self, ChannelAddr::Inet(_))
    }
}

impl fmt::Display for ChannelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelAddr::Inet(addr) => write!(f, "{addr}"),
            ChannelAddr::Local(addr) => write!(f, "{addr}"),
        }
    }
}

impl From<SocketAddr> for ChannelAddr {
    fn from(addr: SocketAddr) -> Self {
        ChannelAddr::Inet(addr)
    }
}

impl From<LocalAddr> for ChannelAddr {
    fn from(addr: LocalAddr) -> Self {
        ChannelAddr::Local(addr)
    }
}

/// A bidirectional byte stream that knows both of its endpoints.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    fn local_address(&self) -> ChannelAddr;
    fn remote_address(&self) -> ChannelAddr;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn local_address(&self) -> ChannelAddr {
        (**self).local_address()
    }

    fn remote_address(&self) -> ChannelAddr {
        (**self).remote_address()
    }
}

/// A real socket connection, addresses captured at accept time.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    local: SocketAddr,
    peer: SocketAddr,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            local,
            peer,
        })
    }
}

impl Channel for TcpChannel {
    fn local_address(&self) -> ChannelAddr {
        ChannelAddr::Inet(self.local)
    }

    fn remote_address(&self) -> ChannelAddr {
        ChannelAddr::Inet(self.peer)
    }
}

impl AsyncRead for TcpChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn inet_and_local_addresses_are_distinguished() {
        let inet = ChannelAddr::from(SocketAddr::from(([127, 0, 0, 1], 25565)));
        assert!(inet.is_inet());
        assert_eq!(inet.to_string(), "127.0.0.1:25565");

        let local = ChannelAddr::from(LocalAddr::from_id(3));
        assert!(!local.is_inet());
        assert_eq!(local.as_inet(), None);
        assert_eq!(local.to_string(), "local:3");
    }

    #[tokio::test]
    async fn tcp_channel_reports_socket_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server_addr = listener.local_addr().expect("local addr");

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(server_addr).await.expect("connect");
            stream.write_all(b"ping").await.expect("write");
            stream.local_addr().expect("client addr")
        });

        let (stream, _) = listener.accept().await.expect("accept");
        let mut channel = TcpChannel::new(stream).expect("channel");
        let mut buf = [0u8; 4];
        channel.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"ping");

        let client_addr = client.await.expect("client task");
        assert_eq!(channel.local_address(), ChannelAddr::Inet(server_addr));
        assert_eq!(channel.remote_address(), ChannelAddr::Inet(client_addr));
    }
}
