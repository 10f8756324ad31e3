use super::channel::{Channel, ChannelAddr};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Pending connections a listener may hold before `connect` waits.
const ACCEPT_BACKLOG: usize = 128;

pub const DEFAULT_CHANNEL_BUFFER: usize = 64 * 1024;

static NEXT_BOUND_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

static REGISTRY: LazyLock<Mutex<HashMap<u64, Endpoint>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Clone)]
struct Endpoint {
    incoming: mpsc::Sender<LocalChannel>,
    buffer: usize,
}

/// Process-local endpoint id.
///
/// Listener ids and client ids live in separate spaces, so a connecting
/// client never shares an identity with any listener. Id 0 of the listener
/// space means "any free id" when binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalAddr {
    id: u64,
    client: bool,
}

impl LocalAddr {
    pub const ANY: LocalAddr = LocalAddr {
        id: 0,
        client: false,
    };

    pub fn from_id(id: u64) -> Self {
        Self { id, client: false }
    }

    pub fn is_any(&self) -> bool {
        !self.client && self.id == 0
    }

    /// True for the address of the connecting side of a channel.
    pub fn is_client(&self) -> bool {
        self.client
    }

    fn next_bound() -> Self {
        Self::from_id(NEXT_BOUND_ID.fetch_add(1, Ordering::Relaxed))
    }

    fn next_client() -> Self {
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            client: true,
        }
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("local:any")
        } else if self.client {
            write!(f, "local:client-{}", self.id)
        } else {
            write!(f, "local:{}", self.id)
        }
    }
}

/// In-process listening endpoint registered under a `LocalAddr`.
///
/// Unregistered on drop; pending connections that were never accepted are
/// dropped with it and their peers observe EOF.
pub struct LocalListener {
    addr: LocalAddr,
    incoming: mpsc::Receiver<LocalChannel>,
}

impl LocalListener {
    pub fn bind(addr: LocalAddr) -> io::Result<Self> {
        Self::bind_with_buffer(addr, DEFAULT_CHANNEL_BUFFER)
    }

    pub fn bind_with_buffer(addr: LocalAddr, buffer: usize) -> io::Result<Self> {
        if buffer == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "local channel buffer must be non-zero",
            ));
        }

        if addr.is_client() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{addr} is a client address"),
            ));
        }

        let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        let addr = if addr.is_any() {
            let mut candidate = LocalAddr::next_bound();
            while registry.contains_key(&candidate.id) {
                candidate = LocalAddr::next_bound();
            }
            candidate
        } else if registry.contains_key(&addr.id) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{addr} is already bound"),
            ));
        } else {
            addr
        };

        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        registry.insert(
            addr.id,
            Endpoint {
                incoming: tx,
                buffer,
            },
        );
        Ok(Self { addr, incoming: rx })
    }

    pub fn local_addr(&self) -> LocalAddr {
        self.addr
    }

    pub async fn accept(&mut self) -> io::Result<LocalChannel> {
        self.incoming.recv().await.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::ConnectionAborted,
                format!("{} is no longer registered", self.addr),
            )
        })
    }
}

impl Drop for LocalListener {
    fn drop(&mut self) {
        let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        registry.remove(&self.addr.id);
    }
}

impl fmt::Debug for LocalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalListener")
            .field("addr", &self.addr)
            .finish()
    }
}

/// One side of an in-process connection.
#[derive(Debug)]
pub struct LocalChannel {
    stream: DuplexStream,
    local: LocalAddr,
    remote: LocalAddr,
}

impl LocalChannel {
    /// Connect to a bound `LocalListener`.
    pub async fn connect(addr: LocalAddr) -> io::Result<Self> {
        let endpoint = if addr.is_client() {
            None
        } else {
            let registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
            registry.get(&addr.id).cloned()
        };
        let Some(endpoint) = endpoint else {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("nothing bound at {addr}"),
            ));
        };

        let client_addr = LocalAddr::next_client();
        let (client_side, server_side) = tokio::io::duplex(endpoint.buffer);
        let server = LocalChannel {
            stream: server_side,
            local: addr,
            remote: client_addr,
        };
        endpoint.incoming.send(server).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{addr} closed while connecting"),
            )
        })?;

        Ok(LocalChannel {
            stream: client_side,
            local: client_addr,
            remote: addr,
        })
    }

    pub fn local_addr(&self) -> LocalAddr {
        self.local
    }

    pub fn peer_addr(&self) -> LocalAddr {
        self.remote
    }
}

impl Channel for LocalChannel {
    fn local_address(&self) -> ChannelAddr {
        ChannelAddr::Local(self.local)
    }

    fn remote_address(&self) -> ChannelAddr {
        ChannelAddr::Local(self.remote)
    }
}

impl AsyncRead for LocalChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for LocalChannel {
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

    #[tokio::test]
    async fn connect_and_exchange_bytes() {
        let mut listener = LocalListener::bind(LocalAddr::ANY).expect("bind");
        let addr = listener.local_addr();
        assert!(!addr.is_any());

        let mut client = LocalChannel::connect(addr).await.expect("connect");
        let mut server = listener.accept().await.expect("accept");

        assert_eq!(client.peer_addr(), addr);
        assert_eq!(server.local_addr(), addr);
        assert_eq!(server.peer_addr(), client.local_addr());

        client.write_all(b"hello").await.expect("write");
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"hello");

        server.write_all(b"back").await.expect("write");
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"back");
    }

    #[tokio::test]
    async fn explicit_address_cannot_be_bound_twice() {
        let first = LocalListener::bind(LocalAddr::ANY).expect("bind");
        let err = LocalListener::bind(first.local_addr()).expect_err("second bind");
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn dropping_listener_unregisters_address() {
        let listener = LocalListener::bind(LocalAddr::ANY).expect("bind");
        let addr = listener.local_addr();
        drop(listener);

        let err = LocalChannel::connect(addr).await.expect_err("connect");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);

        let rebound = LocalListener::bind(addr).expect("rebind freed address");
        assert_eq!(rebound.local_addr(), addr);
    }

    #[tokio::test]
    async fn client_address_never_equals_explicit_listener_address() {
        // Claim the id the next client would get if both shared one counter.
        let next = NEXT_CLIENT_ID.load(Ordering::Relaxed);
        let mut listener = LocalListener::bind(LocalAddr::from_id(next))
            .or_else(|_| LocalListener::bind(LocalAddr::from_id(u64::MAX - 7)))
            .expect("bind explicit id");
        let addr = listener.local_addr();

        for _ in 0..4 {
            let client = LocalChannel::connect(addr).await.expect("connect");
            let server = listener.accept().await.expect("accept");

            assert!(client.local_addr().is_client());
            assert_ne!(client.local_addr(), listener.local_addr());
            assert_ne!(server.peer_addr(), server.local_addr());
            assert_eq!(server.peer_addr(), client.local_addr());
        }
    }

    #[tokio::test]
    async fn client_addresses_cannot_be_bound_or_dialed() {
        let mut listener = LocalListener::bind(LocalAddr::ANY).expect("bind");
        let client = LocalChannel::connect(listener.local_addr())
            .await
            .expect("connect");
        let _server = listener.accept().await.expect("accept");

        let err = LocalListener::bind(client.local_addr()).expect_err("bind client addr");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = LocalChannel::connect(client.local_addr())
            .await
            .expect_err("dial client addr");
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(client.local_addr().to_string().starts_with("local:client-"));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = LocalListener::bind_with_buffer(LocalAddr::ANY, 0).expect_err("bind");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
