use super::attachment::{ChannelInitializer, HostNetworkAttachment};
use super::spoofing::AddressSpoofingChannel;
use crate::config::BridgeConfig;
use crate::error::LinkError;
use crate::transport::local::DEFAULT_CHANNEL_BUFFER;
use crate::transport::{Channel, LocalAddr, LocalChannel, LocalListener};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Address the bridge is listening on. Only reachable from inside the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundAddress(LocalAddr);

impl BoundAddress {
    pub fn local_addr(&self) -> LocalAddr {
        self.0
    }
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct BridgeHandle {
    bound: BoundAddress,
    shutdown: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
}

/// Splices in-process connections into a host's network pipeline.
pub struct LoopbackBridge {
    local_addr: LocalAddr,
    channel_buffer: usize,
    placeholder_remote: SocketAddr,
    handle: Option<BridgeHandle>,
}

impl Default for LoopbackBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self {
            local_addr: LocalAddr::ANY,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            placeholder_remote: SocketAddr::from(([0, 0, 0, 0], 0)),
            handle: None,
        }
    }

    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self {
            local_addr: cfg.local_id.map(LocalAddr::from_id).unwrap_or(LocalAddr::ANY),
            channel_buffer: cfg.channel_buffer,
            placeholder_remote: cfg.placeholder_remote,
            handle: None,
        }
    }

    pub fn with_local_addr(mut self, addr: LocalAddr) -> Self {
        self.local_addr = addr;
        self
    }

    pub fn with_channel_buffer(mut self, bytes: usize) -> Self {
        self.channel_buffer = bytes;
        self
    }

    pub fn with_placeholder_remote(mut self, addr: SocketAddr) -> Self {
        self.placeholder_remote = addr;
        self
    }

    /// Bind the in-process endpoint and run its accept loop on the host's
    /// acceptor pool. Resolves once the loop is running.
    pub async fn start(
        &mut self,
        attachment: HostNetworkAttachment,
    ) -> Result<BoundAddress, LinkError> {
        if let Some(handle) = &self.handle {
            return Err(LinkError::AlreadyStarted(handle.bound.to_string()));
        }

        let attachment = attachment.resolve().inspect_err(|e| {
            error!(error = %e, "loopback bridge cannot start");
        })?;

        let listener = LocalListener::bind_with_buffer(self.local_addr, self.channel_buffer)
            .inspect_err(|e| {
                error!(address = %self.local_addr, error = %e, "loopback bind failed");
            })?;
        let bound = BoundAddress(listener.local_addr());

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = attachment.acceptor_pool.spawn(accept_loop(
            listener,
            attachment.initializer,
            attachment.worker_pool,
            self.placeholder_remote,
            ready_tx,
            shutdown_rx,
        ));

        if ready_rx.await.is_err() {
            accept_task.abort();
            error!(address = %bound, "acceptor pool never ran the accept loop");
            return Err(LinkError::BindFailure(io::Error::other(
                "acceptor pool is not running",
            )));
        }

        info!(address = %bound, "loopback bridge listening");
        self.handle = Some(BridgeHandle {
            bound,
            shutdown: shutdown_tx,
            accept_task,
        });
        Ok(bound)
    }

    /// Close the endpoint and wait for the accept loop to finish.
    /// The bridge is stopped afterwards even if closing reported an error.
    pub async fn stop(&mut self) -> Result<(), LinkError> {
        let Some(BridgeHandle {
            bound,
            shutdown,
            accept_task,
        }) = self.handle.take()
        else {
            return Ok(());
        };

        let _ = shutdown.send(());
        match accept_task.await {
            Ok(()) => {
                info!(address = %bound, "loopback bridge closed");
                Ok(())
            }
            Err(e) => {
                warn!(address = %bound, error = %e, "loopback bridge did not close cleanly");
                Err(LinkError::CloseFailure(e.to_string()))
            }
        }
    }

    pub fn bound_address(&self) -> Option<BoundAddress> {
        self.handle.as_ref().map(|h| h.bound)
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Open a client channel to the bridge, as the translation side does.
    pub async fn connect(&self) -> io::Result<LocalChannel> {
        let Some(bound) = self.bound_address() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "loopback bridge is not started",
            ));
        };
        LocalChannel::connect(bound.local_addr()).await
    }
}

async fn accept_loop(
    mut listener: LocalListener,
    initializer: Arc<dyn ChannelInitializer>,
    worker_pool: Handle,
    placeholder_remote: SocketAddr,
    ready: oneshot::Sender<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let _ = ready.send(());
    loop {
        tokio::select! {
            biased;
            // Also fires when the bridge is dropped without `stop`.
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(raw) => {
                    debug!(
                        local = %raw.local_address(),
                        peer = %raw.remote_address(),
                        "accepted loopback channel"
                    );
                    let channel = AddressSpoofingChannel::new(raw, placeholder_remote);
                    let initializer = initializer.clone();
                    worker_pool.spawn(async move {
                        initializer.init_channel(Box::new(channel));
                    });
                }
                Err(e) => {
                    warn!(error = %e, "loopback accept failed; stopping accept loop");
                    break;
                }
            },
        }
    }
    debug!(address = %listener.local_addr(), "loopback accept loop finished");
}
