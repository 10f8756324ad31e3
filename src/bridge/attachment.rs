use crate::error::LinkError;
use crate::transport::Channel;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Host-side hook that wires a freshly accepted channel into the host's
/// protocol pipeline. Invoked on the worker pool.
pub trait ChannelInitializer: Send + Sync {
    fn init_channel(&self, channel: Box<dyn Channel>);
}

impl<F> ChannelInitializer for F
where
    F: Fn(Box<dyn Channel>) + Send + Sync,
{
    fn init_channel(&self, channel: Box<dyn Channel>) {
        self(channel)
    }
}

/// Pieces of the host's network stack lent to the bridge at start.
#[derive(Clone, Default)]
pub struct HostNetworkAttachment {
    initializer: Option<Arc<dyn ChannelInitializer>>,
    acceptor_pool: Option<Handle>,
    worker_pool: Option<Handle>,
}

impl HostNetworkAttachment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attachment using the calling runtime for both pools.
    /// Pools stay unset when called outside a tokio runtime.
    pub fn from_current(initializer: impl ChannelInitializer + 'static) -> Self {
        let current = Handle::try_current().ok();
        Self {
            initializer: Some(Arc::new(initializer)),
            acceptor_pool: current.clone(),
            worker_pool: current,
        }
    }

    pub fn with_initializer(mut self, initializer: impl ChannelInitializer + 'static) -> Self {
        self.initializer = Some(Arc::new(initializer));
        self
    }

    pub fn with_acceptor_pool(mut self, pool: Handle) -> Self {
        self.acceptor_pool = Some(pool);
        self
    }

    pub fn with_worker_pool(mut self, pool: Handle) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    pub(crate) fn resolve(self) -> Result<ResolvedAttachment, LinkError> {
        let initializer = self
            .initializer
            .ok_or(LinkError::AttachmentUnavailable("protocol initializer"))?;
        let acceptor_pool = self
            .acceptor_pool
            .ok_or(LinkError::AttachmentUnavailable("acceptor pool"))?;
        let worker_pool = self
            .worker_pool
            .ok_or(LinkError::AttachmentUnavailable("worker pool"))?;
        Ok(ResolvedAttachment {
            initializer,
            acceptor_pool,
            worker_pool,
        })
    }
}

impl fmt::Debug for HostNetworkAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostNetworkAttachment")
            .field("initializer", &self.initializer.is_some())
            .field("acceptor_pool", &self.acceptor_pool.is_some())
            .field("worker_pool", &self.worker_pool.is_some())
            .finish()
    }
}

pub(crate) struct ResolvedAttachment {
    pub(crate) initializer: Arc<dyn ChannelInitializer>,
    pub(crate) acceptor_pool: Handle,
    pub(crate) worker_pool: Handle,
}
