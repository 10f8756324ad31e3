use crate::bridge::{BoundAddress, HostNetworkAttachment, LoopbackBridge};
use crate::config::{Config, RemoteConfig};
use crate::error::LinkError;
use crate::service::CredentialStore;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, error, info, warn};

/// Point the remote section at the host's own listener when set to `auto`.
///
/// A wildcard host address is not connectable, so loopback is used instead.
pub fn autoconfigure_remote(remote: &mut RemoteConfig, host_addr: SocketAddr) {
    if remote.address.eq_ignore_ascii_case("auto") {
        remote.autoconfigured = true;
        let ip = if host_addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host_addr.ip()
        };
        remote.address = ip.to_string();
        remote.port = host_addr.port();
        debug!(address = %remote.address, port = remote.port, "remote autoconfigured");
    }

    if remote.clone_remote_port {
        remote.bedrock_port = host_addr.port();
    }
}

/// Startup and shutdown sequence around the bridge and the credential store.
pub struct Bootstrap {
    bridge: LoopbackBridge,
    store: Option<CredentialStore>,
    remote: RemoteConfig,
    database_url: String,
}

impl Bootstrap {
    pub fn new(config: &Config) -> Self {
        Self {
            bridge: LoopbackBridge::from_config(&config.bridge),
            store: None,
            remote: config.remote.clone(),
            database_url: config.basic.database_url.clone(),
        }
    }

    /// Bring everything up. A store that cannot be opened is logged and left
    /// out; bridge failures are returned and leave no store open.
    ///
    /// Enabling twice fails with `AlreadyStarted` and keeps the running bridge
    /// and store untouched.
    pub async fn enable(
        &mut self,
        host_addr: SocketAddr,
        attachment: HostNetworkAttachment,
    ) -> Result<BoundAddress, LinkError> {
        if let Some(bound) = self.bridge.bound_address() {
            return Err(LinkError::AlreadyStarted(bound.to_string()));
        }
        autoconfigure_remote(&mut self.remote, host_addr);

        if let Some(stale) = self.store.take() {
            stale.close().await;
        }
        match CredentialStore::open(&self.database_url).await {
            Ok(store) => self.store = Some(store),
            Err(e) => {
                warn!(database_url = %self.database_url, error = %e, "saved accounts unavailable");
            }
        }

        let bound = match self.bridge.start(attachment).await {
            Ok(bound) => bound,
            Err(e) => {
                error!(error = %e, "failed to initialize loopback bridge");
                if let Some(store) = self.store.take() {
                    store.close().await;
                }
                return Err(e);
            }
        };
        info!(
            bridge = %bound,
            remote = %format!("{}:{}", self.remote.address, self.remote.port),
            bedrock_port = self.remote.bedrock_port,
            "bootstrap enabled"
        );
        Ok(bound)
    }

    /// Tear down. Never fails; close problems are only logged.
    pub async fn disable(&mut self) {
        if let Err(e) = self.bridge.stop().await {
            warn!(error = %e, "loopback bridge close failed");
        }
        if let Some(store) = self.store.take() {
            store.close().await;
        }
        info!("bootstrap disabled");
    }

    pub fn socket_address(&self) -> Option<BoundAddress> {
        self.bridge.bound_address()
    }

    pub fn bridge(&self) -> &LoopbackBridge {
        &self.bridge
    }

    pub fn store(&self) -> Option<&CredentialStore> {
        self.store.as_ref()
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }
}
