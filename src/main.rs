use geyser_link::bootstrap::Bootstrap;
use geyser_link::bridge::HostNetworkAttachment;
use geyser_link::transport::{Channel, TcpChannel};
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Stand-in for the host's protocol pipeline: echo everything back.
fn echo_initializer(channel: Box<dyn Channel>) {
    let peer = channel.remote_address();
    debug!(%peer, "channel initialized");
    tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(channel);
        match tokio::io::copy(&mut reader, &mut writer).await {
            Ok(bytes) => debug!(%peer, bytes, "channel finished"),
            Err(e) => warn!(%peer, error = %e, "channel failed"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &geyser_link::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
        remote = %cfg.remote.address
    );

    let addr = "0.0.0.0:25577";
    let listener = TcpListener::bind(addr).await?;
    let host_addr = listener.local_addr()?;
    info!("host listener on {}", host_addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => match TcpChannel::new(stream) {
                    Ok(channel) => echo_initializer(Box::new(channel)),
                    Err(e) => warn!(error = %e, "dropping socket without addresses"),
                },
                Err(e) => {
                    warn!(error = %e, "host accept failed");
                    break;
                }
            }
        }
    });

    let mut bootstrap = Bootstrap::new(cfg);
    let bound = bootstrap
        .enable(host_addr, HostNetworkAttachment::from_current(echo_initializer))
        .await?;
    info!("loopback bridge published at {}", bound);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    bootstrap.disable().await;
    Ok(())
}
