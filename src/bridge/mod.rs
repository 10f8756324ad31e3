//! Loopback bridge into a host's network pipeline.
//!
//! Layout:
//! - `attachment.rs`: what the host lends the bridge (initializer, pools)
//! - `spoofing.rs`: channel decorator that reports a socket-shaped peer
//! - `loopback.rs`: the bridge itself, start/stop lifecycle

pub mod attachment;
pub mod loopback;
pub mod spoofing;

pub use attachment::{ChannelInitializer, HostNetworkAttachment};
pub use loopback::{BoundAddress, LoopbackBridge};
pub use spoofing::AddressSpoofingChannel;
