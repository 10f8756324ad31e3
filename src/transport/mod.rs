//! Byte channels the bridge hands to the host.
//!
//! - `channel.rs`: the `Channel` trait, channel addresses, TCP-backed channels
//! - `local.rs`: in-process listener/channel pairs that never touch a socket

pub mod channel;
pub mod local;

pub use channel::{Channel, ChannelAddr, TcpChannel};
pub use local::{LocalAddr, LocalChannel, LocalListener};
