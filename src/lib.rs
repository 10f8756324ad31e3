pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod transport;

pub use bridge::{AddressSpoofingChannel, BoundAddress, HostNetworkAttachment, LoopbackBridge};
pub use db::SavedCredential;
pub use error::LinkError;
pub use service::CredentialStore;
