use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::LazyLock;

/// Process-wide configuration, loaded on first access.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| {
        eprintln!("failed to load configuration, using defaults: {e}");
        Config::default()
    })
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub bridge: BridgeConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub loglevel: String,
    pub database_url: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            database_url: "sqlite:saved_accounts.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Fixed in-process address id; `None` picks the next free one.
    pub local_id: Option<u64>,
    /// Per-direction buffer of each in-process channel, in bytes.
    pub channel_buffer: usize,
    /// Remote address reported to the host for bridged channels.
    pub placeholder_remote: SocketAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            local_id: None,
            channel_buffer: 64 * 1024,
            placeholder_remote: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Java server address, or `auto` to follow the host's listener.
    pub address: String,
    pub port: u16,
    pub bedrock_port: u16,
    pub clone_remote_port: bool,
    #[serde(skip)]
    pub autoconfigured: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: "auto".to_string(),
            port: 25565,
            bedrock_port: 19132,
            clone_remote_port: false,
            autoconfigured: false,
        }
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `GEYSER_*` env vars (`__` separates sections).
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("GEYSER_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_sources() {
        Jail::expect_with(|_jail| {
            let cfg = Config::load()?;
            assert_eq!(cfg.basic.loglevel, "info");
            assert_eq!(cfg.bridge.channel_buffer, 64 * 1024);
            assert_eq!(cfg.bridge.placeholder_remote.port(), 0);
            assert!(cfg.bridge.placeholder_remote.ip().is_unspecified());
            assert_eq!(cfg.remote.address, "auto");
            Ok(())
        });
    }

    #[test]
    fn toml_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [basic]
                database_url = "sqlite:/tmp/accounts.db"

                [bridge]
                local_id = 7

                [remote]
                port = 25570
                "#,
            )?;
            jail.set_env("GEYSER_REMOTE__PORT", "25600");
            jail.set_env("GEYSER_BASIC__LOGLEVEL", "debug");

            let cfg = Config::load()?;
            assert_eq!(cfg.basic.database_url, "sqlite:/tmp/accounts.db");
            assert_eq!(cfg.basic.loglevel, "debug");
            assert_eq!(cfg.bridge.local_id, Some(7));
            assert_eq!(cfg.remote.port, 25600);
            assert_eq!(cfg.remote.bedrock_port, 19132);
            Ok(())
        });
    }
}
