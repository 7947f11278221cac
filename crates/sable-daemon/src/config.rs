//! Daemon configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sable_types::Network;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Network settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Key material.
    #[serde(default)]
    pub keys: KeysConfig,
    /// Rate-limiter tuning.
    #[serde(default)]
    pub limits: RateLimitConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Which network this node participates in.
    #[serde(default = "default_network")]
    pub network: Network,
    /// Ingress listen address.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Static peer table standing in for the swarm oracle.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

/// One peer table entry, all keys in hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub legacy: String,
    pub ed25519: String,
    pub x25519: String,
    /// `host:port` of the peer's transfer ingress.
    pub address: String,
}

/// Key material configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    /// This node's X25519 secret key, hex. Required.
    #[serde(default)]
    pub x25519_seckey: String,
}

/// Rate-limiter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Tokens refilled per second.
    #[serde(default = "default_token_rate")]
    pub token_rate: f32,
    /// Bucket capacity.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: f32,
    /// Bound on distinct client buckets.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_network() -> Network {
    Network::Testnet
}

fn default_listen() -> String {
    "0.0.0.0:22021".to_string()
}

fn default_token_rate() -> f32 {
    sable_ratelimit::TOKEN_RATE
}

fn default_bucket_size() -> f32 {
    sable_ratelimit::BUCKET_SIZE
}

fn default_max_clients() -> usize {
    sable_ratelimit::MAX_CLIENTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            listen: default_listen(),
            peers: Vec::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            token_rate: default_token_rate(),
            bucket_size: default_bucket_size(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}
