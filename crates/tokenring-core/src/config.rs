//! Configuration system for the token ring.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TOKENRING_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tokenring/config.toml
//!   3. ~/.config/tokenring/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::DEFAULT_RECV_BUFFER;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub ring: TopologyConfig,
    pub node: NodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Address every node binds to.
    pub host: String,
    /// Port of the first node. Node i binds initial_port + i.
    pub initial_port: u16,
    /// Number of ring members.
    pub node_count: u16,
    /// Milliseconds to wait after starting the nodes before the token is injected.
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Bytes requested per read from the receive endpoint.
    pub recv_buffer: usize,
    /// Status report period of the daemon, in milliseconds.
    pub report_interval_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            initial_port: 5000,
            node_count: 3,
            settle_ms: 100,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            recv_buffer: DEFAULT_RECV_BUFFER,
            report_interval_ms: 1000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("tokenring")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("a ring needs at least one node")]
    EmptyRing,
    #[error("{count} nodes starting at port {initial_port} overflow the port range")]
    PortRangeOverflow { initial_port: u16, count: u16 },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RingConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RingConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TOKENRING_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RingConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject topologies that cannot be wired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let TopologyConfig {
            initial_port,
            node_count,
            ..
        } = self.ring;
        if node_count == 0 {
            return Err(ConfigError::EmptyRing);
        }
        if initial_port.checked_add(node_count - 1).is_none() {
            return Err(ConfigError::PortRangeOverflow {
                initial_port,
                count: node_count,
            });
        }
        Ok(())
    }

    /// Apply TOKENRING_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TOKENRING_RING__HOST") {
            self.ring.host = v;
        }
        if let Ok(v) = std::env::var("TOKENRING_RING__INITIAL_PORT") {
            if let Ok(p) = v.parse() {
                self.ring.initial_port = p;
            }
        }
        if let Ok(v) = std::env::var("TOKENRING_RING__NODE_COUNT") {
            if let Ok(n) = v.parse() {
                self.ring.node_count = n;
            }
        }
        if let Ok(v) = std::env::var("TOKENRING_RING__SETTLE_MS") {
            if let Ok(ms) = v.parse() {
                self.ring.settle_ms = ms;
            }
        }
    }
}
