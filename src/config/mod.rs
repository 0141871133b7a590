//! Configuration system.
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./meshrelay.yaml` (current directory - highest priority)
//! 2. `~/.config/meshrelay/meshrelay.yaml` (user config directory)
//! 3. `/etc/meshrelay/meshrelay.yaml` (system - lowest priority)
//!
//! Sections (`node`, `mesh`, `peers`) from higher priority files replace
//! those from lower priority files wholesale.
//!
//! ```yaml
//! node:
//!   addr: 3
//!   server_port: 41999
//! mesh:
//!   ttl: 8
//! peers:
//!   - addr: 2
//!   - addr: 4
//!     port: 42104
//! ```

use crate::transport::Endpoint;
use crate::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config filename.
const CONFIG_FILENAME: &str = "meshrelay.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Node identity and endpoints (`node.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's mesh address.
    pub addr: u8,
    /// Interface to listen on.
    pub listen_host: String,
    /// Listen port; 0 means `mesh.base_port + addr`.
    pub listen_port: u16,
    /// Coordinating server host.
    pub server_host: String,
    /// Coordinating server port.
    pub server_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            addr: 0,
            listen_host: "127.0.0.1".to_string(),
            listen_port: 0,
            server_host: "127.0.0.1".to_string(),
            server_port: 41_999,
        }
    }
}

/// Protocol tunables (`mesh.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Hop budget for floods.
    pub ttl: i8,
    /// Largest frame accepted off the wire.
    pub max_frame_len: usize,
    /// Dedup cache capacity.
    pub dedup_capacity: usize,
    /// Base port; node N listens on `base_port + N` unless overridden.
    pub base_port: u16,
    /// Outbound connect timeout.
    pub connect_timeout_ms: u64,
    /// Outbound send timeout.
    pub send_timeout_ms: u64,
    /// Liveness heartbeat interval.
    pub update_interval_secs: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ttl: 8,
            max_frame_len: 4096,
            dedup_capacity: 100,
            base_port: 42_100,
            connect_timeout_ms: 500,
            send_timeout_ms: 500,
            update_interval_secs: 5,
        }
    }
}

/// One direct neighbor (`peers[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Neighbor mesh address.
    pub addr: u8,
    /// Neighbor host; defaults to the loopback convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Neighbor port; defaults to `mesh.base_port + addr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Partial file contents; present sections replace earlier ones.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    node: Option<NodeConfig>,
    mesh: Option<MeshConfig>,
    peers: Option<Vec<PeerConfig>>,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    /// Node identity and endpoints.
    pub node: NodeConfig,
    /// Protocol tunables.
    pub mesh: MeshConfig,
    /// Direct neighbors.
    pub peers: Vec<PeerConfig>,
}

impl Config {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Files are loaded in reverse priority order and merged; returns the
    /// config and the paths that were actually loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        Self::load_from_paths(&Self::search_paths())
    }

    /// Load configuration from specific paths, later paths overriding
    /// earlier ones section-wise.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let raw = Self::load_raw(path)?;
                config.merge(raw);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.merge(Self::load_raw(path)?);
        Ok(config)
    }

    /// Standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("/etc/meshrelay").join(CONFIG_FILENAME));

        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config/meshrelay")
                    .join(CONFIG_FILENAME),
            );
        }

        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));
        paths
    }

    /// This node's mesh address.
    pub fn addr(&self) -> Address {
        Address::new(self.node.addr)
    }

    /// Port this node listens on.
    pub fn listen_port(&self) -> u16 {
        if self.node.listen_port != 0 {
            self.node.listen_port
        } else {
            self.port_for(self.node.addr)
        }
    }

    /// Port convention for a mesh address.
    pub fn port_for(&self, addr: u8) -> u16 {
        self.mesh.base_port.wrapping_add(addr as u16)
    }

    /// Resolved endpoint for a configured peer.
    pub fn peer_endpoint(&self, peer: &PeerConfig) -> Endpoint {
        Endpoint {
            host: peer
                .host
                .clone()
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: peer.port.unwrap_or_else(|| self.port_for(peer.addr)),
        }
    }

    /// Outbound connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mesh.connect_timeout_ms)
    }

    /// Outbound send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.mesh.send_timeout_ms)
    }

    /// Liveness heartbeat interval.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.mesh.update_interval_secs)
    }

    fn load_raw(path: &Path) -> Result<RawConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn merge(&mut self, raw: RawConfig) {
        if let Some(node) = raw.node {
            self.node = node;
        }
        if let Some(mesh) = raw.mesh {
            self.mesh = mesh;
        }
        if let Some(peers) = raw.peers {
            self.peers = peers;
        }
    }
}
