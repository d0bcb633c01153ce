//! Configuration system for Census.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CENSUS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/census/config.toml
//!   3. ~/.config/census/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{Protocol, DEFAULT_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CensusConfig {
    pub identity: IdentityConfig,
    pub swarm: SwarmConfig,
    pub network: NetworkConfig,
    pub socket: SocketConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fixed node id. Empty = generate a random one at startup.
    /// Binary mode hashes it; text mode uses it verbatim (32 alphanumerics).
    pub node_id: String,
    /// Binary mode only: derive the node id from the hostname when
    /// node_id is empty.
    pub use_hostname: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Group name. Nodes only see peers with the same group.
    pub group: String,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the beacon listener binds to.
    pub listen_addr: IpAddr,
    /// UDP port for beacons, both listening and sending.
    pub port: u16,
    /// Single destination, "ip" or "ip:port". Empty = broadcast on every
    /// broadcast-capable interface.
    pub target: String,
    /// Local HTTP status port. 0 = disabled.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Receive attempts before the listener gives up.
    pub max_attempts: u32,
    /// Delay between a failed receive and the rebind.
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of each queue between pipeline stages.
    pub queue_capacity: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            group: "census".to_string(),
            protocol: Protocol::Binary,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            target: String::new(),
            api_port: DEFAULT_PORT + 1,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ms: 500,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: 10 }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl NetworkConfig {
    pub fn listen_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    /// Parse `target`. None = broadcast on all interfaces.
    /// A bare IP uses the beacon port.
    pub fn target_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        let target = self.target.trim();
        if target.is_empty() {
            return Ok(None);
        }
        if let Ok(addr) = target.parse::<SocketAddr>() {
            return Ok(Some(addr));
        }
        target
            .parse::<IpAddr>()
            .map(|ip| Some(SocketAddr::new(ip, self.port)))
            .map_err(|_| ConfigError::Invalid(format!("network.target {target:?} is not ip or ip:port")))
    }
}

impl SocketConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("census")
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
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CensusConfig {
    /// Load config: env vars → file → defaults. An unparseable env
    /// override is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CensusConfig::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CENSUS_CONFIG")
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
            let text = toml::to_string_pretty(&CensusConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject configurations that cannot run. Called before any socket
    /// is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.swarm.protocol == Protocol::Binary && self.swarm.group.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "swarm.group must not be empty in binary mode".into(),
            ));
        }
        if self.network.port == 0 {
            return Err(ConfigError::Invalid("network.port must be non-zero".into()));
        }
        if self.socket.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "socket.max_attempts must be at least 1".into(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.queue_capacity must be at least 1".into(),
            ));
        }
        self.network.target_addr()?;
        Ok(())
    }

    /// Apply CENSUS_* env var overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. A value that does not parse is an
    /// error, never silently replaced by the file or default value.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("CENSUS_IDENTITY__NODE_ID") {
            self.identity.node_id = v;
        }
        if let Some(v) = lookup("CENSUS_SWARM__GROUP") {
            self.swarm.group = v;
        }
        if let Some(v) = lookup("CENSUS_SWARM__PROTOCOL") {
            self.swarm.protocol = parse_override("CENSUS_SWARM__PROTOCOL", &v)?;
        }
        if let Some(v) = lookup("CENSUS_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = parse_override("CENSUS_NETWORK__LISTEN_ADDR", &v)?;
        }
        if let Some(v) = lookup("CENSUS_NETWORK__PORT") {
            self.network.port = parse_override("CENSUS_NETWORK__PORT", &v)?;
        }
        if let Some(v) = lookup("CENSUS_NETWORK__TARGET") {
            self.network.target = v;
        }
        if let Some(v) = lookup("CENSUS_NETWORK__API_PORT") {
            self.network.api_port = parse_override("CENSUS_NETWORK__API_PORT", &v)?;
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{key}={value:?}: {e}")))
}
