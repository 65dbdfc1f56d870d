// Config - Harness configuration: defaults, TOML files, environment overrides

use crate::client::ConnectionSettings;
use crate::node::{OrchestratorSettings, PortTable};
use crate::wait::EventWaitSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_NODE_BIN: &str = "FIRE_NODE_BIN";
pub const ENV_CHAIN: &str = "FIRE_CHAIN";
pub const ENV_TMP_DIR: &str = "FIRE_TMP_DIR";
pub const ENV_PORT_OFFSET: &str = "FIRE_PORT_OFFSET";
pub const ENV_PRINT_LOGS: &str = "FIRE_PRINT_LOGS";

const NODE_BINARY: &str = "firechain-node";

/// Complete harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub node: NodeConfig,
    pub rpc: RpcConfig,
    pub wait: WaitConfig,
    pub log_level: String,
}

/// Node processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub binary: PathBuf,
    pub chain: String,
    pub tmp_dir: PathBuf,
    pub ports: PortTable,
    pub print_logs: bool,
    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub port_release_delay_ms: u64,
}

/// RPC connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Explicit endpoint; defaults to the first started node
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry_interval_ms: u64,
    pub ss58_prefix: u16,
}

/// Event and block waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub poll_interval_ms: u64,
    pub catch_up_blocks: u32,
    pub default_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            rpc: RpcConfig::default(),
            wait: WaitConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let root = repository_root();
        Self {
            binary: root.join("target").join("release").join(NODE_BINARY),
            chain: "qa-dev".to_string(),
            tmp_dir: root.join("tmp").join("fire"),
            ports: PortTable::default(),
            print_logs: false,
            startup_timeout_secs: 60,
            shutdown_timeout_secs: 10,
            port_release_delay_ms: 0,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: 60,
            connect_timeout_secs: 60,
            retry_interval_ms: 500,
            ss58_prefix: crate::chain::primitives::DEFAULT_SS58_PREFIX,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            catch_up_blocks: 16,
            default_timeout_secs: 60,
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        debug!(path = %path.display(), "Loaded harness config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Defaults, then the optional file, then `FIRE_*` variables
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FIRE_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup(ENV_NODE_BIN) {
            self.node.binary = PathBuf::from(binary);
        }
        if let Some(chain) = lookup(ENV_CHAIN) {
            self.node.chain = chain;
        }
        if let Some(dir) = lookup(ENV_TMP_DIR) {
            self.node.tmp_dir = PathBuf::from(dir);
        }
        if let Some(offset) = lookup(ENV_PORT_OFFSET) {
            self.node.ports.offset = offset.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT_OFFSET,
                value: offset.clone(),
            })?;
        }
        if let Some(flag) = lookup(ENV_PRINT_LOGS) {
            self.node.print_logs = parse_flag(&flag).ok_or(ConfigError::InvalidEnv {
                key: ENV_PRINT_LOGS,
                value: flag.clone(),
            })?;
        }
        Ok(self)
    }

    // =========================================================================
    // BUILDERS
    // =========================================================================

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.node.binary = binary.into();
        self
    }

    pub fn with_chain(mut self, chain: &str) -> Self {
        self.node.chain = chain.to_string();
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.node.tmp_dir = dir.into();
        self
    }

    pub fn with_port_offset(mut self, offset: u16) -> Self {
        self.node.ports.offset = offset;
        self
    }

    pub fn with_print_logs(mut self, print_logs: bool) -> Self {
        self.node.print_logs = print_logs;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.rpc.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.wait.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.chain.trim().is_empty() {
            return Err(ConfigError::Invalid("node.chain is empty".to_string()));
        }
        self.node.ports.validate().map_err(ConfigError::Invalid)?;
        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("wait.poll_interval_ms must be positive".to_string()));
        }
        if self.rpc.request_timeout_secs == 0 || self.rpc.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc timeouts must be positive".to_string()));
        }
        if let Some(endpoint) = &self.rpc.endpoint {
            if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
                return Err(ConfigError::Invalid(format!("rpc.endpoint must be a ws:// url: {}", endpoint)));
            }
        }
        Ok(())
    }

    // =========================================================================
    // DERIVED SETTINGS
    // =========================================================================

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            binary: self.node.binary.clone(),
            chain: self.node.chain.clone(),
            tmp_dir: self.node.tmp_dir.clone(),
            ports: self.node.ports,
            print_logs: self.node.print_logs,
            startup_timeout: Duration::from_secs(self.node.startup_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.node.shutdown_timeout_secs),
            port_release_delay: Duration::from_millis(self.node.port_release_delay_ms),
            ..OrchestratorSettings::default()
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            request_timeout: Duration::from_secs(self.rpc.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.rpc.connect_timeout_secs),
            retry_interval: Duration::from_millis(self.rpc.retry_interval_ms),
            ss58_prefix: self.rpc.ss58_prefix,
        }
    }

    pub fn event_wait_settings(&self) -> EventWaitSettings {
        EventWaitSettings {
            poll_interval: Duration::from_millis(self.wait.poll_interval_ms),
            catch_up_blocks: self.wait.catch_up_blocks,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.wait.default_timeout_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Nearest ancestor of the working directory holding `.git`, else the working directory
pub fn repository_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_repository_root(&cwd).unwrap_or(cwd)
}

fn find_repository_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write config {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid {key} value: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
