use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = ".mission-control/config.toml";
pub const CONFIG_ENV: &str = "MISSION_CONTROL_CONFIG";
pub const MEMORY_DIR_NAME: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    pub workspace_dir: PathBuf,
    pub log_level: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// JSON config owned by the external agent tool; read-only from here.
    pub external_config: PathBuf,
    #[serde(default)]
    pub seed_demo_data: bool,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Program (optionally with leading arguments) used for every relay call.
    pub program: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_spawn_timeout_ms")]
    pub spawn_timeout_ms: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            program: "openclaw".to_string(),
            timeout_ms: default_timeout_ms(),
            spawn_timeout_ms: default_spawn_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            agent_id: default_agent_id(),
        }
    }
}

impl RelayConfig {
    /// Splits `program` into the executable and any leading arguments.
    pub fn command_prefix(&self) -> Result<(String, Vec<String>), ConfigError> {
        let mut parts = shlex::split(&self.program).ok_or_else(|| {
            ConfigError::ValidationFailed(format!("relay.program is not parseable: {}", self.program))
        })?;
        if parts.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "relay.program cannot be empty".to_string(),
            ));
        }
        let program = parts.remove(0);
        Ok((program, parts))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_dashboard_secs")]
    pub dashboard_secs: u64,
    #[serde(default = "default_fleet_secs")]
    pub fleet_secs: u64,
    #[serde(default = "default_approvals_secs")]
    pub approvals_secs: u64,
    #[serde(default = "default_poll_secs")]
    pub default_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            dashboard_secs: default_dashboard_secs(),
            fleet_secs: default_fleet_secs(),
            approvals_secs: default_approvals_secs(),
            default_secs: default_poll_secs(),
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        let openclaw_home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".openclaw");

        Self {
            workspace_dir: openclaw_home.join("workspace"),
            log_level: "info".to_string(),
            bind_addr: default_bind_addr(),
            external_config: openclaw_home.join("openclaw.json"),
            seed_demo_data: false,
            relay: RelayConfig::default(),
            console: ConsoleConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_spawn_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_agent_id() -> String {
    "main".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_dashboard_secs() -> u64 {
    10
}

fn default_fleet_secs() -> u64 {
    15
}

fn default_approvals_secs() -> u64 {
    10
}

fn default_poll_secs() -> u64 {
    30
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize default config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("config has invalid value: {0}")]
    ValidationFailed(String),
}

impl MissionConfig {
    pub fn resolve_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.workspace_dir.join(MEMORY_DIR_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, raw).map_err(|source| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn load_or_create() -> Result<(Self, PathBuf, bool), ConfigError> {
        let path = Self::resolve_path();
        if path.exists() {
            let cfg = Self::load(&path)?;
            return Ok((cfg, path, false));
        }

        let cfg = Self::default();
        cfg.save(&path)?;
        Ok((cfg, path, true))
    }

    pub fn validate_and_prepare(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "log_level cannot be empty".to_string(),
            ));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bind_addr cannot be empty".to_string(),
            ));
        }
        self.relay.command_prefix()?;
        if self.relay.timeout_ms == 0 || self.relay.spawn_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "relay timeouts must be greater than zero".to_string(),
            ));
        }
        if self.console.history_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "console.history_limit must be greater than zero".to_string(),
            ));
        }
        let memory_dir = self.memory_dir();
        fs::create_dir_all(&memory_dir).map_err(|source| ConfigError::WriteFailed {
            path: memory_dir,
            source,
        })?;
        Ok(())
    }
}
