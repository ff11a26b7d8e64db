//! Relay configuration
//!
//! TOML file with serde defaults; CLI flags override loaded values in
//! `main`. The config path itself resolves flag > `AGENT_RELAY_CONFIG`
//! env var > built-in defaults, so the binary runs with no config file
//! at all.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the config file, consulted when no explicit
/// path is given.
pub const CONFIG_ENV_VAR: &str = "AGENT_RELAY_CONFIG";

/// User-configurable settings for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host address for the HTTP server (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server (default: 8710)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means permissive
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// SSE keep-alive interval in seconds (default: 15)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Upstream engine subprocess
    #[serde(default)]
    pub engine: EngineConfig,
}

/// How to launch the engine subprocess for each session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8710
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_engine_command() -> String {
    "agent-engine".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            keep_alive_secs: default_keep_alive_secs(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration with defaults < env < flags precedence: an
    /// explicit path (the CLI flag) wins, otherwise `AGENT_RELAY_CONFIG`
    /// names the file, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse config {}: {e}", path.display()))
        })
    }

    /// The server bind address string (e.g., "127.0.0.1:8710").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
