//! Configuration management

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::path::Path;

use crate::blockchain::DEFAULT_DIFFICULTY;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mining: MiningConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MiningConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
    /// Address credited with mining rewards; empty means generate a wallet
    #[serde(default)]
    pub owner_address: String,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            interval_secs: default_interval_secs(),
            enabled: default_mining_enabled(),
            owner_address: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_interval_secs() -> u64 {
    10
}

fn default_mining_enabled() -> bool {
    true
}

impl Config {
    /// Loads a TOML config file; missing sections and keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// The configured reward address, if any
    pub fn owner_address(&self) -> Option<&str> {
        let address = self.mining.owner_address.trim();
        if address.is_empty() {
            None
        } else {
            Some(address)
        }
    }
}
