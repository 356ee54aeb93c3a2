//! Bootstrap configuration and listen-port validation
//!
//! The TOML file is optional. A missing file is not an error: the service
//! logs a warning and starts with built-in defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments / environment variables (handled by the binary)
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 24123;

/// Default player state polling interval
pub const DEFAULT_STATE_POLL_INTERVAL_MS: u64 = 250;

/// Default interval for re-checking the configured port
pub const DEFAULT_CONFIG_CHECK_INTERVAL_MS: u64 = 5000;

/// Default upper bound for one engine delegation call
pub const DEFAULT_DELEGATION_TIMEOUT_MS: u64 = 3000;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Listen port. Kept as a raw integer so an out-of-range value can be
    /// rejected on its own without failing the whole file.
    #[serde(default = "default_port")]
    pub port: i64,

    /// Bind address for the listener
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_state_poll_interval_ms")]
    pub state_poll_interval_ms: u64,

    #[serde(default = "default_config_check_interval_ms")]
    pub config_check_interval_ms: u64,

    #[serde(default = "default_delegation_timeout_ms")]
    pub delegation_timeout_ms: u64,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            state_poll_interval_ms: default_state_poll_interval_ms(),
            config_check_interval_ms: default_config_check_interval_ms(),
            delegation_timeout_ms: default_delegation_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> i64 {
    DEFAULT_PORT as i64
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_state_poll_interval_ms() -> u64 {
    DEFAULT_STATE_POLL_INTERVAL_MS
}

fn default_config_check_interval_ms() -> u64 {
    DEFAULT_CONFIG_CHECK_INTERVAL_MS
}

fn default_delegation_timeout_ms() -> u64 {
    DEFAULT_DELEGATION_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    ///
    /// A present but unparseable file is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let config = Self::load(path)?;
            info!("Loaded TOML configuration from {:?}", path);
            Ok(config)
        } else {
            warn!("Config file {:?} not found, using built-in defaults", path);
            Ok(Self::default())
        }
    }

    /// The configured port after range validation
    pub fn validated_port(&self) -> Result<u16> {
        validate_port(self.port)
    }
}

/// Default configuration file path: `<config dir>/playctl/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playctl").join("config.toml"))
}

/// Accept a port in 1-65535
pub fn validate_port(value: i64) -> Result<u16> {
    if (1..=65535).contains(&value) {
        Ok(value as u16)
    } else {
        Err(Error::InvalidPort(format!("{} is outside 1-65535", value)))
    }
}

/// Parse a user-supplied port string (surrounding whitespace allowed)
pub fn parse_port(raw: &str) -> Result<u16> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidPort(format!("{:?} is not a number", raw)))?;
    validate_port(value)
}
