//! Configuration for playctl-api
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments / environment (`--port`, `PLAYCTL_PORT`, ...)
//! 2. TOML configuration file
//! 3. Built-in defaults (see `playctl_common::config`)
//!
//! The listen port is the only setting that may change while running; it
//! lives in a [`PortSetting`] that the port watcher observes.

use playctl_common::config::{default_config_path, parse_port, validate_port, TomlConfig};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::ServerOptions;
use crate::error::{Error, Result};

/// Values supplied on the command line (or through the environment)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub log_level: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: IpAddr,
    pub state_poll_interval: Duration,
    pub config_check_interval: Duration,
    pub delegation_timeout: Duration,
    pub log_level: String,
    /// TOML file the settings came from, when one was read
    pub config_path: Option<PathBuf>,
    /// Port was fixed on the command line; the file's `port` is ignored
    pub port_pinned: bool,
}

impl Config {
    /// Resolve configuration from `path` (or the default location) and
    /// command-line overrides.
    ///
    /// A missing file is not an error. An unparseable file, an out-of-range
    /// port, an unparseable host or a zero interval is.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let (toml, config_path) = match &path {
            Some(p) => {
                let toml = TomlConfig::load_or_default(p)?;
                let found = p.exists().then(|| p.clone());
                (toml, found)
            }
            None => {
                warn!("No configuration directory available, using built-in defaults");
                (TomlConfig::default(), None)
            }
        };

        Self::resolve(toml, config_path, overrides)
    }

    fn resolve(
        toml: TomlConfig,
        config_path: Option<PathBuf>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let port_pinned = overrides.port.is_some();
        let port = match overrides.port {
            Some(port) => validate_port(i64::from(port))?,
            None => toml.validated_port()?,
        };

        let host_str = overrides.host.unwrap_or(toml.host);
        let host: IpAddr = host_str
            .parse()
            .map_err(|_| Error::Config(format!("Invalid host address {:?}", host_str)))?;

        Ok(Self {
            port,
            host,
            state_poll_interval: positive_ms("state_poll_interval_ms", toml.state_poll_interval_ms)?,
            config_check_interval: positive_ms(
                "config_check_interval_ms",
                toml.config_check_interval_ms,
            )?,
            delegation_timeout: positive_ms("delegation_timeout_ms", toml.delegation_timeout_ms)?,
            log_level: overrides.log_level.unwrap_or(toml.logging.level),
            config_path,
            port_pinned,
        })
    }

    /// Listener-independent server settings
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host,
            delegation_timeout: self.delegation_timeout,
        }
    }

    /// File the port watcher should re-read, if any
    pub fn watched_file(&self) -> Option<&Path> {
        if self.port_pinned {
            None
        } else {
            self.config_path.as_deref()
        }
    }
}

fn positive_ms(key: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        return Err(Error::Config(format!("{} must be greater than 0", key)));
    }
    Ok(Duration::from_millis(value))
}

// ============================================================================
// Runtime port setting
// ============================================================================

/// Configured listen port, changeable at runtime
///
/// **Note:** Invalid values are rejected with a warning and the previous
/// port is retained.
pub struct PortSetting {
    tx: watch::Sender<u16>,
}

impl PortSetting {
    pub fn new(port: u16) -> Self {
        let (tx, _rx) = watch::channel(port);
        Self { tx }
    }

    /// Currently configured port
    pub fn get(&self) -> u16 {
        *self.tx.borrow()
    }

    /// Set the port from a raw number
    pub fn set(&self, value: i64) -> Result<u16> {
        match validate_port(value) {
            Ok(port) => Ok(self.apply(port)),
            Err(e) => {
                warn!("Rejected port setting {}: {}; keeping {}", value, e, self.get());
                Err(e.into())
            }
        }
    }

    /// Set the port from user input such as `"8080"`
    pub fn set_str(&self, raw: &str) -> Result<u16> {
        match parse_port(raw) {
            Ok(port) => Ok(self.apply(port)),
            Err(e) => {
                warn!("Rejected port setting {:?}: {}; keeping {}", raw, e, self.get());
                Err(e.into())
            }
        }
    }

    fn apply(&self, port: u16) -> u16 {
        let previous = self.tx.send_replace(port);
        if previous != port {
            info!("Port setting changed: {} -> {}", previous, port);
        }
        port
    }

    /// Receiver that is notified on every accepted change
    pub fn subscribe(&self) -> watch::Receiver<u16> {
        self.tx.subscribe()
    }
}
