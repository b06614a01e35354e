//! Configuration types for Wiretap

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::dump::DEFAULT_MAX_BODY_SIZE;
use crate::sink::{self, SharedWriter};
use crate::{Result, WiretapError};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where dumps are written
    #[serde(default)]
    pub output: OutputConfig,
    /// Rendering options
    #[serde(default)]
    pub dump: DumpConfig,
    /// Outbound client settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Inbound server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Dump destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum OutputConfig {
    /// Standard output
    #[default]
    Stdout,
    /// Standard error
    Stderr,
    /// A file, created if missing
    File {
        /// Path of the dump file
        path: PathBuf,
        /// Append instead of truncating
        #[serde(default)]
        append: bool,
    },
}

/// Rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Include bodies in dumps
    #[serde(default = "default_true")]
    pub body: bool,
    /// Bodies larger than this are reported instead of dumped
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            body: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Outbound client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User-Agent injected when a request has none
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Idle pooled connections are closed after this many seconds
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle pooled connections per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

/// Inbound server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

/// Default User-Agent (`wiretap/<version>`)
pub fn default_user_agent() -> String {
    format!("wiretap/{}", env!("CARGO_PKG_VERSION"))
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_pool_max_idle() -> usize {
    10
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WiretapError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| WiretapError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if let OutputConfig::File { path, .. } = &self.output {
            if path.as_os_str().is_empty() {
                return Err(WiretapError::ConfigError(
                    "output.path cannot be empty".to_string(),
                ));
            }
        }

        if self.dump.max_body_size == 0 {
            return Err(WiretapError::ConfigError(
                "dump.max_body_size must be > 0".to_string(),
            ));
        }

        if self.client.user_agent.is_empty() {
            return Err(WiretapError::ConfigError(
                "client.user_agent cannot be empty".to_string(),
            ));
        }

        if hyper::header::HeaderValue::from_str(&self.client.user_agent).is_err() {
            return Err(WiretapError::ConfigError(format!(
                "client.user_agent is not a valid header value: {:?}",
                self.client.user_agent
            )));
        }

        Ok(())
    }

    /// Open the configured dump destination
    ///
    /// # Errors
    ///
    /// Returns error if the output file cannot be opened
    pub fn open_output(&self) -> Result<SharedWriter> {
        let writer: SharedWriter = match &self.output {
            OutputConfig::Stdout => Arc::new(Mutex::new(std::io::stdout())),
            OutputConfig::Stderr => Arc::new(Mutex::new(std::io::stderr())),
            OutputConfig::File { path, append } => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(*append)
                    .truncate(!*append)
                    .open(path)?;
                Arc::new(Mutex::new(file))
            }
        };

        Ok(writer)
    }

    /// Open the configured dump destination and make it the process-wide one
    ///
    /// # Errors
    ///
    /// Returns error if the output file cannot be opened
    pub fn install_output(&self) -> Result<()> {
        let writer = self.open_output()?;
        sink::replace_output(writer);
        Ok(())
    }
}
