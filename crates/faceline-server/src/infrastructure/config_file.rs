//! Optional TOML configuration file (`--config <path>`).
//!
//! Every field may be omitted; omitted fields take the same defaults as
//! [`ServerConfig::default`].  The binary overlays environment variables and
//! CLI flags onto the parsed [`FileConfig`] and then converts it once with
//! [`FileConfig::into_server_config`], so every source goes through the same
//! address parsing and validation.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8000
//! max_message_bytes = 8388608
//! outbound_queue = 64
//!
//! [subjects]
//! path = "subjects.json"
//!
//! [logging]
//! level = "info"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_OUTBOUND_QUEUE};
use crate::domain::{InvalidConfig, ServerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error(transparent)]
    Invalid(#[from] InvalidConfig),
}

// ── File schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub subjects: SubjectsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubjectsSection {
    /// JSON subject file.  Relative paths resolve against the working
    /// directory, not the config file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing` filter: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`,
    /// or a full directive such as `"faceline_server=debug,info"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}
fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_message_bytes: default_max_message_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl FileConfig {
    /// Parses TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Converts the settings into a validated [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] if the bind address does not parse,
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let bind_addr = socket_addr(&self.server.bind_address, self.server.port)?;
        let config = ServerConfig {
            bind_addr,
            subjects_path: self.subjects.path,
            max_message_bytes: self.server.max_message_bytes,
            outbound_queue: self.server.outbound_queue,
            log_level: self.logging.level,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Joins a host address and port, accepting bare IPv6 addresses.
fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let text = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    text.parse()
        .map_err(|_| ConfigError::InvalidAddress(text.clone()))
}

/// Reads and parses the config file at `path`.  A missing file is an error:
/// the path was given explicitly.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed or has unknown keys.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
