//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  The
//! binary layers it from defaults, an optional TOML file, environment
//! variables and CLI flags; the domain only holds the result.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Default upper bound on one incoming WebSocket message (8 MiB).  A 640x480
/// JPEG frame encoded as a base64 data URI is well under 1 MiB.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Default number of messages that may wait in one connection's outbound
/// queue before further sends to it fail.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// All runtime configuration for the server.
///
/// # Example
///
/// ```rust
/// use faceline_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// JSON file holding the enrolled subjects.  `None` starts the server
    /// with an empty store, so every match session is refused.
    pub subjects_path: Option<PathBuf>,

    /// Largest incoming WebSocket message accepted, in bytes.
    pub max_message_bytes: usize,

    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    /// | Field             | Default         |
    /// |-------------------|-----------------|
    /// | bind_addr         | `0.0.0.0:8000`  |
    /// | subjects_path     | none            |
    /// | max_message_bytes | 8 MiB           |
    /// | outbound_queue    | 64              |
    /// | log_level         | `info`          |
    fn default() -> Self {
        Self {
            // Compile-time constant address; parsing cannot fail.
            bind_addr: "0.0.0.0:8000".parse().unwrap(),
            subjects_path: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            log_level: "info".to_string(),
        }
    }
}

/// A configuration value that is well-typed but unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidConfig {
    #[error("outbound_queue must be at least 1")]
    ZeroOutboundQueue,

    #[error("max_message_bytes must be at least 1")]
    ZeroMessageLimit,

    #[error("log_level must not be empty")]
    EmptyLogLevel,
}

impl ServerConfig {
    /// Checks the values that the type system cannot.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.outbound_queue == 0 {
            return Err(InvalidConfig::ZeroOutboundQueue);
        }
        if self.max_message_bytes == 0 {
            return Err(InvalidConfig::ZeroMessageLimit);
        }
        if self.log_level.trim().is_empty() {
            return Err(InvalidConfig::EmptyLogLevel);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
