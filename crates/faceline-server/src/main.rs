//! faceline server: entry point.
//!
//! Serves two kinds of WebSocket clients on one port:
//!
//! - `ws://host:8000/ws/{subject_id}`: a browser streams camera frames and
//!   gets a match result for each one.
//! - `ws://host:8000/ws/{client_id}/{streamer|viewer}`: phones and browsers
//!   exchange WebRTC offers, answers and ICE candidates through the relay.
//!
//! # Usage
//!
//! ```text
//! faceline-server [OPTIONS]
//!
//! Options:
//!   --config            <PATH>   TOML configuration file
//!   --bind              <ADDR>   Listener IP address [default: 0.0.0.0]
//!   --port              <PORT>   Listener port [default: 8000]
//!   --subjects          <PATH>   JSON file of enrolled subjects
//!   --max-message-bytes <BYTES>  Largest accepted message [default: 8388608]
//!   --outbound-queue    <N>      Per-connection send queue [default: 64]
//!   --log-level         <FILTER> Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables,
//! then CLI flags.  `RUST_LOG` overrides the log level from every source.
//!
//! | Variable                      | Flag                  |
//! |-------------------------------|-----------------------|
//! | `FACELINE_CONFIG`             | `--config`            |
//! | `FACELINE_BIND`               | `--bind`              |
//! | `FACELINE_PORT`               | `--port`              |
//! | `FACELINE_SUBJECTS`           | `--subjects`          |
//! | `FACELINE_MAX_MESSAGE_BYTES`  | `--max-message-bytes` |
//! | `FACELINE_OUTBOUND_QUEUE`     | `--outbound-queue`    |
//! | `FACELINE_LOG_LEVEL`          | `--log-level`         |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use faceline_core::matcher::UnavailableExtractor;
use faceline_core::Matcher;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use faceline_server::application::{ServerContext, SubjectStore};
use faceline_server::domain::ServerConfig;
use faceline_server::infrastructure::{
    load_file_config, run_server, FileConfig, InMemorySubjectStore, JsonSubjectStore,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Live face matching and WebRTC signaling over WebSocket.
///
/// Every option is optional; unset options fall back to the config file and
/// then to built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "faceline-server",
    about = "WebSocket server for live face matching and WebRTC signaling",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "FACELINE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind.  `0.0.0.0` accepts connections on every interface.
    #[arg(long, env = "FACELINE_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "FACELINE_PORT")]
    port: Option<u16>,

    /// JSON file of enrolled subjects.  Without it every match session is
    /// refused with "Person not found or no embedding".
    #[arg(long, env = "FACELINE_SUBJECTS")]
    subjects: Option<PathBuf>,

    /// Largest incoming WebSocket message, in bytes.
    #[arg(long, env = "FACELINE_MAX_MESSAGE_BYTES")]
    max_message_bytes: Option<usize>,

    /// Messages that may wait for one slow client before further sends to it
    /// are dropped.
    #[arg(long, env = "FACELINE_OUTBOUND_QUEUE")]
    outbound_queue: Option<usize>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "FACELINE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Reads the `--config` file, or returns all-default file settings.
    fn file_config(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => load_file_config(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// Overlays CLI flags and environment variables onto `file`, then
    /// converts the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address does not parse or a value is out
    /// of range (zero queue size, zero message limit, empty log level).
    fn into_server_config(self, mut file: FileConfig) -> anyhow::Result<ServerConfig> {
        if let Some(bind) = self.bind {
            file.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.server.port = port;
        }
        if let Some(max) = self.max_message_bytes {
            file.server.max_message_bytes = max;
        }
        if let Some(queue) = self.outbound_queue {
            file.server.outbound_queue = queue;
        }
        if let Some(path) = self.subjects {
            file.subjects.path = Some(path);
        }
        if let Some(level) = self.log_level {
            file.logging.level = level;
        }
        file.into_server_config().context("invalid configuration")
    }
}

/// `RUST_LOG` wins; otherwise the configured level; otherwise `info`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.file_config()?;
    let config = cli.into_server_config(file)?;

    init_tracing(&config.log_level);
    info!(
        "faceline server starting: bind={}, max_message_bytes={}, outbound_queue={}",
        config.bind_addr, config.max_message_bytes, config.outbound_queue
    );

    // ── Subject store ─────────────────────────────────────────────────────────
    let store: Arc<dyn SubjectStore> = match &config.subjects_path {
        Some(path) => Arc::new(
            JsonSubjectStore::load(path)
                .await
                .with_context(|| format!("failed to load subjects from {}", path.display()))?,
        ),
        None => {
            warn!("no subjects file configured; every match session will be refused");
            Arc::new(InMemorySubjectStore::default())
        }
    };

    // ── Matcher ───────────────────────────────────────────────────────────────
    warn!("no face embedding backend is linked into this build; every frame reports no face");
    let matcher = Matcher::new(UnavailableExtractor);

    let ctx = Arc::new(ServerContext::new(config, store, matcher));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(ctx, running).await?;

    info!("faceline server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
