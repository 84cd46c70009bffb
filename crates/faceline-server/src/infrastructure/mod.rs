//! Infrastructure layer for faceline-server.
//!
//! - [`ws_server`]: the TCP accept loop, WebSocket upgrade and per-connection
//!   reader/writer tasks.
//! - [`subject_store`]: the in-memory subject store and its JSON file loader.
//! - [`config_file`]: the optional TOML configuration file.

pub mod config_file;
pub mod subject_store;
pub mod ws_server;

pub use config_file::{load_file_config, ConfigError, FileConfig};
pub use subject_store::{InMemorySubjectStore, JsonSubjectStore, SubjectFileError};
pub use ws_server::{bind, run_server, serve};
