//! Domain layer for faceline-server.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures
//! - The request-path routes a client can connect to
//! - The vocabulary shared by the session loops: connection kinds, close
//!   codes and transport events
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod connection;
pub mod route;

pub use config::{InvalidConfig, ServerConfig};
pub use connection::{CloseCode, ConnectionKind, TransportEvent};
pub use route::{ClientRole, Route, RouteError};
