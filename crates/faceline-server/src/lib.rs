//! faceline-server library crate.
//!
//! This crate provides the WebSocket server behind faceline: live face
//! matching sessions for browsers, and a signaling relay that lets a viewer
//! negotiate a WebRTC connection with a streaming phone.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser / phone (JSON over WebSocket)
//!         ↕
//! [faceline-server]
//!   ├── domain/           Pure types: ServerConfig, Route, ConnectionKind, TransportEvent
//!   ├── application/      SessionRegistry, MatchSession, SignalingRelay, SubjectStore port
//!   └── infrastructure/
//!         ├── ws_server/      Accept loop + per-connection tasks (tokio-tungstenite)
//!         ├── subject_store/  In-memory store loaded from a JSON file
//!         └── config_file/    Optional TOML configuration file
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `faceline-core`; it talks to the
//!   outside world only through [`application::ConnectionHandle`] and the
//!   [`application::SubjectStore`] trait, so every loop can be driven from a
//!   plain stream of [`domain::TransportEvent`]s in tests.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: registry, session loops and the signaling relay.
pub mod application;

/// Infrastructure layer: WebSocket server, subject file and config file.
pub mod infrastructure;
