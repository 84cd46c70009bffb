//! Application layer for faceline-server.
//!
//! This layer holds the behaviour of the server independent of sockets:
//!
//! - [`SessionRegistry`]: the shared table of live connections and the
//!   streamer/viewer presence notifications.
//! - [`MatchSession`]: the per-connection face matching state machine.
//! - [`SignalingRelay`]: routes offers, answers, ICE candidates and stream
//!   requests between signaling clients.
//!
//! Every loop here consumes a `Stream` of
//! [`TransportEvent`](crate::domain::TransportEvent)s and writes through a
//! [`ConnectionHandle`], so tests drive them without a network.

pub mod connection;
pub mod context;
pub mod match_session;
pub mod registry;
pub mod signaling;
pub mod subject_store;

pub use connection::{ConnectionHandle, Outbound, SendError};
pub use context::ServerContext;
pub use match_session::{
    Disposition, FrameError, HandshakeError, MatchSession, SessionState, SessionStats,
};
pub use registry::{Delivery, SessionRegistry};
pub use signaling::{RelayOutcome, SignalingRelay};
pub use subject_store::{StoreError, SubjectStore};
