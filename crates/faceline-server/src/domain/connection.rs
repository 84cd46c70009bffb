//! Vocabulary shared by the connection loops.

use super::route::ClientRole;

/// What a registered connection is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// A face-matching session.  Never receives signaling traffic.
    Match,
    Streamer,
    Viewer,
}

impl From<ClientRole> for ConnectionKind {
    fn from(role: ClientRole) -> Self {
        match role {
            ClientRole::Streamer => ConnectionKind::Streamer,
            ClientRole::Viewer => ConnectionKind::Viewer,
        }
    }
}

/// WebSocket close codes the server sends (RFC 6455 §7.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: the session ended on purpose (subject not found, superseded).
    Normal,
    /// 1001: the server is shutting down.
    GoingAway,
    /// 1007: a text message was not valid UTF-8.
    InvalidData,
    /// 1009: a message exceeded the transport's hard size cap.
    MessageTooBig,
    /// 1011: an internal failure the client cannot fix.
    ServerError,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::InvalidData => 1007,
            CloseCode::MessageTooBig => 1009,
            CloseCode::ServerError => 1011,
        }
    }
}

/// One thing that happened on the inbound side of a connection, already
/// stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text message.
    Text(String),
    /// A complete binary message.
    Binary(Vec<u8>),
    /// The client went away (close frame, reset, EOF).
    Disconnected,
    /// A complete message arrived but is refused (over `max_message_bytes`).
    /// The transport read it fully, so the connection is still usable.
    ReceiveFailed(String),
    /// The transport could not read a message (invalid UTF-8, over the hard
    /// frame cap).  The read half is finished; the session must close with
    /// `code` after reporting `reason`.
    Violation { code: CloseCode, reason: String },
    /// Control traffic the session does not care about (ping, pong).
    Ignored,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_values() {
        assert_eq!(CloseCode::Normal.as_u16(), 1000);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
        assert_eq!(CloseCode::InvalidData.as_u16(), 1007);
        assert_eq!(CloseCode::MessageTooBig.as_u16(), 1009);
        assert_eq!(CloseCode::ServerError.as_u16(), 1011);
    }

    #[test]
    fn test_role_maps_to_kind() {
        assert_eq!(
            ConnectionKind::from(ClientRole::Streamer),
            ConnectionKind::Streamer
        );
        assert_eq!(
            ConnectionKind::from(ClientRole::Viewer),
            ConnectionKind::Viewer
        );
    }
}
