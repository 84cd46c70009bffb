//! WebSocket endpoints, parsed from the upgrade request path.
//!
//! | Path                          | Route                                    |
//! |-------------------------------|------------------------------------------|
//! | `/ws/{subject_id}`            | [`Route::Match`]                         |
//! | `/ws/{client_id}/streamer`    | [`Route::Signaling`] as a streamer       |
//! | `/ws/{client_id}/viewer`      | [`Route::Signaling`] as a viewer         |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The role a signaling client declares in its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRole {
    Streamer,
    Viewer,
}

impl ClientRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientRole::Streamer => "streamer",
            ClientRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientRole {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streamer" => Ok(ClientRole::Streamer),
            "viewer" => Ok(ClientRole::Viewer),
            other => Err(RouteError::UnknownRole(other.to_string())),
        }
    }
}

/// Where an incoming connection is headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A live face-matching session against one enrolled subject.
    Match { subject_id: String },
    /// A WebRTC signaling client.
    Signaling { client_id: String, role: ClientRole },
}

/// Why a request path was refused before the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no WebSocket endpoint at '{0}'")]
    NotFound(String),

    #[error("unknown client role '{0}'; expected 'streamer' or 'viewer'")]
    UnknownRole(String),
}

impl RouteError {
    /// HTTP status to answer the upgrade request with.
    pub fn status_code(&self) -> u16 {
        match self {
            RouteError::NotFound(_) => 404,
            RouteError::UnknownRole(_) => 400,
        }
    }
}

impl Route {
    /// Parses the path component of an upgrade request (no query string).
    pub fn parse(path: &str) -> Result<Route, RouteError> {
        let not_found = || RouteError::NotFound(path.to_string());

        let rest = path.strip_prefix("/ws/").ok_or_else(not_found)?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(not_found());
        }

        match segments.as_slice() {
            [subject_id] => Ok(Route::Match {
                subject_id: (*subject_id).to_string(),
            }),
            [client_id, role] => Ok(Route::Signaling {
                client_id: (*client_id).to_string(),
                role: role.parse()?,
            }),
            _ => Err(not_found()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
