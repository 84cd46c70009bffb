//! JSON message types for the WebSocket protocol.
//!
//! There are two independent conversations on the server, each with its own
//! set of messages:
//!
//! ```text
//! Match session  (/ws/{subject_id})
//!   client → server:  FrameMessage   {"frame":"data:image/jpeg;base64,..."}
//!   server → client:  MatchResult    {"matched":true,"similarity":0.83,"name":"Bataa",...}
//!
//! Signaling      (/ws/{client_id}/{streamer|viewer})
//!   client → server:  SignalingMessage  {"type":"offer","target":"viewer-1","offer":{...}}
//!   server → client:  ServerEvent       {"type":"offer","offer":{...},"from":"phone-7"}
//! ```
//!
//! Signaling messages carry a `"type"` discriminant handled by
//! `#[serde(tag = "type")]`.  Unknown types and wrongly typed fields are
//! rejected when the JSON is parsed, so the relay never inspects loose maps.
//!
//! WebRTC payloads (`offer`, `answer`, `candidate`) are opaque to the server
//! and are carried as raw JSON values.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::embedding::{is_match, ConfidenceLevel, ReferenceVector};

/// Error text sent when a match session is opened for an unknown subject or a
/// subject without an enrolled embedding.  Also used as the close reason.
pub const SUBJECT_NOT_FOUND: &str = "Person not found or no embedding";

// ── Match session ─────────────────────────────────────────────────────────────

/// One inbound message on a match session.
///
/// Any JSON object is accepted; a missing or `null` `frame` means "nothing to
/// score" and the message is skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub frame: Option<String>,
}

/// One outbound message on a match session.
///
/// # Serde representation
///
/// ```json
/// {"matched":true,"similarity":0.83,"name":"Bataa","confidence":"high","confidence_percentage":83.0}
/// {"matched":false,"similarity":0.12,"name":null,"confidence":"low","confidence_percentage":12.0}
/// {"matched":false}
/// {"error":"invalid message: expected value at line 1 column 1"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchResult {
    /// A face was found and scored against the reference.
    Scored {
        matched: bool,
        similarity: f64,
        /// Reference name when matched, `null` otherwise.
        name: Option<String>,
        confidence: ConfidenceLevel,
        confidence_percentage: f64,
    },

    /// The frame decoded but contained no face.
    NoFace { matched: bool },

    /// The message could not be processed.
    Error { error: String },
}

impl MatchResult {
    pub fn no_face() -> Self {
        MatchResult::NoFace { matched: false }
    }

    /// Applies the strict match threshold to `similarity`.
    pub fn scored(similarity: f64, reference: &ReferenceVector) -> Self {
        let matched = is_match(similarity);
        MatchResult::Scored {
            matched,
            similarity,
            name: matched.then(|| reference.name().to_string()),
            confidence: ConfidenceLevel::from_similarity(similarity),
            confidence_percentage: (similarity * 10_000.0).round() / 100.0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        MatchResult::Error {
            error: message.into(),
        }
    }

    pub fn is_matched(&self) -> bool {
        match self {
            MatchResult::Scored { matched, .. } | MatchResult::NoFace { matched } => *matched,
            MatchResult::Error { .. } => false,
        }
    }

    pub fn similarity(&self) -> Option<f64> {
        match self {
            MatchResult::Scored { similarity, .. } => Some(*similarity),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MatchResult::Error { .. })
    }
}

// ── Signaling: client → server ────────────────────────────────────────────────

/// All messages a streamer or viewer can send to the relay.
///
/// A missing `target` (or `streamerId`) is not a parse error: the relay drops
/// such messages silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// SDP offer, usually streamer → viewer.
    #[serde(rename = "offer")]
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default)]
        offer: Value,
    },

    /// SDP answer, usually viewer → streamer.
    #[serde(rename = "answer")]
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default)]
        answer: Value,
    },

    /// Trickled ICE candidate, either direction.
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default)]
        candidate: Value,
    },

    /// Viewer asks a streamer to start an offer.
    #[serde(rename = "request_stream")]
    RequestStream {
        #[serde(
            rename = "streamerId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        streamer_id: Option<String>,
    },
}

impl SignalingMessage {
    /// Wire name of the variant.  Used in log lines instead of the payload,
    /// which can be large (full SDP blobs).
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice-candidate",
            SignalingMessage::RequestStream { .. } => "request_stream",
        }
    }
}

// ── Signaling: server → client ────────────────────────────────────────────────

/// All messages the relay sends to streamers and viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Forwarded offer.
    #[serde(rename = "offer")]
    Offer { offer: Value, from: String },

    /// Forwarded answer.
    #[serde(rename = "answer")]
    Answer { answer: Value, from: String },

    /// Forwarded ICE candidate.
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: Value, from: String },

    /// A viewer wants this streamer's video.
    #[serde(rename = "stream_request")]
    StreamRequest { from: String },

    /// A streamer connected.  `timestamp` is Unix milliseconds as a string.
    #[serde(rename = "new_streamer")]
    NewStreamer {
        #[serde(rename = "streamerId")]
        streamer_id: String,
        timestamp: String,
    },

    /// A streamer disconnected.
    #[serde(rename = "streamer_left")]
    StreamerLeft {
        #[serde(rename = "streamerId")]
        streamer_id: String,
    },

    /// Snapshot of the streamers online when a viewer connected.
    #[serde(rename = "active_streamers")]
    ActiveStreamers { streamers: Vec<String> },

    /// The last inbound message was rejected.
    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerEvent {
    /// A `new_streamer` event stamped with the current wall-clock time.
    pub fn new_streamer(streamer_id: impl Into<String>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        ServerEvent::NewStreamer {
            streamer_id: streamer_id.into(),
            timestamp: millis.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ServerEvent::Offer { .. } => "offer",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::IceCandidate { .. } => "ice-candidate",
            ServerEvent::StreamRequest { .. } => "stream_request",
            ServerEvent::NewStreamer { .. } => "new_streamer",
            ServerEvent::StreamerLeft { .. } => "streamer_left",
            ServerEvent::ActiveStreamers { .. } => "active_streamers",
            ServerEvent::Error { .. } => "error",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
