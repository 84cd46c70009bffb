//! # faceline-core
//!
//! Shared library for faceline containing the embedding math, the frame
//! codec, the matcher and the JSON wire protocol spoken over WebSocket.
//!
//! This crate is used by the server and by tests that drive it.  It has no
//! dependencies on sockets or an async runtime.
//!
//! # Architecture overview
//!
//! faceline watches a live camera feed for one known person.  The browser
//! sends still frames over a WebSocket; the server turns each frame into a
//! face embedding and compares it with the reference embedding stored for
//! that person.  The same server also relays WebRTC signaling between phones
//! that stream video ("streamers") and browsers that watch them ("viewers").
//!
//! - **`domain`** – Pure types: [`Embedding`], cosine similarity, the match
//!   threshold, confidence bands and the stored [`Subject`] record.
//!
//! - **`protocol`** – What travels over the wire: the frame codec that turns a
//!   base64 data URI into a [`RasterFrame`], and the JSON message enums for
//!   match results and signaling.
//!
//! - **`matcher`** – The [`Matcher`] that combines an injected
//!   [`EmbeddingExtractor`] with the similarity function.

pub mod domain;
pub mod matcher;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `faceline_core::Embedding` instead of `faceline_core::domain::embedding::Embedding`.
pub use domain::embedding::{
    cosine_similarity, is_match, ConfidenceLevel, Embedding, ReferenceVector, MATCH_THRESHOLD,
};
pub use domain::subject::Subject;
pub use matcher::{EmbeddingExtractor, ExtractError, MatchError, MatchOutcome, Matcher};
pub use protocol::frame::{decode_frame, FrameDecodeError, RasterFrame};
pub use protocol::messages::{FrameMessage, MatchResult, ServerEvent, SignalingMessage};
