//! Matcher: raster frame → "no face" or a similarity score.
//!
//! The face model itself is not part of this crate.  It is injected as an
//! [`EmbeddingExtractor`] so the matching loop can be tested with a
//! deterministic stub, and so a native backend can be swapped in without
//! touching the session code.
//!
//! # Failure containment
//!
//! Native inference libraries fail in two ways: they return an error, or they
//! panic from inside FFI glue.  [`Matcher::evaluate`] converts both into a
//! [`MatchError`] so a single bad frame can never take the session down.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::domain::embedding::{cosine_similarity, Embedding, ReferenceVector};
use crate::protocol::frame::RasterFrame;
use crate::protocol::messages::MatchResult;

pub mod extractors;

pub use extractors::{ExclusiveExtractor, SerializedExtractor, UnavailableExtractor};

/// Failure reported by an extractor backend.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("embedding backend failed: {0}")]
pub struct ExtractError(pub String);

/// A face embedding model.
///
/// `Ok(None)` means the frame contains no detectable face.  Implementations
/// are shared by every session and called concurrently; a model that cannot
/// be called from several threads at once should implement
/// [`ExclusiveExtractor`] and be wrapped in a [`SerializedExtractor`].
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, frame: &RasterFrame) -> Result<Option<Embedding>, ExtractError>;
}

/// Errors produced while scoring a decoded frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("embedding backend panicked: {0}")]
    ExtractorPanicked(String),

    #[error("embedding has {actual} dimensions, reference has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result of scoring one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    NoFace,
    Scored { similarity: f64 },
}

impl MatchOutcome {
    /// Converts the outcome into the wire message for `reference`.
    pub fn into_result(self, reference: &ReferenceVector) -> MatchResult {
        match self {
            MatchOutcome::NoFace => MatchResult::no_face(),
            MatchOutcome::Scored { similarity } => MatchResult::scored(similarity, reference),
        }
    }
}

/// Shared, stateless scorer.  Clone is cheap (one `Arc`).
#[derive(Clone)]
pub struct Matcher {
    extractor: Arc<dyn EmbeddingExtractor>,
}

impl Matcher {
    pub fn new(extractor: impl EmbeddingExtractor + 'static) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }

    /// Extracts an embedding from `frame` and scores it against `reference`.
    ///
    /// # Errors
    ///
    /// - [`MatchError::Extract`] when the backend reports a failure.
    /// - [`MatchError::ExtractorPanicked`] when the backend panics.
    /// - [`MatchError::DimensionMismatch`] when the embedding length differs
    ///   from the reference length.
    pub fn evaluate(
        &self,
        frame: &RasterFrame,
        reference: &ReferenceVector,
    ) -> Result<MatchOutcome, MatchError> {
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| self.extractor.extract(frame)))
            .map_err(|payload| {
                let message = panic_message(payload.as_ref());
                warn!("embedding backend panicked: {message}");
                MatchError::ExtractorPanicked(message)
            })??;

        let Some(embedding) = extracted else {
            return Ok(MatchOutcome::NoFace);
        };

        if embedding.len() != reference.dimensions() {
            return Err(MatchError::DimensionMismatch {
                expected: reference.dimensions(),
                actual: embedding.len(),
            });
        }

        let similarity = cosine_similarity(embedding.as_slice(), reference.embedding().as_slice());
        Ok(MatchOutcome::Scored { similarity })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
