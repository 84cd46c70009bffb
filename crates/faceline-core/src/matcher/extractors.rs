//! Ready-made [`EmbeddingExtractor`] adapters.

use std::sync::{Mutex, PoisonError};

use tracing::trace;

use super::{EmbeddingExtractor, ExtractError};
use crate::domain::embedding::Embedding;
use crate::protocol::frame::RasterFrame;

/// A model that needs exclusive access while it runs (mutable scratch
/// buffers, a single inference session, a non-thread-safe C handle).
pub trait ExclusiveExtractor: Send {
    fn extract(&mut self, frame: &RasterFrame) -> Result<Option<Embedding>, ExtractError>;
}

/// Serializes calls to an [`ExclusiveExtractor`] behind a mutex so it can be
/// shared by every session.  Throughput is limited to one frame at a time.
pub struct SerializedExtractor<E> {
    inner: Mutex<E>,
}

impl<E: ExclusiveExtractor> SerializedExtractor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<E: ExclusiveExtractor> EmbeddingExtractor for SerializedExtractor<E> {
    fn extract(&self, frame: &RasterFrame) -> Result<Option<Embedding>, ExtractError> {
        // A panic inside a previous call poisons the mutex.  The model state
        // is still the best we have, so keep serving instead of failing every
        // later frame.
        let mut model = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        model.extract(frame)
    }
}

/// Stand-in used when no face model is linked into the binary: every frame
/// is reported as containing no face.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl EmbeddingExtractor for UnavailableExtractor {
    fn extract(&self, frame: &RasterFrame) -> Result<Option<Embedding>, ExtractError> {
        trace!(
            "no embedding backend; skipping {}x{} frame",
            frame.width(),
            frame.height()
        );
        Ok(None)
    }
}
