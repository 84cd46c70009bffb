//! Port through which sessions look up enrolled subjects.

use async_trait::async_trait;
use faceline_core::Subject;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached or read.
    #[error("subject store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the subjects a match session can be opened against.
///
/// `Ok(None)` means "no such subject"; an `Err` means the store itself
/// failed and the caller cannot tell whether the subject exists.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError>;
}
