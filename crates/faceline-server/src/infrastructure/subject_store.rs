//! In-memory [`SubjectStore`] adapter, optionally loaded from a JSON file.
//!
//! The file holds an array of person documents as exported from the
//! profile database.  Only `_id` (or `id`), `name` and `embedding` are read;
//! every other profile field is ignored.
//!
//! ```json
//! [
//!   {"_id": "665f1c...", "name": "Bataa", "embedding": [0.013, -0.201, ...]},
//!   {"_id": "665f1d...", "name": "Saraa", "status": "missing"}
//! ]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use faceline_core::Subject;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::{StoreError, SubjectStore};

#[derive(Debug, Error)]
pub enum SubjectFileError {
    #[error("I/O error reading subjects at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("subjects file {path} is not a JSON array of subjects: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only store of subjects held in a map.
#[derive(Debug, Default, Clone)]
pub struct InMemorySubjectStore {
    subjects: HashMap<String, Subject>,
}

impl InMemorySubjectStore {
    /// Builds a store.  A later subject with a repeated id replaces the
    /// earlier one.
    pub fn new(subjects: impl IntoIterator<Item = Subject>) -> Self {
        let mut map = HashMap::new();
        for subject in subjects {
            if let Some(previous) = map.insert(subject.id.clone(), subject) {
                warn!("duplicate subject id {}; keeping the later entry", previous.id);
            }
        }
        Self { subjects: map }
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Number of subjects a match session can actually be opened against.
    pub fn enrolled(&self) -> usize {
        self.subjects
            .values()
            .filter(|s| s.reference().is_some())
            .count()
    }
}

#[async_trait]
impl SubjectStore for InMemorySubjectStore {
    async fn subject(&self, id: &str) -> Result<Option<Subject>, StoreError> {
        Ok(self.subjects.get(id).cloned())
    }
}

/// Loads subjects from a JSON file.
pub struct JsonSubjectStore;

impl JsonSubjectStore {
    pub async fn load(path: &Path) -> Result<InMemorySubjectStore, SubjectFileError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SubjectFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let subjects: Vec<Subject> =
            serde_json::from_str(&content).map_err(|source| SubjectFileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let store = InMemorySubjectStore::new(subjects);
        info!(
            "loaded {} subject(s) from {} ({} with a reference embedding)",
            store.len(),
            path.display(),
            store.enrolled()
        );
        Ok(store)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
