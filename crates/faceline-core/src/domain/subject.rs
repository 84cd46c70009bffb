//! The stored subject record.
//!
//! A subject is a person somebody is looking for.  The store keeps a profile
//! (name, photo, last-seen details) and, once a photo has been enrolled, the
//! reference embedding computed from it.  Only the fields the live matcher
//! needs are modelled here; unknown profile fields are ignored on decode.

use serde::{Deserialize, Serialize};

use super::embedding::{Embedding, ReferenceVector};

/// Serializes with `id`; decodes from `_id` or `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SubjectDocument")]
pub struct Subject {
    /// Store identifier.
    pub id: String,
    pub name: String,
    /// Reference embedding; absent until a photo has been enrolled.
    pub embedding: Option<Embedding>,
}

/// Wire shape of a stored person.  Document databases export `_id`; when a
/// document carries both `_id` and `id`, `_id` is the store key and wins.
#[derive(Deserialize)]
struct SubjectDocument {
    #[serde(rename = "_id")]
    store_id: Option<String>,
    id: Option<String>,
    name: String,
    #[serde(default)]
    embedding: Option<Embedding>,
}

impl TryFrom<SubjectDocument> for Subject {
    type Error = String;

    fn try_from(doc: SubjectDocument) -> Result<Self, Self::Error> {
        let id = doc
            .store_id
            .or(doc.id)
            .ok_or_else(|| "subject document has neither `_id` nor `id`".to_string())?;
        Ok(Subject {
            id,
            name: doc.name,
            embedding: doc.embedding,
        })
    }
}

impl Subject {
    /// Builds the session reference, or `None` if no usable embedding exists.
    pub fn reference(&self) -> Option<ReferenceVector> {
        let embedding = self.embedding.clone()?;
        ReferenceVector::new(self.name.clone(), embedding)
    }
}
