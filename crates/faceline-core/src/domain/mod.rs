//! Domain module containing pure matching types.
//!
//! Nothing in here performs I/O.  Embeddings are plain `f32` vectors and the
//! similarity function is a total function: it never panics and never returns
//! an error for zero-length or zero-magnitude input.

pub mod embedding;
pub mod subject;

pub use embedding::{
    cosine_similarity, is_match, ConfidenceLevel, Embedding, ReferenceVector, MATCH_THRESHOLD,
};
pub use subject::Subject;
