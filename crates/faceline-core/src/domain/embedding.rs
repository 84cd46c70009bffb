//! Face embeddings, cosine similarity and the match decision.
//!
//! # What is an embedding?
//!
//! A face recognition model maps a cropped face to a fixed-length vector of
//! floats (512 values for ArcFace-style models).  Two photos of the same
//! person produce vectors that point in roughly the same direction, so the
//! cosine of the angle between them is a good similarity score:
//!
//! ```text
//! similarity(a, b) = (a · b) / (|a| * |b|)      ∈ [-1.0, 1.0]
//! ```
//!
//! The server declares a match when the similarity is strictly greater than
//! [`MATCH_THRESHOLD`].

use serde::{Deserialize, Serialize};

/// Decision boundary for a positive match.  The comparison is strict: a
/// similarity of exactly `0.4` is **not** a match.
pub const MATCH_THRESHOLD: f64 = 0.4;

/// Similarity at or above which a match is reported as high confidence.
pub const HIGH_CONFIDENCE: f64 = 0.7;

/// Similarity at or above which a match is reported as medium confidence.
pub const MEDIUM_CONFIDENCE: f64 = 0.5;

/// A face embedding produced by an extractor or loaded from the subject store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm, accumulated in `f64`.
    pub fn norm(&self) -> f64 {
        norm(&self.0)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// The stored reference a live session compares against.
///
/// Built once at session start and never mutated afterwards; the fields are
/// private so nothing can change them behind the session's back.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVector {
    name: String,
    embedding: Embedding,
}

impl ReferenceVector {
    /// Returns `None` when the embedding is empty: an empty reference can never
    /// produce a meaningful score.
    pub fn new(name: impl Into<String>, embedding: Embedding) -> Option<Self> {
        if embedding.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            embedding,
        })
    }

    /// Display name reported in positive match results.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// Coarse confidence band shown next to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_similarity(similarity: f64) -> Self {
        if similarity >= HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if similarity >= MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Cosine similarity of two vectors.
///
/// Returns `0.0` instead of dividing by zero when either vector has zero
/// magnitude, and `0.0` for vectors of different lengths or with non-finite
/// components.  Never panics.
///
/// # Examples
///
/// ```rust
/// use faceline_core::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-9);
/// assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Applies the strict match threshold.
pub fn is_match(similarity: f64) -> bool {
    similarity > MATCH_THRESHOLD
}

fn norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
