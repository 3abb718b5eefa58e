//! rollcall-core — Identity matching and attendance decision logic.
//!
//! Pure in-memory computation: the gallery of enrolled identities, the
//! similarity matcher, and the enrollment aggregator. Embedding extraction
//! happens upstream (an external detector/encoder); persistence and the
//! dedup gate live in the daemon crates.

pub mod aggregate;
pub mod gallery;
pub mod matcher;
pub mod types;

pub use gallery::{Gallery, GalleryError};
pub use matcher::{CosineMatcher, EuclideanMatcher, MatchError, Matcher, SimilarityMetric};
pub use types::{
    BatchResult, BoundingBox, Embedding, EnrolledFace, FaceQuery, MatchResult, RecognitionResult,
};
