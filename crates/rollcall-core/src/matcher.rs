//! Similarity matching of a probe embedding against the gallery.
//!
//! Exactly one metric is active per deployment, chosen at startup. The two
//! metrics produce incomparable scores (cosine lives in [-1, 1], inverse
//! Euclidean in (0, 1]), so thresholds are metric-specific and never shared.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("probe embedding has {got} dimensions, gallery is fixed at {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Which similarity metric a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityMetric {
    /// Dot-product cosine similarity in [-1, 1].
    Cosine,
    /// `1 / (1 + euclidean_distance)` in (0, 1].
    Euclidean,
}

impl SimilarityMetric {
    pub fn matcher(self) -> Box<dyn Matcher + Send + Sync> {
        match self {
            SimilarityMetric::Cosine => Box::new(CosineMatcher),
            SimilarityMetric::Euclidean => Box::new(EuclideanMatcher),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "euclidean" => Ok(SimilarityMetric::Euclidean),
            other => Err(format!(
                "unknown similarity metric {other:?} (expected \"cosine\" or \"euclidean\")"
            )),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
            SimilarityMetric::Euclidean => f.write_str("euclidean"),
        }
    }
}

/// Check the probe against the gallery's pinned dimensionality.
fn check_dim(probe: &Embedding, gallery: &Gallery) -> Result<(), MatchError> {
    match gallery.dim() {
        Some(expected) if probe.len() != expected => Err(MatchError::DimensionMismatch {
            expected,
            got: probe.len(),
        }),
        _ => Ok(()),
    }
}

/// Full scan: score every entry, keep the first maximum encountered.
///
/// Always iterates the whole gallery — no early exit on a passing score.
/// Iteration order is unspecified, so ties between distinct identities are
/// resolved arbitrarily but stably within one snapshot.
fn scan(
    gallery: &Gallery,
    threshold: f32,
    score: impl Fn(&Embedding) -> f32,
) -> MatchResult {
    let mut best_sim = f32::NEG_INFINITY;
    let mut best: Option<(i64, &str)> = None;

    for face in gallery.entries() {
        let sim = score(&face.embedding);
        if sim > best_sim {
            best_sim = sim;
            best = Some((face.id, face.name.as_str()));
        }
    }

    match best {
        Some((id, name)) if best_sim >= threshold => MatchResult {
            recognized: true,
            similarity: best_sim,
            identity: Some(id),
            name: Some(name.to_string()),
        },
        _ => MatchResult::no_match(if best_sim == f32::NEG_INFINITY {
            0.0
        } else {
            best_sim
        }),
    }
}

/// Cosine similarity matcher.
///
/// Enrolled embeddings are stored unit-length by the aggregator; the probe
/// is normalized inside the cosine computation, so the score is a pure dot
/// product of unit vectors.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        check_dim(probe, gallery)?;
        Ok(scan(gallery, threshold, |stored| probe.similarity(stored)))
    }
}

/// Inverse-Euclidean-distance matcher: `1 / (1 + distance)`.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        check_dim(probe, gallery)?;
        Ok(scan(gallery, threshold, |stored| {
            1.0 / (1.0 + probe.euclidean_distance(stored))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn gallery(entries: &[(i64, &str, &[f32])]) -> Gallery {
        let mut g = Gallery::new();
        for (id, name, values) in entries {
            g.upsert(*id, *name, emb(values)).unwrap();
        }
        g
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_scans_whole_gallery() {
        // Best match is the last entry inserted; the scan must reach it.
        let g = gallery(&[
            (1, "decoy1", &[0.0, 1.0, 0.0]),
            (2, "decoy2", &[0.0, 0.0, 1.0]),
            (3, "match", &[1.0, 0.0, 0.0]),
        ]);
        let result = CosineMatcher
            .compare(&emb(&[1.0, 0.0, 0.0]), &g, 0.5)
            .unwrap();
        assert!(result.recognized);
        assert_eq!(result.identity, Some(3));
        assert_eq!(result.name.as_deref(), Some("match"));
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_below_threshold_returns_score_without_identity() {
        let g = gallery(&[(1, "other", &[0.0, 1.0, 0.0])]);
        let result = CosineMatcher
            .compare(&emb(&[1.0, 0.0, 0.0]), &g, 0.5)
            .unwrap();
        assert!(!result.recognized);
        assert_eq!(result.identity, None);
        assert_eq!(result.name, None);
        assert!(result.similarity.abs() < 1e-6);
    }

    #[test]
    fn test_empty_gallery_is_not_an_error() {
        let result = CosineMatcher
            .compare(&emb(&[1.0, 0.0]), &Gallery::new(), 0.5)
            .unwrap();
        assert!(!result.recognized);
        assert_eq!(result.similarity, 0.0);
        assert_eq!(result.identity, None);
    }

    #[test]
    fn test_probe_dimension_mismatch() {
        let g = gallery(&[(1, "a", &[1.0, 0.0, 0.0])]);
        let err = CosineMatcher.compare(&emb(&[1.0, 0.0]), &g, 0.5).unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        );
    }

    #[test]
    fn test_threshold_monotonicity() {
        // Raising the threshold can only flip recognized from true to false.
        let g = gallery(&[(1, "a", &[0.8, 0.6]), (2, "b", &[0.0, 1.0])]);
        let probe = emb(&[1.0, 0.0]);
        let mut prev_recognized = true;
        for threshold in [0.0, 0.2, 0.4, 0.6, 0.79, 0.81, 0.95, 1.0] {
            let r = CosineMatcher.compare(&probe, &g, threshold).unwrap();
            assert!(
                prev_recognized || !r.recognized,
                "recognized flipped false->true at threshold {threshold}"
            );
            prev_recognized = r.recognized;
        }
    }

    #[test]
    fn test_euclidean_exact_match_scores_one() {
        let g = gallery(&[(1, "a", &[0.5, 0.5]), (2, "b", &[-1.0, 0.0])]);
        let result = EuclideanMatcher
            .compare(&emb(&[0.5, 0.5]), &g, 0.6)
            .unwrap();
        assert!(result.recognized);
        assert_eq!(result.identity, Some(1));
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distant_probe_below_threshold() {
        let g = gallery(&[(1, "a", &[0.0, 0.0])]);
        // distance 3 -> similarity 0.25
        let result = EuclideanMatcher.compare(&emb(&[3.0, 0.0]), &g, 0.6).unwrap();
        assert!(!result.recognized);
        assert!((result.similarity - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!(
            "cosine".parse::<SimilarityMetric>().unwrap(),
            SimilarityMetric::Cosine
        );
        assert_eq!(
            "Euclidean".parse::<SimilarityMetric>().unwrap(),
            SimilarityMetric::Euclidean
        );
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
    }
}
