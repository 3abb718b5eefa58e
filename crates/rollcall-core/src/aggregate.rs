//! Enrollment aggregation: reduce several sample embeddings of one person
//! to a single canonical embedding.
//!
//! The caller must already have filtered out samples from images with zero
//! or multiple detected faces; this module only sees clean candidates.

use thiserror::Error;

use crate::types::Embedding;

/// Minimum sample embeddings required to enroll.
///
/// A policy floor, not a mathematical one: averaging several photos damps
/// per-photo lighting and pose noise in the canonical embedding.
pub const MIN_SAMPLES: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    #[error("enrollment requires at least {MIN_SAMPLES} sample embeddings, got {0}")]
    InsufficientSamples(usize),
    #[error("sample embeddings disagree in length: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("aggregate embedding has zero norm and cannot be normalized")]
    DegenerateEmbedding,
}

/// Element-wise mean of the candidates, L2-normalized to unit length.
///
/// Unit-length output makes the cosine matcher's score a pure dot product.
/// Deterministic: identical input always yields bit-identical output.
pub fn aggregate(candidates: &[Embedding]) -> Result<Embedding, AggregateError> {
    if candidates.len() < MIN_SAMPLES {
        return Err(AggregateError::InsufficientSamples(candidates.len()));
    }

    let dim = candidates[0].len();
    for candidate in &candidates[1..] {
        if candidate.len() != dim {
            return Err(AggregateError::DimensionMismatch {
                expected: dim,
                got: candidate.len(),
            });
        }
    }

    let mut mean = vec![0.0f32; dim];
    for candidate in candidates {
        for (acc, v) in mean.iter_mut().zip(candidate.values.iter()) {
            *acc += v;
        }
    }
    let n = candidates.len() as f32;
    for acc in &mut mean {
        *acc /= n;
    }

    Embedding::new(mean)
        .l2_normalized()
        .ok_or(AggregateError::DegenerateEmbedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_too_few_samples() {
        let samples = vec![emb(&[1.0, 0.0]), emb(&[1.0, 0.0])];
        assert_eq!(
            aggregate(&samples).unwrap_err(),
            AggregateError::InsufficientSamples(2)
        );
    }

    #[test]
    fn test_mismatched_sample_lengths() {
        let samples = vec![emb(&[1.0, 0.0]), emb(&[0.0, 1.0]), emb(&[1.0])];
        assert_eq!(
            aggregate(&samples).unwrap_err(),
            AggregateError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_mean_then_normalize() {
        let samples = vec![emb(&[2.0, 0.0]), emb(&[0.0, 2.0]), emb(&[2.0, 2.0])];
        // mean = [4/3, 4/3], normalized = [1/sqrt2, 1/sqrt2]
        let result = aggregate(&samples).unwrap();
        let inv_sqrt2 = 1.0 / 2.0f32.sqrt();
        assert!((result.values[0] - inv_sqrt2).abs() < 1e-6);
        assert!((result.values[1] - inv_sqrt2).abs() < 1e-6);
        assert!((result.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let samples = vec![
            emb(&[0.3, -0.2, 0.9]),
            emb(&[0.31, -0.19, 0.88]),
            emb(&[0.29, -0.21, 0.91]),
        ];
        let a = aggregate(&samples).unwrap();
        let b = aggregate(&samples).unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn test_scale_invariance() {
        // Scaling every candidate by one positive constant must not change
        // the normalized aggregate.
        let samples = vec![
            emb(&[0.5, 0.1, -0.3]),
            emb(&[0.4, 0.2, -0.25]),
            emb(&[0.45, 0.15, -0.35]),
        ];
        let scaled: Vec<Embedding> = samples
            .iter()
            .map(|e| Embedding::new(e.values.iter().map(|v| v * 7.5).collect()))
            .collect();

        let a = aggregate(&samples).unwrap();
        let b = aggregate(&scaled).unwrap();
        for (x, y) in a.values.iter().zip(b.values.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_norm_aggregate() {
        let samples = vec![
            emb(&[1.0, 0.0]),
            emb(&[-1.0, 0.0]),
            emb(&[0.0, 0.0]),
        ];
        // Third sample with zero mean: mean is exactly [0, 0].
        assert_eq!(
            aggregate(&samples).unwrap_err(),
            AggregateError::DegenerateEmbedding
        );
    }
}
