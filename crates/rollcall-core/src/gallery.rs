//! In-memory gallery of enrolled identities.
//!
//! One canonical embedding per identity; re-enrollment replaces. The first
//! successful upsert pins the gallery's dimensionality, and every later
//! vector (stored or probe) must agree with it.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{Embedding, EnrolledFace};

#[derive(Error, Debug, PartialEq)]
pub enum GalleryError {
    #[error("embedding has {got} dimensions, gallery is fixed at {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
}

#[derive(Debug, Default)]
pub struct Gallery {
    entries: HashMap<i64, EnrolledFace>,
    /// Pinned by the first successful upsert; never reset, even if the
    /// gallery later drains, so a deployment cannot drift between encoders.
    dim: Option<usize>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensionality of stored embeddings, once the first upsert fixed it.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&EnrolledFace> {
        self.entries.get(&id)
    }

    /// Insert or replace the canonical embedding for `id`.
    pub fn upsert(
        &mut self,
        id: i64,
        name: impl Into<String>,
        embedding: Embedding,
    ) -> Result<(), GalleryError> {
        if embedding.is_empty() {
            return Err(GalleryError::EmptyEmbedding);
        }
        if let Some(expected) = self.dim {
            if embedding.len() != expected {
                return Err(GalleryError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
        } else {
            self.dim = Some(embedding.len());
        }

        self.entries.insert(
            id,
            EnrolledFace {
                id,
                name: name.into(),
                embedding,
            },
        );
        Ok(())
    }

    /// Remove an identity. Idempotent; returns whether an entry existed.
    pub fn remove(&mut self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Iterate all entries. Order is unspecified — callers must not rely
    /// on it for anything beyond a full scan.
    pub fn entries(&self) -> impl Iterator<Item = &EnrolledFace> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_first_upsert_pins_dimension() {
        let mut g = Gallery::new();
        assert_eq!(g.dim(), None);
        g.upsert(1, "a", emb(&[1.0, 0.0, 0.0])).unwrap();
        assert_eq!(g.dim(), Some(3));

        let err = g.upsert(2, "b", emb(&[1.0, 0.0])).unwrap_err();
        assert_eq!(
            err,
            GalleryError::DimensionMismatch {
                expected: 3,
                got: 2
            }
        );
        // Failed upsert must not touch the gallery.
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut g = Gallery::new();
        g.upsert(1, "a", emb(&[1.0, 0.0])).unwrap();
        g.upsert(1, "a2", emb(&[0.0, 1.0])).unwrap();
        assert_eq!(g.len(), 1);
        let face = g.get(1).unwrap();
        assert_eq!(face.name, "a2");
        assert_eq!(face.embedding.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut g = Gallery::new();
        g.upsert(1, "a", emb(&[1.0])).unwrap();
        assert!(g.remove(1));
        assert!(!g.remove(1));
        assert!(g.is_empty());
    }

    #[test]
    fn test_dimension_stays_pinned_after_drain() {
        let mut g = Gallery::new();
        g.upsert(1, "a", emb(&[1.0, 0.0])).unwrap();
        g.remove(1);
        assert_eq!(g.dim(), Some(2));
        assert!(g.upsert(2, "b", emb(&[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn test_empty_embedding_rejected() {
        let mut g = Gallery::new();
        assert_eq!(
            g.upsert(1, "a", emb(&[])).unwrap_err(),
            GalleryError::EmptyEmbedding
        );
        assert_eq!(g.dim(), None);
    }
}
