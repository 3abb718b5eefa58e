use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in pixel coordinates.
///
/// Produced by the upstream detector; carried through recognition untouched
/// so the caller can correlate results with on-screen highlights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Face embedding vector (128- or 512-dimensional depending on the encoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn dot(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Always processes
    /// all dimensions; zero-norm inputs yield 0.0 rather than NaN.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Return a unit-length copy, or `None` if the norm is zero.
    pub fn l2_normalized(&self) -> Option<Embedding> {
        let norm = self.norm();
        if norm > 0.0 {
            Some(Embedding::new(
                self.values.iter().map(|x| x / norm).collect(),
            ))
        } else {
            None
        }
    }
}

/// An enrolled identity with its canonical embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub id: i64,
    pub name: String,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the gallery.
///
/// `recognized` is true iff the best similarity passed the threshold AND
/// the gallery held at least one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub recognized: bool,
    /// Best similarity found, metric-specific (0.0 for an empty gallery).
    pub similarity: f32,
    pub identity: Option<i64>,
    pub name: Option<String>,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self {
            recognized: false,
            similarity,
            identity: None,
            name: None,
        }
    }
}

/// One face from an image, as reported by the upstream detector.
///
/// `embedding` is `None` when extraction failed for that face; the batch
/// orchestrator turns such entries into zero-confidence non-matches rather
/// than aborting the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceQuery {
    #[serde(default)]
    pub embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Per-face recognition result handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub confidence: f32,
    pub recognized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl RecognitionResult {
    pub fn from_match(result: MatchResult, bbox: Option<BoundingBox>) -> Self {
        Self {
            identity: result.identity,
            name: result.name,
            confidence: result.similarity,
            recognized: result.recognized,
            bbox,
        }
    }

    /// Entry for a face whose embedding extraction failed upstream.
    pub fn unrecognized(bbox: Option<BoundingBox>) -> Self {
        Self {
            identity: None,
            name: None,
            confidence: 0.0,
            recognized: false,
            bbox,
        }
    }
}

/// Aggregated outcome of recognizing every face in one image.
///
/// `results[i]` corresponds to the i-th input query; `recognized_count`
/// counts positive matches whether or not attendance was actually committed
/// (the dedup gate may have suppressed the write).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<RecognitionResult>,
    pub total_faces: usize,
    pub recognized_count: usize,
    /// Wall-clock processing time in seconds.
    pub processing_time: f64,
}
