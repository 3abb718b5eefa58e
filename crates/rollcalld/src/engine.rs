//! The attendance engine: one context object owning the in-memory gallery,
//! the last-seen table, and the store handle.
//!
//! Constructed once per process and cloned into request handlers. All
//! decision logic (matching, aggregation) lives in rollcall-core; this
//! module adds the dedup gate and the batch orchestrator on top, plus
//! write-through persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use rollcall_core::aggregate::{self, AggregateError};
use rollcall_core::{
    BatchResult, BoundingBox, Embedding, EnrolledFace, FaceQuery, Gallery, GalleryError,
    MatchError, Matcher, RecognitionResult, SimilarityMetric,
};
use rollcall_store::{AttendanceRecord, Store, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("enrollment rejected: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("enrollment rejected: {0}")]
    Gallery(#[from] GalleryError),
    #[error("recognition rejected: {0}")]
    Match(#[from] MatchError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of the dedup gate for one recognized identity.
#[derive(Debug)]
pub enum MarkOutcome {
    /// A record was appended and last-seen advanced.
    Marked(AttendanceRecord),
    /// Within the cooldown window; nothing was written.
    Suppressed { last_seen: DateTime<Utc> },
}

/// Enrolled identity without its embedding, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub id: i64,
    pub name: String,
}

struct Inner {
    gallery: RwLock<Gallery>,
    /// Identity -> timestamp of the last *committed* record. Guarded by one
    /// coarse mutex so the gate's check-then-act is atomic: two simultaneous
    /// recognitions of one person must not both commit.
    last_seen: Mutex<HashMap<i64, DateTime<Utc>>>,
    store: Store,
    matcher: Box<dyn Matcher + Send + Sync>,
    metric: SimilarityMetric,
    threshold: f32,
    cooldown: Duration,
}

/// Clone-cheap handle to the engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Build the engine, loading the persisted gallery into memory.
    pub async fn new(
        store: Store,
        metric: SimilarityMetric,
        threshold: f32,
        cooldown_secs: u64,
    ) -> Result<Self, EngineError> {
        let mut gallery = Gallery::new();
        for face in store.load_gallery().await? {
            let id = face.id;
            if let Err(error) = gallery.upsert(face.id, face.name, face.embedding) {
                tracing::warn!(identity = id, %error, "skipping persisted identity");
            }
        }
        tracing::info!(
            enrolled = gallery.len(),
            metric = %metric,
            threshold,
            cooldown_secs,
            "gallery loaded"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                gallery: RwLock::new(gallery),
                last_seen: Mutex::new(HashMap::new()),
                store,
                matcher: metric.matcher(),
                metric,
                threshold,
                cooldown: Duration::seconds(cooldown_secs as i64),
            }),
        })
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.inner.metric
    }

    pub fn threshold(&self) -> f32 {
        self.inner.threshold
    }

    pub async fn enrolled_count(&self) -> usize {
        self.inner.gallery.read().await.len()
    }

    /// Enroll (or re-enroll) an identity from sample embeddings.
    ///
    /// Aggregation and dimensionality checks run before anything is written;
    /// a rejected registration leaves both the store and the gallery as they
    /// were.
    pub async fn register(
        &self,
        id: i64,
        name: &str,
        samples: &[Embedding],
    ) -> Result<(), EngineError> {
        let canonical = aggregate::aggregate(samples)?;

        let mut gallery = self.inner.gallery.write().await;
        if let Some(expected) = gallery.dim() {
            if canonical.len() != expected {
                return Err(GalleryError::DimensionMismatch {
                    expected,
                    got: canonical.len(),
                }
                .into());
            }
        }

        let face = EnrolledFace {
            id,
            name: name.to_string(),
            embedding: canonical,
        };
        self.inner.store.upsert_identity(&face).await?;
        gallery.upsert(face.id, face.name, face.embedding)?;

        tracing::info!(identity = id, name, samples = samples.len(), "identity enrolled");
        Ok(())
    }

    /// Remove an identity everywhere: store, gallery, and last-seen table.
    /// Idempotent; returns whether anything was removed.
    pub async fn remove(&self, id: i64) -> Result<bool, EngineError> {
        let mut gallery = self.inner.gallery.write().await;
        let in_store = self.inner.store.remove_identity(id).await?;
        let in_memory = gallery.remove(id);
        self.inner.last_seen.lock().await.remove(&id);

        let removed = in_store || in_memory;
        if removed {
            tracing::info!(identity = id, "identity removed");
        }
        Ok(removed)
    }

    /// Recognize a single face and, on a positive match, run the dedup gate.
    ///
    /// The returned result is the same whether attendance was committed or
    /// suppressed — the caller always gets identity and confidence for
    /// display.
    pub async fn recognize(
        &self,
        embedding: Embedding,
        bbox: Option<BoundingBox>,
        location: Option<String>,
    ) -> Result<RecognitionResult, EngineError> {
        let result = {
            let gallery = self.inner.gallery.read().await;
            self.inner
                .matcher
                .compare(&embedding, &gallery, self.inner.threshold)?
        };

        if let (true, Some(id)) = (result.recognized, result.identity) {
            match self
                .try_mark(id, Utc::now(), result.similarity, location)
                .await?
            {
                MarkOutcome::Marked(record) => {
                    tracing::info!(
                        identity = id,
                        similarity = result.similarity,
                        record = %record.id,
                        "attendance marked"
                    );
                }
                MarkOutcome::Suppressed { last_seen } => {
                    tracing::debug!(
                        identity = id,
                        %last_seen,
                        "attendance suppressed within cooldown"
                    );
                }
            }
        }

        Ok(RecognitionResult::from_match(result, bbox))
    }

    /// The dedup gate. Commits a record iff the identity has no last-seen
    /// entry or the cooldown has elapsed since it.
    ///
    /// The whole read-compare-append-update sequence holds the last-seen
    /// lock, and last-seen only advances after the append succeeded.
    pub async fn try_mark(
        &self,
        identity: i64,
        now: DateTime<Utc>,
        confidence: f32,
        location: Option<String>,
    ) -> Result<MarkOutcome, EngineError> {
        let mut last_seen = self.inner.last_seen.lock().await;

        if let Some(&last) = last_seen.get(&identity) {
            if now - last < self.inner.cooldown {
                return Ok(MarkOutcome::Suppressed { last_seen: last });
            }
        }

        let record = AttendanceRecord::new(identity, now, confidence, location);
        self.inner.store.append_attendance(&record).await?;
        last_seen.insert(identity, now);
        Ok(MarkOutcome::Marked(record))
    }

    /// Recognize every face found in one image.
    ///
    /// Results keep input order (results[i] belongs to queries[i]) so the
    /// caller can correlate bounding boxes. A face whose embedding failed
    /// upstream, or whose embedding is malformed, becomes a zero-confidence
    /// entry; only store failures abort the batch.
    pub async fn recognize_batch(
        &self,
        queries: Vec<FaceQuery>,
        location: Option<String>,
    ) -> Result<BatchResult, EngineError> {
        let start = Instant::now();
        let total_faces = queries.len();
        let mut results = Vec::with_capacity(total_faces);
        let mut recognized_count = 0;

        for (index, query) in queries.into_iter().enumerate() {
            let entry = match query.embedding {
                None => RecognitionResult::unrecognized(query.bbox),
                Some(embedding) => {
                    match self.recognize(embedding, query.bbox, location.clone()).await {
                        Ok(result) => result,
                        Err(EngineError::Match(error)) => {
                            tracing::warn!(face = index, %error, "skipping malformed face embedding");
                            RecognitionResult::unrecognized(query.bbox)
                        }
                        Err(other) => return Err(other),
                    }
                }
            };
            if entry.recognized {
                recognized_count += 1;
            }
            results.push(entry);
        }

        Ok(BatchResult {
            results,
            total_faces,
            recognized_count,
            processing_time: start.elapsed().as_secs_f64(),
        })
    }

    /// List enrolled identities, sorted by id for stable display.
    pub async fn identities(&self) -> Vec<IdentitySummary> {
        let gallery = self.inner.gallery.read().await;
        let mut out: Vec<IdentitySummary> = gallery
            .entries()
            .map(|face| IdentitySummary {
                id: face.id,
                name: face.name.clone(),
            })
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    /// Attendance log, optionally filtered to one identity.
    pub async fn attendance(
        &self,
        identity: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        Ok(self.inner.store.attendance(identity).await?)
    }

    /// Clear the attendance log (all, or one identity). Leaves the gallery
    /// and the last-seen table untouched, so the cooldown still applies.
    pub async fn clear_attendance(&self, identity: Option<i64>) -> Result<usize, EngineError> {
        let cleared = self.inner.store.clear_attendance(identity).await?;
        tracing::info!(?identity, cleared, "attendance cleared");
        Ok(cleared)
    }
}
