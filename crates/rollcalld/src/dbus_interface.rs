use zbus::interface;

use rollcall_core::{Embedding, FaceQuery};

use crate::engine::{Engine, EngineError};

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Structured payloads (embeddings, queries, results) travel as JSON
/// strings; scalar arguments stay native D-Bus types. An `identity`
/// argument of -1 means "all identities" where a filter is optional.
pub struct AttendanceService {
    engine: Engine,
    default_location: String,
}

impl AttendanceService {
    pub fn new(engine: Engine, default_location: String) -> Self {
        Self {
            engine,
            default_location,
        }
    }

    fn location(&self, raw: &str) -> String {
        if raw.is_empty() {
            self.default_location.clone()
        } else {
            raw.to_string()
        }
    }
}

fn engine_err(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Aggregate(_) | EngineError::Gallery(_) | EngineError::Match(_) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        EngineError::Store(_) => zbus::fdo::Error::Failed(err.to_string()),
    }
}

fn bad_json(what: &str, err: serde_json::Error) -> zbus::fdo::Error {
    zbus::fdo::Error::InvalidArgs(format!("malformed {what}: {err}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("serialize response: {e}")))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Enroll an identity from sample embeddings (JSON: array of float arrays).
    async fn register(
        &self,
        identity: i64,
        name: &str,
        embeddings_json: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity, name, "register requested");
        let samples: Vec<Embedding> =
            serde_json::from_str(embeddings_json).map_err(|e| bad_json("embeddings", e))?;
        self.engine
            .register(identity, name, &samples)
            .await
            .map_err(engine_err)?;
        to_json(&serde_json::json!({
            "identity": identity,
            "name": name,
            "samples": samples.len(),
        }))
    }

    /// Recognize a single face embedding (JSON: float array) and mark
    /// attendance if it passes the threshold and the cooldown.
    async fn recognize(&self, embedding_json: &str, location: &str) -> zbus::fdo::Result<String> {
        let embedding: Embedding =
            serde_json::from_str(embedding_json).map_err(|e| bad_json("embedding", e))?;
        let result = self
            .engine
            .recognize(embedding, None, Some(self.location(location)))
            .await
            .map_err(engine_err)?;
        to_json(&result)
    }

    /// Recognize every face from one image (JSON: array of
    /// `{"embedding": [...]|null, "bbox": {...}?}` queries).
    async fn recognize_batch(
        &self,
        queries_json: &str,
        location: &str,
    ) -> zbus::fdo::Result<String> {
        let queries: Vec<FaceQuery> =
            serde_json::from_str(queries_json).map_err(|e| bad_json("queries", e))?;
        let batch = self
            .engine
            .recognize_batch(queries, Some(self.location(location)))
            .await
            .map_err(engine_err)?;
        to_json(&batch)
    }

    /// Remove an enrolled identity and its cooldown state.
    async fn remove_identity(&self, identity: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(identity, "remove requested");
        self.engine.remove(identity).await.map_err(engine_err)
    }

    /// List enrolled identities (JSON array of {id, name}).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.identities().await)
    }

    /// Attendance log, for one identity or all (-1).
    async fn attendance(&self, identity: i64) -> zbus::fdo::Result<String> {
        let filter = (identity >= 0).then_some(identity);
        let records = self.engine.attendance(filter).await.map_err(engine_err)?;
        to_json(&records)
    }

    /// Clear attendance records for one identity or all (-1). Returns the
    /// number of records cleared.
    async fn clear_attendance(&self, identity: i64) -> zbus::fdo::Result<u32> {
        let filter = (identity >= 0).then_some(identity);
        let cleared = self
            .engine
            .clear_attendance(filter)
            .await
            .map_err(engine_err)?;
        Ok(cleared as u32)
    }

    /// Daemon status blob.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "metric": self.engine.metric().to_string(),
            "threshold": self.engine.threshold(),
            "enrolled": self.engine.enrolled_count().await,
        }))
    }
}
