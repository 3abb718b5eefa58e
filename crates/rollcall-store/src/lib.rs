//! rollcall-store — SQLite persistence for the attendance daemon.
//!
//! Two tables: `identities` (one canonical embedding per enrolled identity)
//! and `attendance` (append-only check-in log). The daemon loads the whole
//! gallery into memory at startup and writes through on every mutation; the
//! attendance log is only ever appended to or bulk-cleared.

use chrono::{DateTime, Utc};
use rollcall_core::{Embedding, EnrolledFace};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
}

/// One committed check-in. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub identity_id: i64,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl AttendanceRecord {
    pub fn new(
        identity_id: i64,
        timestamp: DateTime<Utc>,
        confidence: f32,
        location: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity_id,
            timestamp,
            confidence,
            location,
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    embedding   TEXT NOT NULL,
    dim         INTEGER NOT NULL,
    enrolled_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    identity_id INTEGER NOT NULL,
    timestamp   TEXT NOT NULL,
    confidence  REAL NOT NULL,
    location    TEXT
);
CREATE INDEX IF NOT EXISTS idx_attendance_identity ON attendance(identity_id);
";

/// Handle to the daemon's SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        let store = Self { conn };
        store.init().await?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(store)
    }

    /// In-memory database, used by tests and throwaway deployments.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Load every enrolled identity. Rows with an unparseable embedding are
    /// skipped with a warning rather than poisoning startup.
    pub async fn load_gallery(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        let faces = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, embedding FROM identities")?;
                let rows = stmt.query_map([], |row| {
                    let id: i64 = row.get(0)?;
                    let name: String = row.get(1)?;
                    let raw: String = row.get(2)?;
                    Ok((id, name, raw))
                })?;

                let mut faces = Vec::new();
                for row in rows {
                    let (id, name, raw) = row?;
                    match serde_json::from_str::<Vec<f32>>(&raw) {
                        Ok(values) => faces.push(EnrolledFace {
                            id,
                            name,
                            embedding: Embedding::new(values),
                        }),
                        Err(error) => {
                            tracing::warn!(identity = id, %error, "skipping corrupt embedding row");
                        }
                    }
                }
                Ok(faces)
            })
            .await?;
        Ok(faces)
    }

    /// Insert or replace the canonical embedding for an identity.
    pub async fn upsert_identity(&self, face: &EnrolledFace) -> Result<(), StoreError> {
        let id = face.id;
        let name = face.name.clone();
        let dim = face.embedding.len() as i64;
        let embedding =
            serde_json::to_string(&face.embedding.values).unwrap_or_else(|_| "[]".into());
        let enrolled_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities (id, name, embedding, dim, enrolled_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                         name = excluded.name,
                         embedding = excluded.embedding,
                         dim = excluded.dim,
                         enrolled_at = excluded.enrolled_at",
                    rusqlite::params![id, name, embedding, dim, enrolled_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete an identity. Idempotent; returns whether a row existed.
    pub async fn remove_identity(&self, id: i64) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM identities WHERE id = ?1", [id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Append one attendance record.
    pub async fn append_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (id, identity_id, timestamp, confidence, location)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        record.id,
                        record.identity_id,
                        record.timestamp.to_rfc3339(),
                        record.confidence as f64,
                        record.location,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// List attendance records in insertion order, optionally for one identity.
    pub async fn attendance(
        &self,
        identity: Option<i64>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self
            .conn
            .call(move |conn| {
                let (sql, params) = match identity {
                    Some(id) => (
                        "SELECT id, identity_id, timestamp, confidence, location
                         FROM attendance WHERE identity_id = ?1 ORDER BY rowid",
                        vec![id],
                    ),
                    None => (
                        "SELECT id, identity_id, timestamp, confidence, location
                         FROM attendance ORDER BY rowid",
                        vec![],
                    ),
                };
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                    let raw_ts: String = row.get(2)?;
                    let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                2,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?
                        .with_timezone(&Utc);
                    Ok(AttendanceRecord {
                        id: row.get(0)?,
                        identity_id: row.get(1)?,
                        timestamp,
                        confidence: row.get::<_, f64>(3)? as f32,
                        location: row.get(4)?,
                    })
                })?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await?;
        Ok(records)
    }

    /// Delete attendance records (all, or for one identity). Returns how
    /// many rows were cleared. The gallery is untouched.
    pub async fn clear_attendance(&self, identity: Option<i64>) -> Result<usize, StoreError> {
        let cleared = self
            .conn
            .call(move |conn| {
                let n = match identity {
                    Some(id) => {
                        conn.execute("DELETE FROM attendance WHERE identity_id = ?1", [id])?
                    }
                    None => conn.execute("DELETE FROM attendance", [])?,
                };
                Ok(n)
            })
            .await?;
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: i64, name: &str, values: &[f32]) -> EnrolledFace {
        EnrolledFace {
            id,
            name: name.into(),
            embedding: Embedding::new(values.to_vec()),
        }
    }

    #[tokio::test]
    async fn test_identity_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_identity(&face(7, "Alice", &[0.6, 0.8]))
            .await
            .unwrap();

        let gallery = store.load_gallery().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].id, 7);
        assert_eq!(gallery[0].name, "Alice");
        assert_eq!(gallery[0].embedding.values, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_identity(&face(1, "Bob", &[1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert_identity(&face(1, "Bobby", &[0.0, 1.0]))
            .await
            .unwrap();

        let gallery = store.load_gallery().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].name, "Bobby");
        assert_eq!(gallery[0].embedding.values, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_remove_identity_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .upsert_identity(&face(1, "Bob", &[1.0]))
            .await
            .unwrap();
        assert!(store.remove_identity(1).await.unwrap());
        assert!(!store.remove_identity(1).await.unwrap());
        assert!(store.load_gallery().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attendance_append_list_clear() {
        let store = Store::open_in_memory().await.unwrap();
        let t = Utc::now();
        store
            .append_attendance(&AttendanceRecord::new(7, t, 0.91, Some("Webcam".into())))
            .await
            .unwrap();
        store
            .append_attendance(&AttendanceRecord::new(8, t, 0.77, None))
            .await
            .unwrap();
        store
            .append_attendance(&AttendanceRecord::new(7, t, 0.88, None))
            .await
            .unwrap();

        let all = store.attendance(None).await.unwrap();
        assert_eq!(all.len(), 3);
        // Insertion order preserved.
        assert_eq!(all[0].identity_id, 7);
        assert_eq!(all[1].identity_id, 8);
        assert_eq!(all[2].identity_id, 7);
        assert_eq!(all[0].location.as_deref(), Some("Webcam"));

        let alice = store.attendance(Some(7)).await.unwrap();
        assert_eq!(alice.len(), 2);

        assert_eq!(store.clear_attendance(Some(7)).await.unwrap(), 2);
        assert_eq!(store.attendance(None).await.unwrap().len(), 1);
        assert_eq!(store.clear_attendance(None).await.unwrap(), 1);
        assert!(store.attendance(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let t = Utc::now();
        store
            .append_attendance(&AttendanceRecord::new(1, t, 0.5, None))
            .await
            .unwrap();
        let records = store.attendance(None).await.unwrap();
        // RFC 3339 text column keeps sub-second precision.
        assert_eq!(records[0].timestamp, t);
    }
}
