use std::path::PathBuf;

use rollcall_core::SimilarityMetric;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Similarity metric for this deployment. Thresholds are metric-specific;
    /// never reuse a cosine threshold under the Euclidean metric.
    pub metric: SimilarityMetric,
    /// Similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Minimum seconds between two committed attendance records per identity.
    pub cooldown_secs: u64,
    /// Location label stamped on records when the caller supplies none.
    pub default_location: String,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let metric = match std::env::var("ROLLCALL_SIMILARITY_METRIC") {
            Ok(raw) => raw.parse().unwrap_or_else(|error: String| {
                tracing::warn!(%error, "falling back to cosine metric");
                SimilarityMetric::Cosine
            }),
            Err(_) => SimilarityMetric::Cosine,
        };

        Self {
            db_path,
            metric,
            similarity_threshold: env_f32("ROLLCALL_SIMILARITY_THRESHOLD", 0.6),
            cooldown_secs: env_u64("ROLLCALL_COOLDOWN_SECS", 300),
            default_location: std::env::var("ROLLCALL_LOCATION")
                .unwrap_or_else(|_| "Webcam".to_string()),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
