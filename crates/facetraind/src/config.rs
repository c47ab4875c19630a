use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// WebSocket listen address (default: 0.0.0.0:9000).
    pub listen_addr: String,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// JSON file of unidentified embeddings used for class balancing.
    pub pool_path: PathBuf,
    /// Embedding dimension shared by the recognizer, pool and every session.
    pub embedding_dim: usize,
    /// Minimum detector score for a face to be kept.
    pub detect_threshold: f32,
    /// Depth of each session's inbound and outbound message queues.
    pub session_queue: usize,
}

impl Config {
    /// Load configuration from `FACETRAIN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facetrain");

        let model_dir = std::env::var("FACETRAIN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let pool_path = std::env::var("FACETRAIN_UNKNOWN_POOL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("unknown_pool.json"));

        Self {
            listen_addr: std::env::var("FACETRAIN_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string()),
            model_dir,
            pool_path,
            embedding_dim: env_usize("FACETRAIN_EMBEDDING_DIM", 512),
            detect_threshold: env_f32(
                "FACETRAIN_DETECT_THRESHOLD",
                facetrain_vision::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            session_queue: env_usize("FACETRAIN_SESSION_QUEUE", 8).max(1),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
