use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the HTTP/WebSocket server.
    pub bind_addr: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Directory for enrollment photos (served under /photos).
    pub photos_dir: PathBuf,
    /// Maximum accepted match distance; lower = stricter.
    pub tolerance: f32,
    /// Frames are shrunk by this divisor before face location.
    pub downscale_divisor: u32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_store::default_db_path());

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let photos_dir = std::env::var("ROLLCALL_PHOTOS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                db_path
                    .parent()
                    .map(|p| p.join("photos"))
                    .unwrap_or_else(|| PathBuf::from("photos"))
            });

        Self {
            bind_addr: env_parse("ROLLCALL_BIND", SocketAddr::from(([0, 0, 0, 0], 5000))),
            db_path,
            model_dir,
            photos_dir,
            tolerance: env_parse("ROLLCALL_TOLERANCE", rollcall_core::DEFAULT_TOLERANCE),
            downscale_divisor: env_parse(
                "ROLLCALL_DOWNSCALE",
                rollcall_core::DEFAULT_DOWNSCALE_DIVISOR,
            ),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
