//! Server configuration, loaded from `FACECHECK_*` environment variables.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Root directory of the record store.
    pub data_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum descriptor distance for a positive check-in match.
    pub tolerance: f32,
    /// Maximum accepted request body size (multipart uploads).
    pub max_body_bytes: usize,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("FACECHECK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("FACECHECK_PORT", 5000),
            data_dir: std::env::var("FACECHECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("face-models")),
            model_dir: std::env::var("FACECHECK_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            tolerance: env_parse("FACECHECK_TOLERANCE", facecheck_core::DEFAULT_TOLERANCE),
            max_body_bytes: env_parse("FACECHECK_MAX_BODY_BYTES", 10 * 1024 * 1024),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
