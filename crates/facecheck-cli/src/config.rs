//! CLI configuration, loaded from `FACECHECK_*` environment variables.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Root directory of the record store.
    pub data_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device used when no photo file is given.
    pub camera_device: String,
    /// Maximum descriptor distance for a positive match.
    pub tolerance: f32,
}

impl CliConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("FACECHECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("face-models")),
            model_dir: std::env::var("FACECHECK_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            camera_device: std::env::var("FACECHECK_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            tolerance: std::env::var("FACECHECK_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(facecheck_core::DEFAULT_TOLERANCE),
        }
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    pub fn recognizer_model_path(&self) -> String {
        self.model_dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
    }
}
