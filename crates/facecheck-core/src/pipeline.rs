//! Shared registration and check-in flows over the detector + recognizer.
//!
//! Registration requires exactly one detected face; check-in uses the first
//! face the detector returns (confidence-sorted). The asymmetry is
//! deliberate: registration wants unambiguous identity, check-in tolerates
//! crowd photos.

use crate::detector::{DetectError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Descriptor, FaceBox};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("multiple faces detected ({0}); submit an image with exactly one face")]
    MultipleFaces(usize),
    #[error("detector error: {0}")]
    Detect(#[from] DetectError),
    #[error("recognizer error: {0}")]
    Recognize(#[from] RecognizerError),
}

/// Detector + recognizer pair implementing the two descriptor flows.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    /// Load both ONNX models. Fails fast when either file is missing.
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self { detector, recognizer })
    }

    /// Registration flow: detect, enforce the single-face policy, extract.
    pub fn enroll(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Descriptor, PipelineError> {
        let faces = self.detector.detect(rgb, width, height)?;
        let face = require_single_face(&faces)?.clone();
        tracing::debug!(confidence = face.confidence, "enroll: face accepted");
        Ok(self.recognizer.extract(rgb, width, height, &face)?)
    }

    /// Check-in flow: detect, use the first (most confident) face, extract.
    pub fn probe(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Descriptor, PipelineError> {
        let faces = self.detector.detect(rgb, width, height)?;
        let face = primary_face(&faces)?.clone();
        tracing::debug!(
            detected = faces.len(),
            confidence = face.confidence,
            "probe: using primary face"
        );
        Ok(self.recognizer.extract(rgb, width, height, &face)?)
    }

    /// Raw detections, for live-overlay front-ends.
    pub fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>, PipelineError> {
        Ok(self.detector.detect(rgb, width, height)?)
    }

    /// Extract a descriptor for an already-detected face.
    pub fn descriptor_for(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &FaceBox,
    ) -> Result<Descriptor, PipelineError> {
        Ok(self.recognizer.extract(rgb, width, height, face)?)
    }
}

/// Registration policy: exactly one face, otherwise the image is rejected.
pub fn require_single_face(faces: &[FaceBox]) -> Result<&FaceBox, PipelineError> {
    match faces {
        [] => Err(PipelineError::NoFaceDetected),
        [one] => Ok(one),
        many => Err(PipelineError::MultipleFaces(many.len())),
    }
}

/// Check-in policy: first detected face; extra faces are ignored.
pub fn primary_face(faces: &[FaceBox]) -> Result<&FaceBox, PipelineError> {
    faces.first().ok_or(PipelineError::NoFaceDetected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(conf: f32) -> FaceBox {
        FaceBox {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_single_face_policy_rejects_empty() {
        assert!(matches!(
            require_single_face(&[]),
            Err(PipelineError::NoFaceDetected)
        ));
    }

    #[test]
    fn test_single_face_policy_accepts_one() {
        let faces = [face(0.9)];
        let accepted = require_single_face(&faces).unwrap();
        assert!((accepted.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_single_face_policy_rejects_group_photo() {
        let faces = [face(0.9), face(0.8), face(0.7)];
        assert!(matches!(
            require_single_face(&faces),
            Err(PipelineError::MultipleFaces(3))
        ));
    }

    #[test]
    fn test_primary_face_takes_first() {
        let faces = [face(0.9), face(0.8)];
        let primary = primary_face(&faces).unwrap();
        assert!((primary.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_primary_face_rejects_empty() {
        assert!(matches!(primary_face(&[]), Err(PipelineError::NoFaceDetected)));
    }
}
