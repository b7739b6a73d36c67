//! facecheck-core: face detection and descriptor engine.
//!
//! Uses SCRFD for face detection and ArcFace for descriptor extraction,
//! both running via ONNX Runtime for CPU inference. Images are interleaved
//! RGB8 buffers throughout.

pub mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use pipeline::{FacePipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use types::{Descriptor, FaceBox, FaceRecord, MatchOutcome, Matcher, NearestMatcher};
pub use types::DEFAULT_TOLERANCE;
