//! facecheck-hw: V4L2 webcam capture for the console front-end.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::Frame;
