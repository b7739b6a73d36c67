//! V4L2 webcam capture via the `v4l` crate.
//!
//! Frames come out of the camera as YUYV or GREY and are converted to RGB8
//! before they leave this module. Dark frames (covered lens, auto-exposure
//! warm-up) are flagged so callers can skip them.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const DARK_THRESHOLD_PCT: f32 = 0.95;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("camera busy: {0}")]
    Busy(String),
    #[error("device does not support video capture")]
    NotACaptureDevice,
    #[error("unusable pixel format {fourcc} (need YUYV or GREY)")]
    UnsupportedFormat { fourcc: String },
    #[error("v4l2: {0}")]
    Device(String),
    #[error(transparent)]
    Frame(#[from] frame::FrameError),
}

fn device_err(e: std::io::Error) -> CameraError {
    CameraError::Device(e.to_string())
}

/// A discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    /// YUYV 4:2:2, converted to RGB with chroma.
    Yuyv,
    /// 8-bit grayscale, replicated into RGB.
    Grey,
}

/// An open webcam producing RGB8 frames.
pub struct Camera {
    device: Device,
    format: SourceFormat,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
}

impl Camera {
    /// Open a V4L2 device by path (e.g., "/dev/video0") and negotiate a
    /// capture format. YUYV at 640x480 is requested; GREY is accepted when
    /// that is what the driver offers.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::Busy(device_path.to_string())
            } else {
                CameraError::NotFound(format!("{device_path}: {msg}"))
            }
        })?;

        let caps = device.query_caps().map_err(device_err)?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice);
        }

        let mut wanted = device.format().map_err(device_err)?;
        wanted.fourcc = FourCC::new(b"YUYV");
        wanted.width = REQUESTED_WIDTH;
        wanted.height = REQUESTED_HEIGHT;
        let got = device.set_format(&wanted).map_err(device_err)?;

        let format = match &got.fourcc.repr {
            b"YUYV" => SourceFormat::Yuyv,
            b"GREY" => SourceFormat::Grey,
            other => {
                return Err(CameraError::UnsupportedFormat {
                    fourcc: String::from_utf8_lossy(other).into_owned(),
                })
            }
        };

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = got.width,
            height = got.height,
            fourcc = %got.fourcc,
            "camera ready"
        );

        Ok(Self {
            device,
            format,
            width: got.width,
            height: got.height,
            device_path: device_path.to_string(),
        })
    }

    /// Capture one frame. The frame may be dark; callers that care check
    /// `Frame::is_dark` or use [`Camera::capture_clear_frames`].
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(device_err)?;
        self.next_frame(&mut stream)
    }

    /// Capture up to `count` non-dark frames, trying at most three raw
    /// captures per wanted frame. Fewer frames (possibly zero) are returned
    /// when the feed stays dark for the whole attempt budget.
    pub fn capture_clear_frames(&self, count: usize) -> Result<Vec<Frame>, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(device_err)?;

        let mut frames = Vec::with_capacity(count);
        let mut skipped = 0usize;

        for _ in 0..count * 3 {
            if frames.len() == count {
                break;
            }
            let frame = self.next_frame(&mut stream)?;
            if frame.is_dark {
                skipped += 1;
                continue;
            }
            frames.push(frame);
        }

        if skipped > 0 {
            tracing::debug!(skipped, captured = frames.len(), "dark frames discarded");
        }
        Ok(frames)
    }

    fn next_frame(&self, stream: &mut MmapStream) -> Result<Frame, CameraError> {
        let (buf, meta) = stream.next().map_err(device_err)?;

        let rgb = match self.format {
            SourceFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)?,
            SourceFormat::Grey => frame::gray_to_rgb(buf, self.width, self.height)?,
        };
        let is_dark = frame::is_dark_rgb(&rgb, DARK_THRESHOLD_PCT);

        Ok(Frame {
            rgb,
            width: self.width,
            height: self.height,
            sequence: meta.sequence,
            is_dark,
        })
    }

    /// Enumerate V4L2 capture devices by scanning `/dev` for video nodes.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };

        let mut paths: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with("video") && n[5..].chars().all(|c| c.is_ascii_digit()))
            .map(|n| format!("/dev/{n}"))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card.clone(),
                        driver: caps.driver.clone(),
                    })
            })
            .collect()
    }
}
