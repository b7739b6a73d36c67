//! Subcommand implementations.
//!
//! Photos come from a file when `--photo` is given, otherwise from the
//! configured webcam. Webcam flows try a handful of non-dark frames so a
//! single blink or auto-exposure hiccup does not fail the whole command.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use facecheck_core::{FacePipeline, FaceRecord, Matcher, NearestMatcher, PipelineError};
use facecheck_hw::{Camera, Frame};
use facecheck_store::RecordStore;
use std::path::Path;

use crate::config::CliConfig;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Frames to attempt when enrolling or probing from the webcam.
const CAPTURE_ATTEMPTS: usize = 3;

/// An RGB8 image plus the bytes to persist alongside the descriptor.
struct Photo {
    rgb: Vec<u8>,
    width: u32,
    height: u32,
    encoded: Vec<u8>,
}

pub fn register(config: &CliConfig, name: &str, photo: Option<&Path>) -> Result<()> {
    if name.trim().is_empty() {
        bail!("name must not be empty");
    }

    let mut pipeline = load_pipeline(config)?;
    let store = RecordStore::open(&config.data_dir)?;

    let descriptor;
    let photo = match photo {
        Some(path) => {
            let photo = load_photo(path)?;
            descriptor = pipeline
                .enroll(&photo.rgb, photo.width, photo.height)
                .context("registration failed")?;
            photo
        }
        None => {
            let (photo, desc) = capture_and_extract(config, &mut pipeline, |p, photo| {
                p.enroll(&photo.rgb, photo.width, photo.height)
            })?;
            descriptor = desc;
            photo
        }
    };

    let id = store.create(name, descriptor, &photo.encoded)?;
    println!("Registered {name} as {id}");
    Ok(())
}

pub fn checkin(config: &CliConfig, photo: Option<&Path>) -> Result<()> {
    let store = RecordStore::open(&config.data_dir)?;
    let records = store.list()?;
    if records.is_empty() {
        bail!("no users registered");
    }

    let mut pipeline = load_pipeline(config)?;

    let descriptor = match photo {
        Some(path) => {
            let photo = load_photo(path)?;
            pipeline
                .probe(&photo.rgb, photo.width, photo.height)
                .context("check-in failed")?
        }
        None => {
            let (_, desc) = capture_and_extract(config, &mut pipeline, |p, photo| {
                p.probe(&photo.rgb, photo.width, photo.height)
            })?;
            desc
        }
    };

    let outcome = NearestMatcher.compare(&descriptor, &records, config.tolerance);
    if outcome.matched {
        println!(
            "{GREEN}Welcome, {}!{RESET} (confidence {:.2}%)",
            outcome.name.as_deref().unwrap_or("?"),
            outcome.confidence()
        );
    } else {
        println!("{RED}Face not recognized{RESET} (nearest distance {:.3})", outcome.distance);
    }
    Ok(())
}

pub fn list(config: &CliConfig) -> Result<()> {
    let store = RecordStore::open(&config.data_dir)?;
    let records = store.list()?;
    if records.is_empty() {
        println!("No users registered");
        return Ok(());
    }

    println!("{:<30} {:<20} {}", "ID", "NAME", "REGISTERED");
    for record in &records {
        println!("{:<30} {:<20} {}", record.id, record.name, record.registered_at);
    }
    Ok(())
}

pub fn remove(config: &CliConfig, id: &str) -> Result<()> {
    let store = RecordStore::open(&config.data_dir)?;
    if store.delete(id)? {
        println!("Removed {id}");
        Ok(())
    } else {
        bail!("no record with id {id}");
    }
}

/// Live loop: capture continuously, run detection and matching on every other
/// frame, print one colour-coded line per detected face. Ctrl-C stops it.
pub fn watch(config: &CliConfig, stop: Arc<AtomicBool>) -> Result<()> {
    let mut pipeline = load_pipeline(config)?;
    let store = RecordStore::open(&config.data_dir)?;
    let records = store.list()?;
    let camera = Camera::open(&config.camera_device)?;

    println!(
        "Watching {} ({} registered user{}), Ctrl-C to stop",
        config.camera_device,
        records.len(),
        if records.len() == 1 { "" } else { "s" }
    );

    let mut frame_index = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let frame = camera.capture_frame()?;
        frame_index += 1;

        // Detection every other frame keeps the loop responsive on CPU.
        if frame_index % 2 != 0 {
            continue;
        }
        if frame.is_dark {
            continue;
        }

        report_frame(&mut pipeline, &records, config.tolerance, &frame)?;
    }

    println!("Stopped");
    Ok(())
}

pub fn devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return Ok(());
    }
    for dev in devices {
        println!("{:<14} {} ({})", dev.path, dev.name, dev.driver);
    }
    Ok(())
}

fn report_frame(
    pipeline: &mut FacePipeline,
    records: &[FaceRecord],
    tolerance: f32,
    frame: &Frame,
) -> Result<()> {
    let faces = pipeline.detect(&frame.rgb, frame.width, frame.height)?;

    for face in &faces {
        let label = match pipeline.descriptor_for(&frame.rgb, frame.width, frame.height, face) {
            Ok(descriptor) => {
                let outcome = NearestMatcher.compare(&descriptor, records, tolerance);
                if outcome.matched {
                    format!(
                        "{GREEN}{} ({:.1}%){RESET}",
                        outcome.name.as_deref().unwrap_or("?"),
                        outcome.confidence()
                    )
                } else {
                    format!("{RED}unknown{RESET}")
                }
            }
            Err(PipelineError::Recognize(err)) => {
                tracing::debug!(error = %err, "descriptor extraction failed in watch loop");
                format!("{RED}unknown{RESET}")
            }
            Err(err) => return Err(err.into()),
        };

        println!(
            "frame {:>6}  [{:>4.0},{:>4.0} {:>3.0}x{:>3.0}]  {}",
            frame.sequence, face.x, face.y, face.width, face.height, label
        );
    }

    Ok(())
}

fn load_pipeline(config: &CliConfig) -> Result<FacePipeline> {
    FacePipeline::load(&config.detector_model_path(), &config.recognizer_model_path())
        .context("failed to load face models")
}

fn load_photo(path: &Path) -> Result<Photo> {
    let encoded = std::fs::read(path)
        .with_context(|| format!("failed to read photo {}", path.display()))?;
    let decoded = image::load_from_memory(&encoded)
        .with_context(|| format!("failed to decode photo {}", path.display()))?
        .to_rgb8();

    Ok(Photo {
        width: decoded.width(),
        height: decoded.height(),
        rgb: decoded.into_raw(),
        encoded,
    })
}

/// Capture non-dark frames from the webcam and run `extract` on each until
/// one yields a descriptor. Policy errors (no face, several faces) move on to
/// the next frame; the last error is reported when every frame fails.
fn capture_and_extract(
    config: &CliConfig,
    pipeline: &mut FacePipeline,
    extract: impl Fn(&mut FacePipeline, &Photo) -> Result<facecheck_core::Descriptor, PipelineError>,
) -> Result<(Photo, facecheck_core::Descriptor)> {
    let camera = Camera::open(&config.camera_device)?;
    println!("Capturing from {}...", config.camera_device);

    let frames = camera.capture_clear_frames(CAPTURE_ATTEMPTS)?;
    if frames.is_empty() {
        bail!("no usable frames captured (is the lens covered?)");
    }

    let mut last_err = None;
    for frame in &frames {
        let photo = encode_frame(frame)?;
        match extract(pipeline, &photo) {
            Ok(descriptor) => return Ok((photo, descriptor)),
            Err(err @ (PipelineError::NoFaceDetected | PipelineError::MultipleFaces(_))) => {
                tracing::debug!(seq = frame.sequence, error = %err, "frame rejected, trying next");
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err.expect("at least one frame was tried").into())
}

fn encode_frame(frame: &Frame) -> Result<Photo> {
    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .context("captured frame has inconsistent dimensions")?;

    let mut encoded = Cursor::new(Vec::new());
    img.write_to(&mut encoded, image::ImageFormat::Jpeg)
        .context("failed to encode captured frame")?;

    Ok(Photo {
        rgb: frame.rgb.clone(),
        width: frame.width,
        height: frame.height,
        encoded: encoded.into_inner(),
    })
}
