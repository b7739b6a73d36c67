//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free 3-stride decoding with five-point landmarks and NMS
//! post-processing. Input frames are interleaved RGB8.

use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: usize = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("image buffer too short: expected {expected} bytes for {width}x{height} RGB, got {actual}")]
    BadImageBuffer {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied by the letterbox resize, kept so detections can
/// be mapped back to source-image coordinates.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score, bbox, kps).
type StrideSlots = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices, discovered by name at load time with a
    /// positional fallback.
    stride_slots: [StrideSlots; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectError> {
        if !Path::new(model_path).exists() {
            return Err(DetectError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 9 {
            return Err(DetectError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides x score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_slots = map_output_slots(&output_names);
        tracing::debug!(?stride_slots, "SCRFD output tensor mapping");

        Ok(Self { session, stride_slots })
    }

    /// Detect faces in an RGB8 frame.
    ///
    /// Returns bounding boxes in source-image coordinates, sorted by
    /// confidence descending, so index 0 is always the most confident face.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceBox>, DetectError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(DetectError::BadImageBuffer {
                expected,
                actual: rgb.len(),
                width,
                height,
            });
        }

        let (input, letterbox) = preprocess(rgb, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_slots[pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            decode_stride(scores, bboxes, kps, stride, &letterbox, &mut detections);
        }

        let mut faces = suppress_overlaps(detections, NMS_IOU_THRESHOLD);
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(faces)
    }
}

/// Letterbox an RGB frame into a 640x640 NCHW float tensor.
///
/// Bilinear resize per channel; padding pixels use the mean value so they
/// normalise to 0.0.
fn preprocess(rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, Letterbox) {
    let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
    let new_w = (width as f32 * scale).round() as usize;
    let new_h = (height as f32 * scale).round() as usize;
    let pad_x = (INPUT_SIZE - new_w) as f32 / 2.0;
    let pad_y = (INPUT_SIZE - new_h) as f32 / 2.0;
    let x_off = pad_x.floor() as usize;
    let y_off = pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    let inv_scale = 1.0 / scale;

    for y in 0..INPUT_SIZE {
        for x in 0..INPUT_SIZE {
            let inside =
                y >= y_off && y < y_off + new_h && x >= x_off && x < x_off + new_w;

            if inside {
                // Map back into the source image with half-pixel centres.
                let src_x = ((x - x_off) as f32 + 0.5) * inv_scale - 0.5;
                let src_y = ((y - y_off) as f32 + 0.5) * inv_scale - 0.5;
                let [r, g, b] = sample_bilinear_rgb(rgb, width, height, src_x, src_y);
                tensor[[0, 0, y, x]] = (r - PIXEL_MEAN) / PIXEL_STD;
                tensor[[0, 1, y, x]] = (g - PIXEL_MEAN) / PIXEL_STD;
                tensor[[0, 2, y, x]] = (b - PIXEL_MEAN) / PIXEL_STD;
            }
            // Padding stays 0.0, the normalised mean.
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Bilinear sample of an interleaved RGB8 buffer, edge-clamped.
fn sample_bilinear_rgb(rgb: &[u8], width: usize, height: usize, sx: f32, sy: f32) -> [f32; 3] {
    let x0 = (sx.floor() as i32).clamp(0, width as i32 - 1) as usize;
    let y0 = (sy.floor() as i32).clamp(0, height as i32 - 1) as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (sx - sx.floor()).clamp(0.0, 1.0);
    let fy = (sy - sy.floor()).clamp(0.0, 1.0);

    let mut out = [0.0f32; 3];
    for (c, v) in out.iter_mut().enumerate() {
        let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
        let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
        let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
        let br = rgb[(y1 * width + x1) * 3 + c] as f32;
        *v = tl * (1.0 - fx) * (1.0 - fy)
            + tr * fx * (1.0 - fy)
            + bl * (1.0 - fx) * fy
            + br * fx * fy;
    }
    out
}

/// Map output tensors to (score, bbox, kps) slots per stride.
///
/// SCRFD exports either name their tensors ("score_8", "bbox_16", "kps_32")
/// or use generic numeric names, in which case the standard positional order
/// applies: [0-2]=scores, [3-5]=bboxes, [6-8]=kps, each over strides 8/16/32.
fn map_output_slots(names: &[String]) -> [StrideSlots; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let all_named = STRIDES.iter().all(|&s| {
        find("score", s).is_some() && find("bbox", s).is_some() && find("kps", s).is_some()
    });

    if all_named {
        std::array::from_fn(|i| {
            let s = STRIDES[i];
            (
                find("score", s).unwrap(),
                find("bbox", s).unwrap(),
                find("kps", s).unwrap(),
            )
        })
    } else {
        tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
        [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
    }
}

/// Decode anchor-free detections for one stride level into `out`.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    out: &mut Vec<FaceBox>,
) {
    let grid = INPUT_SIZE / stride;
    let num_anchors = grid * grid * ANCHORS_PER_CELL;

    // Map from letterboxed input space back to source-image space.
    let unmap = |x: f32, y: f32| -> (f32, f32) {
        (
            (x - letterbox.pad_x) / letterbox.scale,
            (y - letterbox.pad_y) / letterbox.scale,
        )
    };

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid) * stride) as f32;
        let anchor_cy = ((cell / grid) * stride) as f32;

        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let (x1, y1) = unmap(
            anchor_cx - bboxes[off] * stride as f32,
            anchor_cy - bboxes[off + 1] * stride as f32,
        );
        let (x2, y2) = unmap(
            anchor_cx + bboxes[off + 2] * stride as f32,
            anchor_cy + bboxes[off + 3] * stride as f32,
        );

        let kps_off = idx * 10;
        let landmarks = if kps_off + 9 < kps.len() {
            let mut pts = [(0.0f32, 0.0f32); 5];
            for (i, pt) in pts.iter_mut().enumerate() {
                *pt = unmap(
                    anchor_cx + kps[kps_off + i * 2] * stride as f32,
                    anchor_cy + kps[kps_off + i * 2 + 1] * stride as f32,
                );
            }
            Some(pts)
        } else {
            None
        };

        out.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
}

/// Non-Maximum Suppression: drop detections overlapping a stronger one.
fn suppress_overlaps(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union of two face boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    #[test]
    fn test_iou_identical() {
        let a = face(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(50.0, 50.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 10.0, 10.0, 1.0);
        // Intersection 5x10=50, union 150.
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_drops_weaker_overlap() {
        let dets = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.9),
            face(5.0, 5.0, 100.0, 100.0, 0.8),
            face(300.0, 300.0, 40.0, 40.0, 0.7),
        ];
        let kept = suppress_overlaps(dets, NMS_IOU_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let dets = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(50.0, 50.0, 10.0, 10.0, 0.6),
        ];
        assert_eq!(suppress_overlaps(dets, NMS_IOU_THRESHOLD).len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(suppress_overlaps(vec![], NMS_IOU_THRESHOLD).is_empty());
    }

    #[test]
    fn test_preprocess_uniform_frame() {
        // A uniform mid-gray frame should produce near-zero tensor values
        // inside the letterboxed region and exactly zero in the padding.
        let w = 320usize;
        let h = 240usize;
        let rgb = vec![128u8; w * h * 3];
        let (tensor, lb) = preprocess(&rgb, w, h);

        assert_eq!(tensor.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
        let expected = (128.0 - PIXEL_MEAN) / PIXEL_STD;

        // Centre of the image region.
        let v = tensor[[0, 0, INPUT_SIZE / 2, INPUT_SIZE / 2]];
        assert!((v - expected).abs() < 1e-5, "got {v}, expected {expected}");

        // Top rows are padding for a 4:3 image letterboxed into a square.
        assert!(lb.pad_y > 0.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let w = 320.0f32;
        let h = 240.0f32;
        let scale = (INPUT_SIZE as f32 / w).min(INPUT_SIZE as f32 / h);
        let pad_x = (INPUT_SIZE as f32 - (w * scale).round()) / 2.0;
        let pad_y = (INPUT_SIZE as f32 - (h * scale).round()) / 2.0;

        let (ox, oy) = (100.0f32, 50.0f32);
        let (lx, ly) = (ox * scale + pad_x, oy * scale + pad_y);
        let rx = (lx - pad_x) / scale;
        let ry = (ly - pad_y) / scale;
        assert!((rx - ox).abs() < 0.1);
        assert!((ry - oy).abs() < 0.1);
    }

    #[test]
    fn test_sample_bilinear_edge_clamp() {
        // 2x2 RGB image; sampling far outside must clamp to the corner pixel.
        let rgb = vec![
            10, 20, 30, 40, 50, 60, //
            70, 80, 90, 100, 110, 120,
        ];
        let v = sample_bilinear_rgb(&rgb, 2, 2, -5.0, -5.0);
        assert_eq!(v, [10.0, 20.0, 30.0]);
        let v = sample_bilinear_rgb(&rgb, 2, 2, 10.0, 10.0);
        assert_eq!(v, [100.0, 110.0, 120.0]);
    }

    #[test]
    fn test_map_output_slots_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32", //
            "bbox_8", "bbox_16", "bbox_32", //
            "kps_8", "kps_16", "kps_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let slots = map_output_slots(&names);
        assert_eq!(slots[0], (0, 3, 6));
        assert_eq!(slots[1], (1, 4, 7));
        assert_eq!(slots[2], (2, 5, 8));
    }

    #[test]
    fn test_map_output_slots_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", //
            "bbox_16", "kps_16", "score_16", //
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let slots = map_output_slots(&names);
        assert_eq!(slots[0], (2, 0, 1));
        assert_eq!(slots[1], (5, 3, 4));
        assert_eq!(slots[2], (8, 6, 7));
    }

    #[test]
    fn test_map_output_slots_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(map_output_slots(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        // One anchor above threshold, one below; only one detection decoded.
        let grid = INPUT_SIZE / 32;
        let n = grid * grid * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        scores[0] = 0.9;
        scores[1] = 0.1;
        let bboxes = vec![1.0f32; n * 4];
        let kps = vec![0.5f32; n * 10];
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let mut out = Vec::new();
        decode_stride(&scores, &bboxes, &kps, 32, &lb, &mut out);
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
        assert!(out[0].landmarks.is_some());
        // Anchor at origin, offsets of 1.0 * stride in each direction.
        assert!((out[0].width - 64.0).abs() < 1e-4);
        assert!((out[0].height - 64.0).abs() < 1e-4);
    }
}
