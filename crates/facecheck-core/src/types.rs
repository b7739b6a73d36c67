use serde::{Deserialize, Serialize};

/// Maximum Euclidean distance between two descriptors for them to be
/// considered the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face descriptor (512-dimensional for ArcFace, L2-normalised).
///
/// Opaque to the rest of the system beyond length and comparability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    /// Euclidean distance between two descriptors. Lower = more similar.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Whether `other` is within `tolerance` of this descriptor.
    pub fn matches_within(&self, other: &Descriptor, tolerance: f32) -> bool {
        self.distance(other) < tolerance
    }
}

/// One registered person. The `id` doubles as the base filename for the
/// descriptor and photo files and as the deletion key; it is never updated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    pub descriptor: Descriptor,
    pub registered_at: String,
}

/// Result of matching a probe descriptor against the registered gallery.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Euclidean distance of the nearest record (0.0 for an empty gallery).
    pub distance: f32,
    /// Id of the matched record (if any).
    pub record_id: Option<String>,
    /// Name of the matched record (if any).
    pub name: Option<String>,
}

impl MatchOutcome {
    /// Heuristic confidence in percent: `(1 - distance) * 100`, floored at 0.
    /// Not a calibrated probability.
    pub fn confidence(&self) -> f32 {
        ((1.0 - self.distance) * 100.0).max(0.0)
    }
}

/// Strategy for comparing a probe descriptor against the registered gallery.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[FaceRecord], tolerance: f32) -> MatchOutcome;
}

/// Linear-scan nearest-neighbour matcher.
///
/// Scans the whole gallery and keeps the record with the minimum Euclidean
/// distance. Exact ties keep the first-encountered record in scan order
/// (argmin semantics). The match is accepted only when the minimum distance
/// is strictly below `tolerance`.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Descriptor, gallery: &[FaceRecord], tolerance: f32) -> MatchOutcome {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let dist = probe.distance(&record.descriptor);
            // Strict `<` keeps the first-encountered minimum on exact ties.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < tolerance => MatchOutcome {
                matched: true,
                distance: best_dist,
                record_id: Some(gallery[idx].id.clone()),
                name: Some(gallery[idx].name.clone()),
            },
            _ => MatchOutcome {
                matched: false,
                distance: if best_dist.is_finite() { best_dist } else { 0.0 },
                record_id: None,
                name: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: Vec<f32>) -> Descriptor {
        Descriptor { values, model_version: None }
    }

    fn record(id: &str, name: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord {
            id: id.into(),
            name: name.into(),
            descriptor: desc(values),
            registered_at: "2026-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn test_distance_identical() {
        let a = desc(vec![1.0, 0.0, 0.0]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_unit_axes() {
        let a = desc(vec![1.0, 0.0]);
        let b = desc(vec![0.0, 1.0]);
        assert!((a.distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_matches_within_tolerance_boundary() {
        let a = desc(vec![0.0, 0.0]);
        let b = desc(vec![0.6, 0.0]);
        // Distance exactly at tolerance is NOT a match (strict less-than).
        assert!(!a.matches_within(&b, 0.6));
        assert!(a.matches_within(&b, 0.61));
    }

    #[test]
    fn test_nearest_matcher_picks_minimum() {
        let probe = desc(vec![1.0, 0.0]);
        let gallery = vec![
            record("r1", "far", vec![0.0, 1.0]),
            record("r2", "near", vec![0.9, 0.0]),
            record("r3", "farther", vec![-1.0, 0.0]),
        ];
        let out = NearestMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        assert!(out.matched);
        assert_eq!(out.record_id.as_deref(), Some("r2"));
        assert_eq!(out.name.as_deref(), Some("near"));
        assert!((out.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_matcher_tie_keeps_first() {
        // Two records at identical distance from the probe: scan order wins.
        let probe = desc(vec![0.0, 0.0]);
        let gallery = vec![
            record("first", "a", vec![0.3, 0.0]),
            record("second", "b", vec![0.0, 0.3]),
        ];
        let out = NearestMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        assert!(out.matched);
        assert_eq!(out.record_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_nearest_matcher_outside_tolerance() {
        let probe = desc(vec![0.0, 0.0]);
        let gallery = vec![record("r1", "far", vec![2.0, 0.0])];
        let out = NearestMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        assert!(!out.matched);
        assert!(out.record_id.is_none());
        assert!((out.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_matcher_empty_gallery() {
        let probe = desc(vec![1.0]);
        let out = NearestMatcher.compare(&probe, &[], DEFAULT_TOLERANCE);
        assert!(!out.matched);
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn test_confidence_formula() {
        let out = MatchOutcome {
            matched: true,
            distance: 0.25,
            record_id: Some("r1".into()),
            name: Some("ana".into()),
        };
        assert!((out.confidence() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_confidence_floored_at_zero() {
        let out = MatchOutcome { matched: false, distance: 1.7, record_id: None, name: None };
        assert_eq!(out.confidence(), 0.0);
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let rec = record("ana_20260101_000000", "Ana", vec![0.1, 0.2, 0.3]);
        let json = serde_json::to_string(&rec).unwrap();
        let back: FaceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.name, rec.name);
        assert_eq!(back.descriptor.values, rec.descriptor.values);
    }
}
