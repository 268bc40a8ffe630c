//! Shapes raw detector output into the capped reporting form

use serde::Serialize;
use tracing::warn;

use crate::pipeline::detector::{AcceptPolicy, RawDetection};

/// Objects reported per inference
pub const MAX_DETECTIONS: usize = 10;

/// Keypoints kept per object (COCO pose uses 17)
pub const MAX_KEYPOINTS: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Corners in any order become top-left / bottom-right.
    pub fn from_corners([ax, ay, bx, by]: [i32; 4]) -> Self {
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Keypoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub bbox: BoundingBox,
    pub keypoints: Vec<Keypoint>,
    pub score: f32,
    pub category: u32,
}

impl From<RawDetection> for DetectedObject {
    fn from(raw: RawDetection) -> Self {
        // Trailing odd coordinate has no partner and is ignored
        let keypoints = raw
            .keypoints
            .chunks_exact(2)
            .take(MAX_KEYPOINTS)
            .map(|xy| Keypoint { x: xy[0], y: xy[1] })
            .collect();
        Self {
            bbox: BoundingBox::from_corners(raw.bbox),
            keypoints,
            score: raw.score,
            category: raw.category,
        }
    }
}

/// Result of filtering and capping one batch of raw detections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// At most `capacity` accepted objects, in detector order
    pub objects: Vec<DetectedObject>,
    /// Every accepted detection, including the ones past the cap
    pub accepted: usize,
    pub rejected: usize,
    pub dropped: usize,
    /// Highest score among all accepted detections
    pub best_score: Option<f32>,
}

pub fn aggregate(raw: Vec<RawDetection>, policy: AcceptPolicy, capacity: usize) -> Aggregate {
    let mut out = Aggregate {
        objects: Vec::with_capacity(raw.len().min(capacity)),
        ..Aggregate::default()
    };

    for detection in raw {
        if !policy.accepts(&detection) {
            out.rejected += 1;
            continue;
        }
        out.accepted += 1;
        out.best_score = Some(match out.best_score {
            Some(best) => best.max(detection.score),
            None => detection.score,
        });
        if out.objects.len() < capacity {
            out.objects.push(DetectedObject::from(detection));
        } else {
            out.dropped += 1;
        }
    }

    if out.dropped > 0 {
        warn!(
            dropped = out.dropped,
            capacity, "detection capacity reached, extra detections dropped"
        );
        metrics::counter!("vigil_detections_dropped_total").increment(out.dropped as u64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(score: f32) -> RawDetection {
        RawDetection {
            bbox: [10, 20, 30, 40],
            score,
            category: 0,
            keypoints: Vec::new(),
        }
    }

    #[test]
    fn caps_but_counts_everything() {
        let batch: Vec<_> = (0..15).map(|i| raw(0.5 + i as f32 * 0.01)).collect();
        let out = aggregate(batch, AcceptPolicy::All, MAX_DETECTIONS);
        assert_eq!(out.objects.len(), MAX_DETECTIONS);
        assert_eq!(out.accepted, 15);
        assert_eq!(out.dropped, 5);
        // The best score came from a dropped detection
        assert!((out.best_score.unwrap() - 0.64).abs() < 1e-6);
    }

    #[test]
    fn rejected_are_not_counted() {
        let batch = vec![raw(0.2), raw(0.6), raw(0.49), raw(0.9)];
        let out = aggregate(batch, AcceptPolicy::MinScore(0.5), MAX_DETECTIONS);
        assert_eq!(out.accepted, 2);
        assert_eq!(out.rejected, 2);
        assert_eq!(out.objects.len(), 2);
        assert_eq!(out.best_score, Some(0.9));
    }

    #[test]
    fn empty_batch() {
        let out = aggregate(Vec::new(), AcceptPolicy::All, MAX_DETECTIONS);
        assert_eq!(out, Aggregate::default());
    }

    #[test]
    fn keypoints_are_paired_and_boxes_normalized() {
        let detection = RawDetection {
            bbox: [50, 60, 10, 20],
            score: 0.8,
            category: 0,
            keypoints: vec![1, 2, 3, 4, 5],
        };
        let object = DetectedObject::from(detection);
        assert_eq!(
            object.bbox,
            BoundingBox {
                x1: 10,
                y1: 20,
                x2: 50,
                y2: 60
            }
        );
        assert_eq!(object.bbox.width(), 40);
        assert_eq!(object.bbox.height(), 40);
        assert_eq!(
            object.keypoints,
            vec![Keypoint { x: 1, y: 2 }, Keypoint { x: 3, y: 4 }]
        );
    }
}
