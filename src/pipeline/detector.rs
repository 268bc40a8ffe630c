//! Detector capability and the closed set of detector families

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::DecodedImage;
use crate::{Error, Result};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// COCO class id for "person"
pub const PERSON_CATEGORY: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Multi-face detector with landmarks
    Face,
    /// COCO detector reporting people only
    Person,
    /// YOLO-style detector, every class
    MultiClass,
}

/// One region as reported by a model backend, before any filtering
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDetection {
    /// x1, y1, x2, y2 in image pixels
    pub bbox: [i32; 4],
    pub score: f32,
    pub category: u32,
    /// Flattened x, y pairs; empty for models without keypoints
    pub keypoints: Vec<i32>,
}

/// Anything that can find objects in a decoded image
pub trait DetectionModel: Send {
    fn run(&mut self, image: &DecodedImage) -> Vec<RawDetection>;
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

/// Builds the model for a detector family
pub trait ModelLoader: Send + Sync {
    fn load(&self, kind: DetectorKind) -> Result<Box<dyn DetectionModel>, LoadError>;
}

impl<F> ModelLoader for F
where
    F: Fn(DetectorKind) -> Result<Box<dyn DetectionModel>, LoadError> + Send + Sync,
{
    fn load(&self, kind: DetectorKind) -> Result<Box<dyn DetectionModel>, LoadError> {
        self(kind)
    }
}

/// Stand-in backend that never detects anything, for bring-up without a model.
#[derive(Debug, Default)]
pub struct NoopModel;

impl DetectionModel for NoopModel {
    fn run(&mut self, _image: &DecodedImage) -> Vec<RawDetection> {
        Vec::new()
    }
}

/// Which raw detections count as real
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcceptPolicy {
    All,
    MinScore(f32),
    Category { category: u32, min_score: f32 },
}

impl AcceptPolicy {
    pub fn accepts(&self, detection: &RawDetection) -> bool {
        match *self {
            Self::All => true,
            Self::MinScore(min) => detection.score >= min,
            Self::Category {
                category,
                min_score,
            } => detection.category == category && detection.score >= min_score,
        }
    }
}

/// Loaded detector, tagged with its family
pub enum Detector {
    Face(Box<dyn DetectionModel>),
    Person(Box<dyn DetectionModel>),
    MultiClass(Box<dyn DetectionModel>),
}

impl Detector {
    pub fn load(kind: DetectorKind, loader: &dyn ModelLoader) -> Result<Self> {
        let model = loader
            .load(kind)
            .map_err(|e| Error::DetectorInit(format!("{kind:?}: {e}")))?;
        Ok(match kind {
            DetectorKind::Face => Self::Face(model),
            DetectorKind::Person => Self::Person(model),
            DetectorKind::MultiClass => Self::MultiClass(model),
        })
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Self::Face(_) => DetectorKind::Face,
            Self::Person(_) => DetectorKind::Person,
            Self::MultiClass(_) => DetectorKind::MultiClass,
        }
    }

    /// Faces are all kept; people and generic classes must reach `threshold`.
    pub fn policy(&self, threshold: f32) -> AcceptPolicy {
        match self {
            Self::Face(_) => AcceptPolicy::All,
            Self::Person(_) => AcceptPolicy::Category {
                category: PERSON_CATEGORY,
                min_score: threshold,
            },
            Self::MultiClass(_) => AcceptPolicy::MinScore(threshold),
        }
    }

    pub fn run(&mut self, image: &DecodedImage) -> Vec<RawDetection> {
        match self {
            Self::Face(model) | Self::Person(model) | Self::MultiClass(model) => model.run(image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(score: f32, category: u32) -> RawDetection {
        RawDetection {
            score,
            category,
            ..Default::default()
        }
    }

    fn noop_loader(_: DetectorKind) -> Result<Box<dyn DetectionModel>, LoadError> {
        Ok(Box::new(NoopModel))
    }

    #[test]
    fn policies_per_family() {
        for kind in [DetectorKind::Face, DetectorKind::Person, DetectorKind::MultiClass] {
            let detector = Detector::load(kind, &noop_loader).unwrap();
            assert_eq!(detector.kind(), kind);
        }

        let face = Detector::load(DetectorKind::Face, &noop_loader).unwrap();
        assert!(face.policy(0.5).accepts(&raw(0.1, 3)));

        let person = Detector::load(DetectorKind::Person, &noop_loader).unwrap();
        let policy = person.policy(0.5);
        assert!(policy.accepts(&raw(0.5, PERSON_CATEGORY)));
        assert!(!policy.accepts(&raw(0.49, PERSON_CATEGORY)));
        assert!(!policy.accepts(&raw(0.9, 2)));

        let multi = Detector::load(DetectorKind::MultiClass, &noop_loader).unwrap();
        assert!(multi.policy(0.5).accepts(&raw(0.7, 41)));
        assert!(!multi.policy(0.5).accepts(&raw(0.3, 41)));
    }

    #[test]
    fn loader_failure_is_detector_init() {
        let failing = |_: DetectorKind| -> Result<Box<dyn DetectionModel>, LoadError> {
            Err(LoadError("weights missing".into()))
        };
        match Detector::load(DetectorKind::Face, &failing) {
            Err(Error::DetectorInit(msg)) => assert!(msg.contains("weights missing")),
            _ => panic!("expected DetectorInit"),
        }
    }
}
