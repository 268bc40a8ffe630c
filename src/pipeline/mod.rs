pub mod aggregate;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod worker;

pub use aggregate::{BoundingBox, DetectedObject, Keypoint, MAX_DETECTIONS};
pub use detector::{DetectionModel, Detector, DetectorKind, LoadError, ModelLoader, RawDetection};
pub use dispatch::{CaptureRequest, DispatchReceiver, DispatchSender, SendFailure};
pub use engine::{
    EngineState, InferenceEngine, InferenceResult, RunningStats, SharedStats, StageTimings,
};
pub use worker::{CompletedInference, InferenceWorker};
