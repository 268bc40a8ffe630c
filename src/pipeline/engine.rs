//! Decode → detect → postprocess, with per-stage timing and running stats

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::capture::decode_jpeg;
use crate::config::InferenceSettings;
use crate::pipeline::aggregate::{aggregate, Aggregate, DetectedObject};
use crate::pipeline::detector::{Detector, DetectorKind, ModelLoader};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Running,
    Deinitialized,
}

/// Wall-clock milliseconds per stage, from a monotonic clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub preprocess_ms: f64,
    pub process_ms: f64,
    pub postprocess_ms: f64,
    /// Start of preprocess to end of postprocess, measured, not summed
    pub total_ms: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub detected: bool,
    /// Accepted detections, including any beyond `objects`
    pub count: usize,
    pub objects: Vec<DetectedObject>,
    /// Best accepted score, 0 when nothing was detected
    pub confidence: f32,
    pub image_width: u32,
    pub image_height: u32,
    pub working_set_kb: usize,
    pub timings: StageTimings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStats {
    pub total_count: u64,
    pub avg_ms: f64,
    pub max_working_set_kb: usize,
}

impl RunningStats {
    /// Fold one completed run into the incremental mean.
    pub fn record(&mut self, total_ms: f64, working_set_kb: usize) {
        self.total_count += 1;
        let n = self.total_count as f64;
        self.avg_ms = (self.avg_ms * (n - 1.0) + total_ms) / n;
        self.max_working_set_kb = self.max_working_set_kb.max(working_set_kb);
    }
}

/// Stats snapshot readable without the engine lock
pub type SharedStats = Arc<ArcSwap<RunningStats>>;

pub struct InferenceEngine {
    settings: InferenceSettings,
    state: EngineState,
    detector: Option<Detector>,
    stats: SharedStats,
}

impl InferenceEngine {
    pub fn new(settings: InferenceSettings) -> Self {
        Self {
            settings,
            state: EngineState::Uninitialized,
            detector: None,
            stats: Arc::new(ArcSwap::from_pointee(RunningStats::default())),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn detector_kind(&self) -> Option<DetectorKind> {
        self.detector.as_ref().map(Detector::kind)
    }

    /// Load the configured detector and reset the statistics.
    #[instrument(skip(self, loader), fields(detector = ?self.settings.detector))]
    pub fn initialize(&mut self, loader: &dyn ModelLoader) -> Result<()> {
        if self.state == EngineState::Ready {
            warn!("inference engine already initialized");
            return Ok(());
        }
        let detector = Detector::load(self.settings.detector, loader)?;
        self.detector = Some(detector);
        self.stats.store(Arc::new(RunningStats::default()));
        self.state = EngineState::Ready;
        info!("Inference engine ready");
        Ok(())
    }

    /// Analyze one JPEG. Stats are only updated for runs that get past decoding.
    #[instrument(skip(self, jpeg), fields(bytes = jpeg.len()))]
    pub fn run(&mut self, jpeg: &[u8]) -> Result<InferenceResult> {
        if self.state != EngineState::Ready {
            return Err(Error::NotReady(self.state));
        }
        let Some(detector) = self.detector.as_mut() else {
            return Err(Error::NotReady(self.state));
        };

        self.state = EngineState::Running;
        let outcome = execute(
            detector,
            jpeg,
            self.settings.confidence_threshold,
            self.settings.max_detections,
        );
        self.state = EngineState::Ready;
        let result = outcome?;

        let mut stats = **self.stats.load();
        stats.record(result.timings.total_ms, result.working_set_kb);
        self.stats.store(Arc::new(stats));
        metrics::counter!("vigil_inference_runs_total").increment(1);
        metrics::histogram!("vigil_inference_total_ms").record(result.timings.total_ms);
        info!(
            detected = result.detected,
            count = result.count,
            confidence = result.confidence,
            total_ms = result.timings.total_ms,
            "inference complete"
        );
        Ok(result)
    }

    pub fn stats(&self) -> RunningStats {
        **self.stats.load()
    }

    /// Handle to the published stats. Updated once per completed run.
    pub fn shared_stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    pub fn teardown(&mut self) {
        if self.detector.take().is_some() {
            info!("Inference engine deinitialized");
        }
        self.state = EngineState::Deinitialized;
    }
}

fn execute(
    detector: &mut Detector,
    jpeg: &[u8],
    threshold: f32,
    capacity: usize,
) -> Result<InferenceResult> {
    let started = Instant::now();
    let image = decode_jpeg(jpeg)?;
    let decoded = Instant::now();
    debug!(width = image.width, height = image.height, "decoded frame");

    let raw = detector.run(&image);
    let (image_width, image_height) = (image.width, image.height);
    let working_set_kb = image.byte_len() / 1024;
    drop(image);
    let processed = Instant::now();

    let Aggregate {
        objects,
        accepted,
        best_score,
        ..
    } = aggregate(raw, detector.policy(threshold), capacity);
    let finished = Instant::now();

    Ok(InferenceResult {
        detected: accepted > 0,
        count: accepted,
        objects,
        confidence: best_score.unwrap_or(0.0),
        image_width,
        image_height,
        working_set_kb,
        timings: StageTimings {
            preprocess_ms: millis(decoded - started),
            process_ms: millis(processed - decoded),
            postprocess_ms: millis(finished - processed),
            total_ms: millis(finished - started),
        },
    })
}
