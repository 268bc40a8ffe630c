//! Camera node: one explicit context owning the sensor, the photo cache,
//! the dispatch queue and the inference worker

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::capture::{
    Direction, Frame, FrameStore, ResolutionController, ResolutionProfile, ResolutionTable,
    SensorConfig, SensorDriver, SharedSensor,
};
use crate::config::{Config, SensorSettings};
use crate::pipeline::dispatch::{self, DispatchReceiver, DispatchSender};
use crate::pipeline::worker::{lock_engine, SharedEngine};
use crate::pipeline::{
    CompletedInference, InferenceEngine, InferenceResult, InferenceWorker, ModelLoader,
    RunningStats, SharedStats,
};
use crate::{Error, Result};

pub struct Node {
    store: FrameStore,
    resolution: ResolutionController,
    sensor_settings: SensorSettings,
    sender: DispatchSender,
    receiver: Option<DispatchReceiver>,
    send_timeout: Duration,
    worker_poll: Duration,
    engine: SharedEngine,
    stats: SharedStats,
    latest: Arc<ArcSwapOption<CompletedInference>>,
    worker: Option<InferenceWorker>,
}

impl Node {
    /// Build a node over the standard resolution table. Nothing touches the
    /// hardware until [`init_camera`](Self::init_camera).
    pub fn new(config: &Config, driver: Box<dyn SensorDriver>) -> Result<Self> {
        Self::with_table(config, driver, ResolutionTable::standard())
    }

    pub fn with_table(
        config: &Config,
        driver: Box<dyn SensorDriver>,
        table: ResolutionTable,
    ) -> Result<Self> {
        config.validate()?;
        let sensor = Arc::new(SharedSensor::new(driver, config.camera.lock_timeout()));
        let resolution = ResolutionController::new(
            Arc::clone(&sensor),
            table,
            config.camera.default_resolution,
            config.camera.reinit_delay(),
        )?;
        let store = FrameStore::new(sensor, config.camera.settle_delay());
        let (sender, receiver) = dispatch::channel(config.dispatch.queue_capacity);
        let engine = InferenceEngine::new(config.inference.clone());
        let stats = engine.shared_stats();

        Ok(Self {
            store,
            resolution,
            sensor_settings: config.sensor.clone(),
            sender,
            receiver: Some(receiver),
            send_timeout: config.dispatch.send_timeout(),
            worker_poll: config.dispatch.worker_poll(),
            engine: Arc::new(Mutex::new(engine)),
            stats,
            latest: Arc::new(ArcSwapOption::empty()),
            worker: None,
        })
    }

    pub fn frame_store(&self) -> &FrameStore {
        &self.store
    }

    pub fn resolution(&self) -> &ResolutionController {
        &self.resolution
    }

    /// Start the sensor at the currently selected resolution. The profile is
    /// read under the camera lock, so a concurrent `step` cannot be undone.
    pub async fn init_camera(&self) -> Result<()> {
        self.store
            .initialize_with(|| {
                let profile = self
                    .resolution
                    .current_profile()
                    .ok_or_else(|| Error::InvalidConfig("no active resolution profile".into()))?;
                Ok(SensorConfig::new(&self.sensor_settings, &profile))
            })
            .await
    }

    /// Load the detector. Waits on a blocking thread for any run in progress.
    pub async fn init_inference(&self, loader: Arc<dyn ModelLoader>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = lock_engine(&engine);
            engine.initialize(&*loader)
        })
        .await
        .map_err(|e| Error::WorkerUnavailable(e.to_string()))?
    }

    /// Spawn the inference worker. Only the first call starts one.
    pub fn start_worker(&mut self) -> Result<()> {
        let Some(receiver) = self.receiver.take() else {
            warn!("inference worker already started");
            return Ok(());
        };
        let worker = InferenceWorker::spawn(
            receiver,
            Arc::clone(&self.engine),
            Arc::clone(&self.latest),
            self.worker_poll,
        )
        .map_err(|e| Error::WorkerUnavailable(e.to_string()))?;
        self.worker = Some(worker);
        Ok(())
    }

    pub async fn capture_photo(&self) -> Result<Arc<Frame>> {
        self.store.capture().await
    }

    pub fn last_photo(&self) -> Result<Arc<Frame>> {
        self.store.last_photo()
    }

    pub async fn change_resolution(&self, direction: Direction) -> Result<ResolutionProfile> {
        self.resolution.step(direction).await
    }

    pub fn current_resolution(&self) -> (u32, u32) {
        self.resolution.current()
    }

    /// Queue a copy of `photo` for the worker and return the request id.
    #[instrument(skip(self, photo), fields(sequence = photo.meta.sequence))]
    pub async fn submit_for_inference(&self, photo: &Frame) -> Result<u64> {
        let request = self.sender.request_for(photo)?;
        let id = request.id;
        self.sender.send(request, self.send_timeout).await?;
        info!(id, "photo sent to inference worker");
        Ok(id)
    }

    /// Take a fresh photo and queue it for analysis.
    pub async fn capture_and_submit(&self) -> Result<u64> {
        let photo = self.store.capture().await?;
        self.submit_for_inference(&photo).await
    }

    /// Analyze `jpeg` on a blocking thread and wait for the result.
    pub async fn run_inference_sync(&self, jpeg: Bytes) -> Result<InferenceResult> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = lock_engine(&engine);
            engine.run(&jpeg)
        })
        .await
        .map_err(|e| Error::WorkerUnavailable(e.to_string()))?
    }

    /// Snapshot of the running stats. Never waits for an inference in progress.
    pub fn stats(&self) -> RunningStats {
        **self.stats.load()
    }

    /// Result of the most recent queued request the worker finished.
    pub fn last_inference(&self) -> Option<Arc<CompletedInference>> {
        self.latest.load_full()
    }

    /// Stop the sensor and unload the detector. The node can be initialized again.
    pub async fn deinit(&self) -> Result<()> {
        let camera = self.store.teardown().await;
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || lock_engine(&engine).teardown())
            .await
            .map_err(|e| Error::WorkerUnavailable(e.to_string()))?;
        camera
    }

    /// Close the queue, wait for the worker to drain it, then deinitialize.
    pub async fn shutdown(self) -> Result<()> {
        let Node {
            store,
            sender,
            engine,
            worker,
            ..
        } = self;
        drop(sender);
        if let Some(worker) = worker {
            tokio::task::spawn_blocking(move || worker.join())
                .await
                .map_err(|e| Error::WorkerUnavailable(e.to_string()))?;
        }
        let camera = store.teardown().await;
        lock_engine(&engine).teardown();
        info!("Node shut down");
        camera
    }
}
