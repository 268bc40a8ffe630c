//! Most-recent photo cache and the capture protocol

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{copy_owned, Frame, FrameMetadata};
use crate::capture::sensor::{SensorConfig, SharedSensor};
use crate::{Error, Result};

/// Holds at most one captured photo and serializes sensor access.
pub struct FrameStore {
    sensor: Arc<SharedSensor>,
    last: ArcSwapOption<Frame>,
    settle_delay: Duration,
    boot: Instant,
    sequence: AtomicU64,
}

impl FrameStore {
    pub fn new(sensor: Arc<SharedSensor>, settle_delay: Duration) -> Self {
        Self {
            sensor,
            last: ArcSwapOption::empty(),
            settle_delay,
            boot: Instant::now(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn sensor(&self) -> &Arc<SharedSensor> {
        &self.sensor
    }

    /// Configure and start the sensor.
    pub async fn initialize(&self, config: SensorConfig) -> Result<()> {
        self.initialize_with(move || Ok(config)).await
    }

    /// Like [`initialize`](Self::initialize), but `resolve` builds the
    /// configuration once the camera lock is held.
    #[instrument(skip_all)]
    pub async fn initialize_with<F>(&self, resolve: F) -> Result<()>
    where
        F: FnOnce() -> Result<SensorConfig> + Send,
    {
        let mut slot = self.sensor.acquire().await?;
        let config = resolve()?;
        let (width, height) = (config.width, config.height);
        if slot.is_online() {
            if let Err(e) = slot.stop() {
                warn!(error = %e, "sensor stop failed before reinitialization");
            }
        }
        slot.configure(config);
        slot.start()
            .map_err(|e| Error::HardwareInit(e.to_string()))?;
        info!(width, height, "Camera initialized");
        Ok(())
    }

    /// Take a fresh photo and make it the cached one.
    ///
    /// The first frame fetched is thrown away: the sensor keeps one frame
    /// buffered while idle, and that one can be much older than the request.
    #[instrument(skip(self))]
    pub async fn capture(&self) -> Result<Arc<Frame>> {
        let mut slot = self.sensor.acquire().await?;
        if !slot.is_online() {
            return Err(Error::SensorOffline);
        }
        let (width, height) = slot
            .config()
            .map(|c| (c.width, c.height))
            .unwrap_or((0, 0));

        let driver = slot.driver_mut();
        if let Some(stale) = driver.get_frame() {
            debug!(bytes = stale.len(), "discarded buffered frame");
            driver.return_frame(stale);
        }

        tokio::time::sleep(self.settle_delay).await;

        let fresh = match slot.driver_mut().get_frame() {
            Some(frame) if !frame.is_empty() => frame,
            Some(empty) => {
                slot.driver_mut().return_frame(empty);
                metrics::counter!("vigil_capture_failures_total").increment(1);
                return Err(Error::CaptureFailed);
            }
            None => {
                metrics::counter!("vigil_capture_failures_total").increment(1);
                return Err(Error::CaptureFailed);
            }
        };

        let copied = copy_owned(fresh.data());
        slot.driver_mut().return_frame(fresh);
        let data = copied?;

        let frame = Arc::new(Frame {
            data,
            meta: FrameMetadata {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
                width,
                height,
                captured_at: self.boot.elapsed(),
            },
        });
        self.last.store(Some(Arc::clone(&frame)));
        metrics::counter!("vigil_captures_total").increment(1);
        info!(bytes = frame.len(), sequence = frame.meta.sequence, "photo saved");
        Ok(frame)
    }

    /// The cached photo. Lock-free: replacement swaps the whole frame.
    pub fn last_photo(&self) -> Result<Arc<Frame>> {
        self.last
            .load_full()
            .filter(|frame| !frame.is_empty())
            .ok_or(Error::NotFound)
    }

    /// Drop the cached photo and stop the sensor. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub async fn teardown(&self) -> Result<()> {
        let mut slot = self.sensor.acquire().await?;
        self.last.store(None);
        if !slot.is_configured() {
            return Ok(());
        }
        slot.shutdown()
            .map_err(|e| Error::HardwareInit(e.to_string()))?;
        info!("Camera deinitialized");
        Ok(())
    }
}
