//! Sensor driver seam and the exclusive-access lock around it

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::capture::resolution::ResolutionProfile;
use crate::config::SensorSettings;
use crate::{Error, Result};

/// Frame-size modes understood by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorMode {
    Qqvga,
    R128x128,
    Qcif,
    Hqvga,
    R240x240,
    Qvga,
    R320x320,
    Cif,
    Hvga,
    Vga,
    Svga,
    Xga,
    Hd,
    Sxga,
    Uxga,
    Fhd,
}

/// Settings handed to the driver on every (re)initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub device: String,
    pub mode: SensorMode,
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    pub frame_buffers: u32,
}

impl SensorConfig {
    pub fn new(settings: &SensorSettings, profile: &ResolutionProfile) -> Self {
        Self {
            device: settings.device.clone(),
            mode: profile.mode,
            width: profile.width,
            height: profile.height,
            jpeg_quality: settings.jpeg_quality,
            frame_buffers: settings.frame_buffers,
        }
    }

    pub fn apply_profile(&mut self, profile: &ResolutionProfile) {
        self.mode = profile.mode;
        self.width = profile.width;
        self.height = profile.height;
    }
}

/// Error reported by a sensor driver
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

/// Frame buffer lent out by the driver's pool. Hand it back with
/// [`SensorDriver::return_frame`].
#[derive(Debug)]
pub struct SensorFrame {
    data: Vec<u8>,
}

impl SensorFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Camera hardware as seen by the pipeline
pub trait SensorDriver: Send {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError>;

    fn deinit(&mut self) -> Result<(), DriverError>;

    /// Next buffered frame, `None` if the sensor has nothing to give.
    fn get_frame(&mut self) -> Option<SensorFrame>;

    fn return_frame(&mut self, frame: SensorFrame);
}

/// State guarded by the camera lock
pub struct SensorSlot {
    driver: Box<dyn SensorDriver>,
    config: Option<SensorConfig>,
    online: bool,
}

impl SensorSlot {
    /// Configuration the sensor runs with (or will run with after the next start)
    pub fn config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn driver_mut(&mut self) -> &mut dyn SensorDriver {
        self.driver.as_mut()
    }

    pub(crate) fn configure(&mut self, config: SensorConfig) {
        self.config = Some(config);
    }

    pub(crate) fn apply_profile(&mut self, profile: &ResolutionProfile) {
        if let Some(config) = self.config.as_mut() {
            config.apply_profile(profile);
        }
    }

    /// Initialize the driver with the pending configuration.
    pub(crate) fn start(&mut self) -> Result<(), DriverError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| DriverError("sensor has no configuration".into()))?;
        self.driver.init(config)?;
        self.online = true;
        debug!(width = config.width, height = config.height, "sensor started");
        Ok(())
    }

    /// Stop the driver. The sensor counts as offline even if the driver complains.
    pub(crate) fn stop(&mut self) -> Result<(), DriverError> {
        self.online = false;
        self.driver.deinit()
    }

    /// Stop the sensor and forget its configuration.
    pub(crate) fn shutdown(&mut self) -> Result<(), DriverError> {
        if self.config.take().is_none() {
            return Ok(());
        }
        let stopped = self.stop();
        if let Err(e) = &stopped {
            warn!(error = %e, "sensor deinit failed during teardown");
        }
        stopped
    }
}

/// Camera shared between contexts. Every hardware access goes through
/// [`SharedSensor::acquire`], which waits at most `lock_timeout`.
pub struct SharedSensor {
    slot: Mutex<SensorSlot>,
    lock_timeout: Duration,
}

impl SharedSensor {
    pub fn new(driver: Box<dyn SensorDriver>, lock_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(SensorSlot {
                driver,
                config: None,
                online: false,
            }),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Take the camera lock. The guard releases it on every exit path.
    pub async fn acquire(&self) -> Result<MutexGuard<'_, SensorSlot>> {
        tokio::time::timeout(self.lock_timeout, self.slot.lock())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.lock_timeout, "camera lock wait timed out");
                Error::LockTimeout(self.lock_timeout)
            })
    }
}
