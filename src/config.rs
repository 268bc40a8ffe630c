//! Node configuration: built-in defaults, an optional TOML file, then `VIGIL__*` env vars

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::resolution::DEFAULT_RESOLUTION_INDEX;
use crate::pipeline::aggregate::MAX_DETECTIONS;
use crate::pipeline::detector::{DetectorKind, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::{Error, Result};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorSettings,
    pub camera: CameraSettings,
    pub dispatch: DispatchSettings,
    pub inference: InferenceSettings,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Generated JPEG test pattern, for hosts without a camera
    Synthetic,
    /// V4L2 MJPEG device (needs the `v4l2` feature)
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub source: SourceKind,
    pub device: String,
    pub jpeg_quality: u8,
    pub frame_buffers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub default_resolution: usize,
    pub lock_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub reinit_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
    pub send_timeout_ms: u64,
    pub worker_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub detector: DetectorKind,
    pub max_detections: usize,
    pub confidence_threshold: f32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device: "/dev/video0".into(),
            jpeg_quality: 90,
            frame_buffers: 1,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            default_resolution: DEFAULT_RESOLUTION_INDEX,
            lock_timeout_ms: 5000,
            settle_delay_ms: 100,
            reinit_delay_ms: 100,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            send_timeout_ms: 5000,
            worker_poll_ms: 1000,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Person,
            max_detections: MAX_DETECTIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl CameraSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reinit_delay(&self) -> Duration {
        Duration::from_millis(self.reinit_delay_ms)
    }
}

impl DispatchSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn worker_poll(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }
}

impl Config {
    /// Layer defaults, the optional file at `path` and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("VIGIL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.queue_capacity == 0 {
            return Err(Error::InvalidConfig("dispatch.queue_capacity must be > 0".into()));
        }
        if self.inference.max_detections == 0 {
            return Err(Error::InvalidConfig("inference.max_detections must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.inference.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "inference.confidence_threshold {} outside [0, 1]",
                self.inference.confidence_threshold
            )));
        }
        if self.sensor.jpeg_quality == 0 || self.sensor.jpeg_quality > 100 {
            return Err(Error::InvalidConfig(format!(
                "sensor.jpeg_quality {} outside 1..=100",
                self.sensor.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware() {
        let config = Config::default();
        assert_eq!(config.camera.default_resolution, 5);
        assert_eq!(config.camera.lock_timeout(), Duration::from_secs(5));
        assert_eq!(config.camera.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.dispatch.queue_capacity, 5);
        assert_eq!(config.inference.confidence_threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = Config::from_toml(
            r#"
            [camera]
            default_resolution = 9

            [inference]
            detector = "face"
            max_detections = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.default_resolution, 9);
        assert_eq!(config.camera.lock_timeout_ms, 5000);
        assert_eq!(config.inference.detector, DetectorKind::Face);
        assert_eq!(config.inference.max_detections, 3);
    }

    #[test]
    fn rejects_zero_queue() {
        let err = Config::from_toml("[dispatch]\nqueue_capacity = 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.inference.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
