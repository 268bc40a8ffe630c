//! Test-pattern sensor for hosts without a camera

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use crate::capture::sensor::{DriverError, SensorConfig, SensorDriver, SensorFrame};

/// Encode a moving gradient as a JPEG. `phase` shifts the pattern so
/// consecutive frames differ.
pub fn test_pattern(width: u32, height: u32, quality: u8, phase: u32) -> Option<Vec<u8>> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x.wrapping_add(phase) % 256) as u8,
            (y.wrapping_add(phase / 2) % 256) as u8,
            ((x ^ y).wrapping_add(phase) % 256) as u8,
        ])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&image)
        .map_err(|e| warn!(error = %e, "test pattern encode failed"))
        .ok()?;
    Some(out)
}

/// Emits one test-pattern JPEG per fetch at the configured resolution
#[derive(Debug, Default)]
pub struct SyntheticSensor {
    config: Option<SensorConfig>,
    phase: u32,
}

impl SyntheticSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorDriver for SyntheticSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError> {
        if config.width == 0 || config.height == 0 {
            return Err(DriverError(format!(
                "unsupported frame size {}x{}",
                config.width, config.height
            )));
        }
        debug!(mode = ?config.mode, "synthetic sensor started");
        self.config = Some(config.clone());
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DriverError> {
        self.config = None;
        Ok(())
    }

    fn get_frame(&mut self) -> Option<SensorFrame> {
        let config = self.config.as_ref()?;
        self.phase = self.phase.wrapping_add(8);
        test_pattern(config.width, config.height, config.jpeg_quality, self.phase)
            .map(SensorFrame::new)
    }

    fn return_frame(&mut self, _frame: SensorFrame) {}
}
