//! V4L2 MJPEG sensor driver

use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::sensor::{DriverError, SensorConfig, SensorDriver, SensorFrame};

fn driver_err(context: &str, err: impl std::fmt::Display) -> DriverError {
    DriverError(format!("{context}: {err}"))
}

/// Memory-mapped V4L2 capture producing JPEG frames
#[derive(Default)]
pub struct V4l2Sensor {
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
}

impl V4l2Sensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorDriver for V4l2Sensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device).map_err(|e| driver_err("open", e))?;

        let caps = device.query_caps().map_err(|e| driver_err("query caps", e))?;
        info!("Device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DriverError("device doesn't support video capture".into()));
        }

        let mut fmt = device.format().map_err(|e| driver_err("get format", e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(b"MJPG");
        let applied = device
            .set_format(&fmt)
            .map_err(|e| driver_err("set format", e))?;
        if applied.fourcc != FourCC::new(b"MJPG") {
            return Err(DriverError(format!(
                "device refused MJPEG, negotiated {}",
                applied.fourcc
            )));
        }
        if (applied.width, applied.height) != (config.width, config.height) {
            warn!(
                "Device negotiated {}x{} instead of {}x{}",
                applied.width, applied.height, config.width, config.height
            );
        }

        let stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.frame_buffers.max(1))
                .map_err(|e| driver_err("request buffers", e))?;

        self.stream = Some(stream);
        self.device = Some(device);
        info!("Capture stream started with {} buffers", config.frame_buffers.max(1));
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), DriverError> {
        self.stream = None;
        self.device = None;
        Ok(())
    }

    fn get_frame(&mut self) -> Option<SensorFrame> {
        let stream = self.stream.as_mut()?;
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                Some(SensorFrame::new(buf[..used].to_vec()))
            }
            Err(e) => {
                warn!(error = %e, "V4L2 dequeue failed");
                None
            }
        }
    }

    // Mmap buffers are requeued by the next dequeue
    fn return_frame(&mut self, _frame: SensorFrame) {}
}
