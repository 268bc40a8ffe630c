//! Error taxonomy shared by the camera and inference pipeline

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::engine::EngineState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The sensor lock could not be taken within the bounded wait.
    #[error("timed out after {0:?} waiting for the camera lock")]
    LockTimeout(Duration),

    /// The dispatch queue stayed full for the whole send timeout.
    #[error("timed out after {0:?} waiting for room in the dispatch queue")]
    QueueTimeout(Duration),

    /// Every sender or the receiver of the dispatch queue is gone.
    #[error("dispatch queue closed")]
    QueueClosed,

    #[error("sensor initialization failed: {0}")]
    HardwareInit(String),

    #[error("detector initialization failed: {0}")]
    DetectorInit(String),

    /// The sensor was stopped for a resolution change and did not come back.
    #[error("sensor reinitialization at {width}x{height} failed: {reason}")]
    ReinitFailed {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("sensor did not deliver a frame")]
    CaptureFailed,

    #[error("JPEG decode failed: {0}")]
    Decode(String),

    #[error("could not allocate {0} bytes")]
    OutOfMemory(usize),

    /// No photo has been captured yet.
    #[error("no photo available")]
    NotFound,

    #[error("sensor is offline")]
    SensorOffline,

    #[error("inference engine is {0:?}, expected Ready")]
    NotReady(EngineState),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("inference task did not complete: {0}")]
    WorkerUnavailable(String),
}

impl Error {
    /// Timeouts are the only failures a caller should retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::QueueTimeout(_))
    }

    /// HTTP-equivalent status used by the transport collaborators.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::LockTimeout(_) | Self::QueueTimeout(_) => 408,
            Self::SensorOffline | Self::NotReady(_) | Self::QueueClosed => 503,
            Self::Decode(_) | Self::InvalidConfig(_) => 400,
            Self::HardwareInit(_)
            | Self::DetectorInit(_)
            | Self::ReinitFailed { .. }
            | Self::CaptureFailed
            | Self::OutOfMemory(_)
            | Self::WorkerUnavailable(_) => 500,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_transient() {
        assert!(Error::LockTimeout(Duration::from_secs(5)).is_transient());
        assert!(Error::QueueTimeout(Duration::from_secs(5)).is_transient());
        assert!(!Error::CaptureFailed.is_transient());
        assert!(!Error::NotFound.is_transient());
    }

    #[test]
    fn status_codes() {
        assert_eq!(Error::NotFound.status_code(), 404);
        assert_eq!(Error::LockTimeout(Duration::from_secs(5)).status_code(), 408);
        assert_eq!(Error::SensorOffline.status_code(), 503);
        assert_eq!(Error::OutOfMemory(10).status_code(), 500);
    }

    #[test]
    fn reinit_message_names_profile() {
        let err = Error::ReinitFailed {
            width: 640,
            height: 480,
            reason: "bus error".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("640x480"));
        assert!(msg.contains("bus error"));
    }
}
