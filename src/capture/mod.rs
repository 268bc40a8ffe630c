pub mod decoder;
pub mod frame;
pub mod resolution;
pub mod sensor;
pub mod store;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use decoder::{decode_jpeg, DecodedImage};
pub use frame::{Frame, FrameMetadata};
pub use resolution::{Direction, ResolutionController, ResolutionProfile, ResolutionTable};
pub use sensor::{DriverError, SensorConfig, SensorDriver, SensorFrame, SensorMode, SharedSensor};
pub use store::FrameStore;
pub use synthetic::SyntheticSensor;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Sensor;
