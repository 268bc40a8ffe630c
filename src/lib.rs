pub mod capture;
pub mod config;
pub mod error;
pub mod node;
pub mod pipeline;

pub use capture::{Direction, Frame, FrameStore, ResolutionController, ResolutionProfile};
pub use config::Config;
pub use error::{Error, Result};
pub use node::Node;
pub use pipeline::{InferenceEngine, InferenceResult, RunningStats};
