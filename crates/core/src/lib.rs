//! Tile-based frame interpolation and frame-rate resampling.

pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod runtime;
pub mod types;
pub mod video;

pub use engine::Interpolator;
pub use error::{EngineError, EngineResult, PredictorError};
pub use inference::Predictor;
pub use types::Frame;
