//! Error types for the interpolation engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a single-pair interpolation or the request containing it.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Tile/window/model sizes or thresholds that cannot form a valid grid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// A frame buffer that cannot enter the engine at all.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Two frames that cannot be interpolated against each other.
    #[error("frame pair mismatch: first is {first:?}, second is {second:?} (height, width, channels)")]
    FrameMismatch {
        first: (usize, usize, usize),
        second: (usize, usize, usize),
    },

    #[error("predictor failed: {0}")]
    Predictor(#[from] PredictorError),
}

impl EngineError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}

/// Failures raised by a [`Predictor`](crate::inference::Predictor) implementation
/// or detected while validating its output.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("ONNX Runtime error: {0}")]
    Session(#[from] ort::Error),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("predictor returned {got} outputs for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, got: usize },

    #[error("predictor output shape {got:?} does not match expected {expected:?}")]
    OutputShapeMismatch {
        expected: [usize; 4],
        got: Vec<usize>,
    },

    #[error("predictor output contains non-finite values (batch index {index})")]
    NonFiniteOutput { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_error_converts_into_engine_error() {
        let error: EngineError = PredictorError::BatchSizeMismatch {
            expected: 4,
            got: 3,
        }
        .into();

        assert!(matches!(error, EngineError::Predictor(_)));
        assert_eq!(
            error.to_string(),
            "predictor failed: predictor returned 3 outputs for a batch of 4"
        );
    }

    #[test]
    fn frame_mismatch_reports_both_shapes() {
        let error = EngineError::FrameMismatch {
            first: (240, 320, 3),
            second: (240, 321, 3),
        };
        let message = error.to_string();
        assert!(message.contains("(240, 320, 3)"));
        assert!(message.contains("(240, 321, 3)"));
    }
}
