//! The batched inference contract the engine consumes, plus its ONNX Runtime implementation.

pub mod backend;
pub mod onnx;

use ndarray::{Array4, ArrayView4};

use crate::error::PredictorError;

pub use onnx::OnnxPredictor;

/// Batched tile-level frame prediction.
///
/// Input is `[N, WINDOW_DIM, WINDOW_DIM, 2C]` (first frame's channels, then the
/// second frame's), output is `[N, MODEL_OUTPUT_DIM, MODEL_OUTPUT_DIM, C]` in the
/// same order. Implementations are built once at startup and passed to the
/// engine by reference; `predict` must not change observable state.
pub trait Predictor {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>, PredictorError>;
}

impl<F> Predictor for F
where
    F: Fn(ArrayView4<'_, f32>) -> Result<Array4<f32>, PredictorError>,
{
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>, PredictorError> {
        self(batch)
    }
}
