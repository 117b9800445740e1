//! Batched model calls for tiles the heuristic could not average.

use ndarray::{s, stack, Array3, ArrayView3, Axis};

use super::tiling::TileCoord;
use crate::config::TileGeometry;
use crate::error::PredictorError;
use crate::inference::Predictor;

/// How a single tile gets its intermediate patch.
#[derive(Debug, Clone)]
pub enum TilePlan {
    Averaged(Array3<u8>),
    /// Context window waiting for the model.
    Predicted(Array3<f32>),
}

/// Context windows queued for one predictor call, in submission order.
#[derive(Debug, Default)]
pub struct InferenceBatch {
    windows: Vec<Array3<f32>>,
}

impl InferenceBatch {
    pub fn push(&mut self, window: Array3<f32>) {
        self.windows.push(window);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Run the whole batch through `predictor` and return one cropped patch per window.
    ///
    /// An empty batch returns without touching the predictor.
    pub fn dispatch<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        geometry: &TileGeometry,
        channels: usize,
    ) -> Result<Vec<Array3<u8>>, PredictorError> {
        if self.windows.is_empty() {
            return Ok(Vec::new());
        }

        let views: Vec<ArrayView3<'_, f32>> = self.windows.iter().map(|w| w.view()).collect();
        let batch = stack(Axis(0), &views)?;
        let output = predictor.predict(batch.view())?;

        let expected_len = self.windows.len();
        let model = geometry.model_output_dim;
        let shape = output.shape();
        if shape[0] != expected_len {
            return Err(PredictorError::BatchSizeMismatch {
                expected: expected_len,
                got: shape[0],
            });
        }
        if shape[1..] != [model, model, channels] {
            return Err(PredictorError::OutputShapeMismatch {
                expected: [expected_len, model, model, channels],
                got: shape.to_vec(),
            });
        }

        let lo = geometry.image_model_start;
        let hi = lo + geometry.image_dim;
        output
            .outer_iter()
            .enumerate()
            .map(|(index, prediction)| {
                let patch = prediction.slice(s![lo..hi, lo..hi, ..]);
                if patch.iter().any(|v| !v.is_finite()) {
                    return Err(PredictorError::NonFiniteOutput { index });
                }
                Ok(patch.mapv(|v| v.clamp(0.0, 255.0) as u8))
            })
            .collect()
    }
}

/// Turn every planned tile into a final patch, keeping the input order.
pub fn resolve_tiles<P: Predictor + ?Sized>(
    predictor: &P,
    tiles: Vec<(TileCoord, TilePlan)>,
    geometry: &TileGeometry,
    channels: usize,
) -> Result<Vec<(TileCoord, Array3<u8>)>, PredictorError> {
    let mut batch = InferenceBatch::default();
    let mut slots = Vec::with_capacity(tiles.len());
    for (coord, plan) in tiles {
        match plan {
            TilePlan::Averaged(patch) => slots.push((coord, Some(patch))),
            TilePlan::Predicted(window) => {
                batch.push(window);
                slots.push((coord, None));
            }
        }
    }

    let queued = batch.len();
    let mut predicted = batch.dispatch(predictor, geometry, channels)?.into_iter();

    slots
        .into_iter()
        .map(|(coord, patch)| match patch {
            Some(patch) => Ok((coord, patch)),
            None => predicted
                .next()
                .map(|patch| (coord, patch))
                .ok_or(PredictorError::BatchSizeMismatch {
                    expected: queued,
                    got: queued.saturating_sub(1),
                }),
        })
        .collect()
}
