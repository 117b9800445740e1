use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use ndarray::{Array4, ArrayView4, Ix4};
use ort::{session::Session, value::TensorRef};
use tracing::debug;

use super::backend::{build_session, SessionConfig};
use super::Predictor;
use crate::config::ModelConfig;
use crate::error::PredictorError;

/// A frame-prediction model served by ONNX Runtime.
///
/// `Session::run` takes `&mut self`, so the session sits behind a mutex even
/// though nothing about the model changes after loading.
pub struct OnnxPredictor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxPredictor {
    pub fn load(model: &ModelConfig, model_path: &Path, trt_cache_dir: &Path) -> Result<Self> {
        debug!(
            model = %model_path.display(),
            backend = %model.backend,
            "Loading ONNX frame-prediction model"
        );

        let session = build_session(&SessionConfig {
            model_path,
            backend: model.backend,
            trt_cache_dir: Some(trt_cache_dir),
        })?;

        let inputs: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let outputs: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let input_name = resolve_tensor_name("input", model.input_name.as_deref(), &inputs)?;
        let output_name = resolve_tensor_name("output", model.output_name.as_deref(), &outputs)?;

        debug!(%input_name, %output_name, "Detected model IO");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

/// The configured tensor name when it exists in the model, else the model's first tensor.
fn resolve_tensor_name(kind: &str, configured: Option<&str>, available: &[String]) -> Result<String> {
    match configured {
        Some(name) if available.iter().any(|candidate| candidate == name) => Ok(name.to_string()),
        Some(name) => bail!(
            "configured {kind} '{name}' not found in model (available: {})",
            available.join(", ")
        ),
        None => available
            .first()
            .cloned()
            .with_context(|| format!("model declares no {kind}s")),
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>, PredictorError> {
        let started = Instant::now();
        let batch = batch.as_standard_layout();
        let tensor = TensorRef::from_array_view(batch.view())?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PredictorError::Unavailable("session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                PredictorError::Unavailable(format!("model produced no output named '{}'", self.output_name))
            })?
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix4>()?;

        debug!(
            batch = batch.shape()[0],
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Predictor batch complete"
        );

        Ok(output)
    }
}
