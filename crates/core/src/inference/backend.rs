//! Execution provider selection and `ort::Session` construction.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
        ExecutionProviderDispatch, TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Execution provider family used for the frame-prediction model.
///
/// `Tensorrt` also registers CUDA, so an engine build failure inside ONNX
/// Runtime still leaves a GPU path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    Cpu,
    Cuda,
    Tensorrt,
}

impl InferenceBackend {
    fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Tensorrt => "tensorrt",
        }
    }
}

impl std::str::FromStr for InferenceBackend {
    type Err = String;

    /// Case-insensitive; `gpu` and `trt` are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "tensorrt" | "trt" => Ok(Self::Tensorrt),
            other => Err(format!(
                "unknown inference backend '{other}' (expected cpu, cuda or tensorrt)"
            )),
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct SessionConfig<'a> {
    pub model_path: &'a Path,
    pub backend: InferenceBackend,
    pub trt_cache_dir: Option<&'a Path>,
}

const DEFAULT_TRT_CACHE_DIR: &str = "trt_cache";

fn providers_for(config: &SessionConfig<'_>) -> Vec<ExecutionProviderDispatch> {
    match config.backend {
        InferenceBackend::Cpu => vec![CPUExecutionProvider::default().build()],
        InferenceBackend::Cuda => {
            if !CUDAExecutionProvider::default().is_available().unwrap_or(false) {
                warn!("CUDA execution provider unavailable, ONNX Runtime will run on CPU");
            }
            vec![CUDAExecutionProvider::default().build()]
        }
        InferenceBackend::Tensorrt => {
            let cache_dir = config
                .trt_cache_dir
                .unwrap_or_else(|| Path::new(DEFAULT_TRT_CACHE_DIR));
            if let Err(e) = std::fs::create_dir_all(cache_dir) {
                warn!(dir = %cache_dir.display(), error = %e, "Cannot create TensorRT engine cache");
            }
            info!(
                cache_dir = %cache_dir.display(),
                "Building TensorRT session; an uncached engine takes minutes to compile"
            );
            vec![
                TensorRTExecutionProvider::default()
                    .with_engine_cache(true)
                    .with_engine_cache_path(cache_dir.to_string_lossy().into_owned())
                    .with_device_id(0)
                    .build(),
                CUDAExecutionProvider::default().build(),
            ]
        }
    }
}

/// Load `model_path` into a session on the configured execution providers.
pub fn build_session(config: &SessionConfig<'_>) -> Result<Session> {
    if !config.model_path.is_file() {
        anyhow::bail!("model file not found: {}", config.model_path.display());
    }

    let started = Instant::now();
    let providers = providers_for(config);
    debug!(backend = %config.backend, providers = providers.len(), "Creating inference session");

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?
        .commit_from_file(config.model_path)
        .with_context(|| format!("failed to load ONNX model {}", config.model_path.display()));

    let session = match session {
        Ok(session) => session,
        Err(err) => {
            error!(
                backend = %config.backend,
                elapsed_secs = started.elapsed().as_secs_f64(),
                error = %format!("{err:#}"),
                "Inference session initialization failed"
            );
            return Err(err);
        }
    };

    info!(
        backend = %config.backend,
        model = %config.model_path.display(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Inference session ready"
    );

    Ok(session)
}
