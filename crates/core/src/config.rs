use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::inference::backend::InferenceBackend;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "MIDFRAME_DATA_DIR";

pub const DEFAULT_IMAGE_DIM: usize = 50;
pub const DEFAULT_WINDOW_DIM: usize = 80;
pub const DEFAULT_MODEL_OUTPUT_DIM: usize = 76;
pub const DEFAULT_AVERAGE_THRESHOLD: f64 = 150.0;
pub const DEFAULT_FRAME_WIDTH: u32 = 320;
pub const DEFAULT_FRAME_HEIGHT: u32 = 240;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub frame: FrameConfig,
    pub model: ModelConfig,
    pub paths: PathsConfig,
    pub output: OutputConfig,
}

/// Tile, context-window and model sizes plus the averaging threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub image_dim: usize,
    pub window_dim: usize,
    pub model_output_dim: usize,
    pub average_threshold: f64,
}

/// Resolution every decoded frame is normalized to before entering the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub backend: InferenceBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub models_dir: PathBuf,
    pub trt_cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub codec: String,
    pub crf: u32,
    pub pixel_format: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_dim: DEFAULT_IMAGE_DIM,
            window_dim: DEFAULT_WINDOW_DIM,
            model_output_dim: DEFAULT_MODEL_OUTPUT_DIM,
            average_threshold: DEFAULT_AVERAGE_THRESHOLD,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model80_76.onnx"),
            backend: InferenceBackend::default(),
            input_name: None,
            output_name: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            trt_cache_dir: PathBuf::from("trt_cache"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: 18,
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Tile geometry with every derived offset precomputed.
///
/// Only obtainable through [`EngineConfig::geometry`], so holding one means
/// the sizes were validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub image_dim: usize,
    pub window_dim: usize,
    pub model_output_dim: usize,
    /// Margin between a context window edge and its tile.
    pub image_window_start: usize,
    /// Margin between a context window edge and the model output.
    pub model_window_start: usize,
    /// Crop margin applied to every prediction.
    pub image_model_start: usize,
}

impl EngineConfig {
    pub fn geometry(&self) -> EngineResult<TileGeometry> {
        let (image, window, model) = (self.image_dim, self.window_dim, self.model_output_dim);

        if image == 0 {
            return Err(EngineError::invalid_config("image_dim must be positive"));
        }
        if window < image {
            return Err(EngineError::invalid_config(format!(
                "window_dim ({window}) must not be smaller than image_dim ({image})"
            )));
        }
        if model < image {
            return Err(EngineError::invalid_config(format!(
                "model_output_dim ({model}) must not be smaller than image_dim ({image})"
            )));
        }
        if model > window {
            return Err(EngineError::invalid_config(format!(
                "model_output_dim ({model}) must not exceed window_dim ({window})"
            )));
        }
        if (window - image) % 2 != 0 {
            return Err(EngineError::invalid_config(format!(
                "window_dim - image_dim ({}) must split into two equal margins",
                window - image
            )));
        }
        if (model - image) % 2 != 0 {
            return Err(EngineError::invalid_config(format!(
                "model_output_dim - image_dim ({}) must split into two equal margins",
                model - image
            )));
        }

        Ok(TileGeometry {
            image_dim: image,
            window_dim: window,
            model_output_dim: model,
            image_window_start: (window - image) / 2,
            model_window_start: (window - model) / 2,
            image_model_start: (model - image) / 2,
        })
    }

    pub fn threshold(&self) -> EngineResult<f64> {
        let threshold = self.average_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EngineError::invalid_config(format!(
                "average_threshold must be a finite non-negative number, got {threshold}"
            )));
        }
        Ok(threshold)
    }
}

impl FrameConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::invalid_config(format!(
                "frame resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("config path does not have a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Model file location with relative paths anchored at `models_dir`.
    pub fn model_path(&self, data_dir: &Path) -> PathBuf {
        let models_dir = resolve_relative_to(data_dir, &self.paths.models_dir);
        resolve_relative_to(&models_dir, &self.model.path)
    }

    pub fn trt_cache_dir(&self, data_dir: &Path) -> PathBuf {
        resolve_relative_to(data_dir, &self.paths.trt_cache_dir)
    }

    /// Check every startup-fatal rule before any frame is decoded.
    pub fn validate(&self) -> EngineResult<()> {
        self.engine.geometry()?;
        self.engine.threshold()?;
        self.frame.validate()
    }
}

/// Resolve the data directory: CLI override, then `MIDFRAME_DATA_DIR`, then `./data`.
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Create the data directory and a default config.toml if either is missing.
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}

/// Absolute paths pass through, relative ones are joined onto `base`.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
