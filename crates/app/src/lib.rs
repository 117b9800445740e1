use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use midframe_core::config::{config_path, data_dir, initialize_data_dir, AppConfig};
use midframe_core::engine::Interpolator;
use midframe_core::inference::backend::InferenceBackend;
use midframe_core::inference::OnnxPredictor;
use midframe_core::logging::{self, CrashHookStatus, FileSink, LogOptions, DEFAULT_LOG_FILTER};
use midframe_core::pipeline::{self, ResampleSummary};
use midframe_core::video::{self, EncoderConfig, VideoDecoder, VideoEncoder};

const DEFAULT_UP_OUTPUT: &str = "clip_u.mp4";
const DEFAULT_DOWN_OUTPUT: &str = "clip_d.mp4";

#[derive(Parser, Debug)]
#[command(name = "midframe", about = "Frame-rate resampling with tile-based frame interpolation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true, help = "Data directory holding config.toml, models and logs")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Raise the frame rate by an integer factor using interpolated frames
    Up(UpArgs),
    /// Lower the frame rate by a factor in (0, 1]
    Down(DownArgs),
}

#[derive(Args, Debug)]
struct UpArgs {
    #[arg(help = "Input video")]
    input: PathBuf,
    #[arg(short, long, help = "Frame-rate multiplier, must be at least 2")]
    factor: u32,
    #[arg(short, long, default_value = DEFAULT_UP_OUTPUT)]
    output: PathBuf,
    #[arg(long, help = "ONNX model path (overrides [model] path)")]
    model: Option<PathBuf>,
    #[arg(long, help = "Averaging threshold (overrides [engine] average_threshold)")]
    threshold: Option<f64>,
    #[arg(long, value_name = "cpu|cuda|tensorrt", help = "Inference backend")]
    backend: Option<InferenceBackend>,
}

#[derive(Args, Debug)]
struct DownArgs {
    #[arg(help = "Input video")]
    input: PathBuf,
    #[arg(short, long, help = "Fraction of frames to keep, in (0, 1]")]
    factor: f64,
    #[arg(short, long, default_value = DEFAULT_DOWN_OUTPUT)]
    output: PathBuf,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    midframe_core::runtime::setup_runtime_libs();
    init_logging(&resolved_data_dir, cli.verbose, cli.log_filter.as_deref());
    midframe_core::runtime::log_runtime_lib_status();

    info!(
        pid = std::process::id(),
        data_dir = %resolved_data_dir.display(),
        config_path = %config_path(&resolved_data_dir).display(),
        "Runtime startup metadata"
    );

    let mut config = load_config(&resolved_data_dir);
    match cli.command {
        Commands::Up(args) => {
            apply_up_overrides(&mut config, &args);
            config.validate()?;
            run_up(&config, &resolved_data_dir, &args).map(|_| ())
        }
        Commands::Down(args) => {
            config.validate()?;
            run_down(&config, &args).map(|_| ())
        }
    }
}

fn load_config(data_dir: &Path) -> AppConfig {
    if let Err(e) = initialize_data_dir(data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    match AppConfig::load_from_path(&config_path(data_dir)) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Failed to load config file, using defaults");
            AppConfig::default()
        }
    }
}

fn apply_up_overrides(config: &mut AppConfig, args: &UpArgs) {
    if let Some(threshold) = args.threshold {
        config.engine.average_threshold = threshold;
    }
    if let Some(backend) = args.backend {
        config.model.backend = backend;
    }
}

fn run_up(config: &AppConfig, data_dir: &Path, args: &UpArgs) -> Result<ResampleSummary> {
    let info = video::probe(&args.input)?;
    let (width, height) = (config.frame.width, config.frame.height);
    let output_fps = info.fps * f64::from(args.factor);

    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| config.model_path(data_dir));
    let predictor = OnnxPredictor::load(&config.model, &model_path, &config.trt_cache_dir(data_dir))?;
    let interpolator = Interpolator::new(&predictor, &config.engine)?;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        factor = args.factor,
        source_fps = info.fps,
        output_fps,
        "Upsampling video"
    );

    let mut decoder = VideoDecoder::new(&args.input, &info, width, height)?;
    let mut encoder = VideoEncoder::new(&EncoderConfig::new(
        &config.output,
        &args.output,
        width,
        height,
        output_fps,
    ))?;

    let summary = pipeline::upsample(&mut decoder, &mut encoder, &interpolator, args.factor)
        .with_context(|| format!("failed to upsample {}", args.input.display()))?;
    decoder.finish()?;
    Ok(summary)
}

fn run_down(config: &AppConfig, args: &DownArgs) -> Result<ResampleSummary> {
    let info = video::probe(&args.input)?;
    let (width, height) = (config.frame.width, config.frame.height);
    let output_fps = info.fps * args.factor;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        factor = args.factor,
        source_fps = info.fps,
        output_fps,
        "Downsampling video"
    );

    let mut decoder = VideoDecoder::new(&args.input, &info, width, height)?;
    let mut encoder = VideoEncoder::new(&EncoderConfig::new(
        &config.output,
        &args.output,
        width,
        height,
        output_fps,
    ))?;

    let summary = pipeline::downsample(&mut decoder, &mut encoder, args.factor)
        .with_context(|| format!("failed to downsample {}", args.input.display()))?;
    decoder.finish()?;
    Ok(summary)
}

fn init_logging(data_dir: &Path, verbose: u8, cli_log_filter: Option<&str>) {
    let crash_hook = logging::install_crash_hook(Some(data_dir));

    let options = LogOptions {
        data_dir: Some(data_dir.to_path_buf()),
        verbose,
        cli_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let filters = logging::compose_filters(&options);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(parse_env_filter_with_fallback(&filters.console, "console"));

    let file_warning = match logging::build_file_sink(&options) {
        FileSink::Ready { appender, .. } => {
            let subscriber = tracing_subscriber::registry().with(console_layer).with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender)
                    .with_filter(parse_env_filter_with_fallback(&filters.file, "file")),
            );
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("Failed to initialize tracing subscriber: {error}");
                return;
            }
            None
        }
        FileSink::Disabled {
            attempted_log_dir,
            reason,
        } => {
            let subscriber = tracing_subscriber::registry().with(console_layer);
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("Failed to initialize tracing subscriber: {error}");
                return;
            }
            Some((attempted_log_dir, reason))
        }
    };

    if let Some((attempted_log_dir, reason)) = file_warning {
        warn!(
            attempted_log_dir = ?attempted_log_dir,
            reason = %reason,
            "File logging unavailable, continuing with console only"
        );
    }
    if let CrashHookStatus::Disabled { reason } = crash_hook {
        warn!(reason = %reason, "Crash reports unavailable");
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}
