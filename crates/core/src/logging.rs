use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    fs,
    io::Write,
    panic::{self, PanicHookInfo},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, OnceLock,
    },
    thread,
};

use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_NOISE_FILTER: &str =
    "ort=error,ffmpeg_probe_stderr=error,ffmpeg_decode_stderr=error,ffmpeg_encode_stderr=error";
pub const DEFAULT_LOG_RETENTION_FILES: usize = 14;
pub const LOG_DIR_NAME: &str = "logs";
pub const CRASH_DIR_NAME: &str = "crash";
pub const LOG_FILE_PREFIX: &str = "midframe";
pub const LOG_FILE_SUFFIX: &str = "log";

/// Tracing targets that carry raw ffmpeg stderr.
pub const FFMPEG_TARGETS: [&str; 3] = [
    "ffmpeg_probe_stderr",
    "ffmpeg_decode_stderr",
    "ffmpeg_encode_stderr",
];

static CRASH_HOOK_INSTALL_LOCK: Mutex<()> = Mutex::new(());
static CRASH_HOOK_DIR: OnceLock<PathBuf> = OnceLock::new();
static CRASH_WRITE_IN_PROGRESS: AtomicBool = AtomicBool::new(false);
static CRASH_ARTIFACT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Inputs for choosing filters and the file sink location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub data_dir: Option<PathBuf>,
    pub verbose: u8,
    pub cli_filter: Option<String>,
    pub rust_log_env: Option<String>,
    pub noise_filter: String,
    pub retention_files: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            verbose: 0,
            cli_filter: None,
            rust_log_env: None,
            noise_filter: DEFAULT_NOISE_FILTER.to_string(),
            retention_files: DEFAULT_LOG_RETENTION_FILES,
        }
    }
}

/// `EnvFilter` directive strings for each layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilters {
    pub user: String,
    pub console: String,
    pub file: String,
}

#[derive(Debug)]
pub enum FileSink {
    Ready {
        log_dir: PathBuf,
        appender: RollingFileAppender,
    },
    Disabled {
        attempted_log_dir: Option<PathBuf>,
        reason: String,
    },
}

impl FileSink {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn log_dir(&self) -> Option<&Path> {
        match self {
            Self::Ready { log_dir, .. } => Some(log_dir),
            Self::Disabled {
                attempted_log_dir, ..
            } => attempted_log_dir.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashHookStatus {
    Installed { crash_dir: PathBuf },
    AlreadyInstalled { crash_dir: PathBuf },
    Disabled { reason: String },
}

#[derive(Debug)]
struct CrashReport {
    timestamp: chrono::DateTime<chrono::Utc>,
    thread_name: String,
    location: String,
    payload: String,
    backtrace_status: String,
    backtrace: String,
}

/// Filter priority: `--log-filter`, then `-v`/`-vv`, then `RUST_LOG`, then `info`.
///
/// The noise filter only applies when the user did not pick a filter
/// explicitly. The file layer keeps ffmpeg stderr at debug either way.
pub fn compose_filters(options: &LogOptions) -> LogFilters {
    let user = if let Some(filter) = options.cli_filter.as_deref() {
        filter.to_string()
    } else if options.verbose >= 2 {
        "trace".to_string()
    } else if options.verbose == 1 {
        "debug".to_string()
    } else if let Some(filter) = options.rust_log_env.as_deref() {
        filter.to_string()
    } else {
        DEFAULT_LOG_FILTER.to_string()
    };

    let implicit = options.cli_filter.is_none() && options.verbose == 0;
    let noise = options.noise_filter.trim();
    if !implicit || noise.is_empty() {
        return LogFilters {
            console: user.clone(),
            file: user.clone(),
            user,
        };
    }

    LogFilters {
        console: format!("{noise},{user}"),
        file: format!("{},{user}", file_noise_filter(noise)),
        user,
    }
}

/// Rewrite ffmpeg targets in `noise` to `debug` and append any that are missing.
fn file_noise_filter(noise: &str) -> String {
    let mut directives: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for directive in noise.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let target = directive.split_once('=').map(|(t, _)| t.trim());
        match target {
            Some(target) if FFMPEG_TARGETS.contains(&target) => {
                if !seen.contains(&target) {
                    directives.push(format!("{target}=debug"));
                    seen.push(target);
                }
            }
            _ => directives.push(directive.to_string()),
        }
    }

    for target in FFMPEG_TARGETS {
        if !seen.contains(&target) {
            directives.push(format!("{target}=debug"));
        }
    }

    directives.join(",")
}

/// Daily rolling log file under `<data_dir>/logs`.
pub fn build_file_sink(options: &LogOptions) -> FileSink {
    let retention = if options.retention_files == 0 {
        DEFAULT_LOG_RETENTION_FILES
    } else {
        options.retention_files
    };

    let Some(data_dir) = options.data_dir.as_deref() else {
        return FileSink::Disabled {
            attempted_log_dir: None,
            reason: "file logging disabled: no data directory".to_string(),
        };
    };

    let log_dir = data_dir.join(LOG_DIR_NAME);
    if let Err(error) = fs::create_dir_all(&log_dir) {
        return FileSink::Disabled {
            attempted_log_dir: Some(log_dir),
            reason: format!("failed to create log directory: {error}"),
        };
    }

    let built = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(retention)
        .build(&log_dir);

    match built {
        Ok(appender) => FileSink::Ready { log_dir, appender },
        Err(error) => FileSink::Disabled {
            attempted_log_dir: Some(log_dir),
            reason: format!("failed to initialize rolling log file: {error}"),
        },
    }
}

/// Chain a panic hook that records a crash report under `<data_dir>/logs/crash`.
pub fn install_crash_hook(data_dir: Option<&Path>) -> CrashHookStatus {
    if let Some(crash_dir) = CRASH_HOOK_DIR.get() {
        return CrashHookStatus::AlreadyInstalled {
            crash_dir: crash_dir.clone(),
        };
    }

    let Some(data_dir) = data_dir else {
        return CrashHookStatus::Disabled {
            reason: "crash reports disabled: no data directory".to_string(),
        };
    };

    let crash_dir = data_dir.join(LOG_DIR_NAME).join(CRASH_DIR_NAME);
    if let Err(error) = fs::create_dir_all(&crash_dir) {
        return CrashHookStatus::Disabled {
            reason: format!(
                "failed to create crash directory {}: {error}",
                crash_dir.display()
            ),
        };
    }

    let _guard = CRASH_HOOK_INSTALL_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = CRASH_HOOK_DIR.get() {
        return CrashHookStatus::AlreadyInstalled {
            crash_dir: existing.clone(),
        };
    }

    let previous = panic::take_hook();
    let hook_dir = crash_dir.clone();
    panic::set_hook(Box::new(move |info| {
        record_crash(&hook_dir, info);
        previous(info);
    }));

    let _ = CRASH_HOOK_DIR.set(crash_dir.clone());
    CrashHookStatus::Installed { crash_dir }
}

fn record_crash(crash_dir: &Path, info: &PanicHookInfo<'_>) {
    if CRASH_WRITE_IN_PROGRESS
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        write_crash_report(crash_dir, &crash_report(info))
    }));
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => eprintln!(
            "Warning: failed to write crash report under '{}': {error}",
            crash_dir.display()
        ),
        Err(_) => eprintln!(
            "Warning: crash hook panicked while writing under '{}'",
            crash_dir.display()
        ),
    }

    CRASH_WRITE_IN_PROGRESS.store(false, Ordering::Release);
}

fn crash_report(info: &PanicHookInfo<'_>) -> CrashReport {
    let backtrace = Backtrace::capture();
    let (backtrace_status, backtrace) = match backtrace.status() {
        BacktraceStatus::Captured => ("captured".to_string(), backtrace.to_string()),
        BacktraceStatus::Disabled => (
            "disabled (set RUST_BACKTRACE=1 to enable)".to_string(),
            "<disabled>".to_string(),
        ),
        _ => ("unsupported".to_string(), "<unavailable>".to_string()),
    };

    CrashReport {
        timestamp: chrono::Utc::now(),
        thread_name: thread::current().name().unwrap_or("<unnamed>").to_string(),
        location: info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "<unknown>".to_string()),
        payload: payload_text(info.payload()),
        backtrace_status,
        backtrace,
    }
}

fn write_crash_report(crash_dir: &Path, report: &CrashReport) -> std::io::Result<PathBuf> {
    fs::create_dir_all(crash_dir)?;

    let sequence = CRASH_ARTIFACT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let path = crash_dir.join(format!(
        "panic-{}-{sequence:06}.log",
        report.timestamp.format("%Y%m%d-%H%M%S-%f")
    ));

    let mut file = fs::File::create(&path)?;
    writeln!(file, "timestamp_utc={}", report.timestamp.to_rfc3339())?;
    writeln!(file, "thread={}", report.thread_name)?;
    writeln!(file, "location={}", report.location)?;
    writeln!(file, "payload={}", report.payload)?;
    writeln!(file, "backtrace_status={}", report.backtrace_status)?;
    writeln!(file, "backtrace:")?;
    writeln!(file, "{}", report.backtrace)?;
    file.flush()?;

    Ok(path)
}

fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn cli_filter_wins_over_everything() {
        let options = LogOptions {
            verbose: 2,
            cli_filter: Some("midframe_core=trace".to_string()),
            rust_log_env: Some("error".to_string()),
            ..Default::default()
        };

        let filters = compose_filters(&options);
        assert_eq!(filters.user, "midframe_core=trace");
        assert_eq!(filters.console, "midframe_core=trace");
        assert_eq!(filters.file, "midframe_core=trace");
    }

    #[test]
    fn verbosity_maps_to_debug_and_trace() {
        let debug = LogOptions {
            verbose: 1,
            rust_log_env: Some("warn".to_string()),
            ..Default::default()
        };
        let trace = LogOptions {
            verbose: 3,
            ..Default::default()
        };

        assert_eq!(compose_filters(&debug).console, "debug");
        assert_eq!(compose_filters(&trace).console, "trace");
    }

    #[test]
    fn rust_log_is_used_with_noise_filter() {
        let options = LogOptions {
            rust_log_env: Some("warn,midframe_core=debug".to_string()),
            ..Default::default()
        };

        let filters = compose_filters(&options);
        assert_eq!(filters.user, "warn,midframe_core=debug");
        assert_eq!(
            filters.console,
            format!("{DEFAULT_NOISE_FILTER},warn,midframe_core=debug")
        );
    }

    #[test]
    fn file_filter_keeps_ffmpeg_stderr_at_debug() {
        let filters = compose_filters(&LogOptions::default());
        assert_eq!(filters.console, format!("{DEFAULT_NOISE_FILTER},info"));
        assert_eq!(
            filters.file,
            "ort=error,ffmpeg_probe_stderr=debug,ffmpeg_decode_stderr=debug,ffmpeg_encode_stderr=debug,info"
        );
    }

    #[test]
    fn file_filter_adds_missing_ffmpeg_targets() {
        let options = LogOptions {
            noise_filter: "ort=error".to_string(),
            ..Default::default()
        };

        let filters = compose_filters(&options);
        assert_eq!(filters.console, "ort=error,info");
        assert_eq!(
            filters.file,
            "ort=error,ffmpeg_probe_stderr=debug,ffmpeg_decode_stderr=debug,ffmpeg_encode_stderr=debug,info"
        );
    }

    #[test]
    fn empty_noise_filter_is_ignored() {
        let options = LogOptions {
            noise_filter: "  ".to_string(),
            ..Default::default()
        };
        let filters = compose_filters(&options);
        assert_eq!(filters.console, "info");
        assert_eq!(filters.file, "info");
    }

    #[test]
    fn file_sink_lives_under_data_dir_logs() {
        let data_dir = tempdir().expect("tempdir");
        let options = LogOptions {
            data_dir: Some(data_dir.path().to_path_buf()),
            ..Default::default()
        };

        let sink = build_file_sink(&options);
        assert!(sink.is_ready(), "expected ready sink, got {sink:?}");
        assert_eq!(sink.log_dir(), Some(data_dir.path().join(LOG_DIR_NAME).as_path()));
        assert!(data_dir.path().join(LOG_DIR_NAME).is_dir());
    }

    #[test]
    fn file_sink_disabled_without_data_dir() {
        let sink = build_file_sink(&LogOptions::default());
        assert!(!sink.is_ready());
        assert_eq!(sink.log_dir(), None);
    }

    #[test]
    fn file_sink_disabled_when_log_dir_cannot_be_created() {
        let not_a_dir = NamedTempFile::new().expect("temp file");
        let options = LogOptions {
            data_dir: Some(not_a_dir.path().to_path_buf()),
            ..Default::default()
        };

        match build_file_sink(&options) {
            FileSink::Ready { .. } => panic!("expected disabled sink"),
            FileSink::Disabled {
                attempted_log_dir,
                reason,
            } => {
                assert_eq!(attempted_log_dir, Some(not_a_dir.path().join(LOG_DIR_NAME)));
                assert!(reason.contains("failed to create log directory"));
            }
        }
    }

    #[test]
    fn crash_report_file_has_every_section() {
        let crash_dir = tempdir().expect("tempdir");
        let report = CrashReport {
            timestamp: chrono::Utc::now(),
            thread_name: "worker".to_string(),
            location: "src/engine/mod.rs:10:5".to_string(),
            payload: "boom".to_string(),
            backtrace_status: "captured".to_string(),
            backtrace: "frames".to_string(),
        };

        let path = write_crash_report(crash_dir.path(), &report).expect("write report");
        let contents = fs::read_to_string(&path).expect("read report");

        assert!(path.starts_with(crash_dir.path()));
        assert!(contents.contains("timestamp_utc="));
        assert!(contents.contains("thread=worker"));
        assert!(contents.contains("location=src/engine/mod.rs:10:5"));
        assert!(contents.contains("payload=boom"));
        assert!(contents.contains("backtrace_status=captured"));
        assert!(contents.contains("frames"));
    }

    #[test]
    fn payload_text_handles_common_payloads() {
        let str_payload: &(dyn Any + Send) = &"boom";
        let string_payload: &(dyn Any + Send) = &"kaboom".to_string();
        let int_payload: &(dyn Any + Send) = &7_u8;

        assert_eq!(payload_text(str_payload), "boom");
        assert_eq!(payload_text(string_payload), "kaboom");
        assert_eq!(payload_text(int_payload), "<non-string panic payload>");
    }
}
