use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use midframe_core::logging::{install_crash_hook, CrashHookStatus, CRASH_DIR_NAME, LOG_DIR_NAME};
use tempfile::tempdir;

const CHILD_MODE_ENV: &str = "MIDFRAME_CRASH_CHILD_MODE";
const CHILD_DATA_DIR_ENV: &str = "MIDFRAME_CRASH_CHILD_DATA_DIR";

fn run_crashing_child(mode: &str, data_dir: &Path) -> std::process::Output {
    Command::new(std::env::current_exe().expect("test executable path"))
        .arg("crash_hook_child_entrypoint")
        .arg("--exact")
        .arg("--nocapture")
        .env(CHILD_MODE_ENV, mode)
        .env(CHILD_DATA_DIR_ENV, data_dir)
        .output()
        .expect("run crashing child")
}

fn crash_reports(crash_dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(crash_dir)
        .expect("read crash directory")
        .map(|entry| entry.expect("crash directory entry").path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("log"))
        .collect();
    paths.sort();
    paths
}

#[test]
fn crash_hook_child_entrypoint() {
    let Ok(mode) = std::env::var(CHILD_MODE_ENV) else {
        return;
    };
    let data_dir = PathBuf::from(std::env::var(CHILD_DATA_DIR_ENV).expect("data dir env"));

    assert!(matches!(
        install_crash_hook(Some(&data_dir)),
        CrashHookStatus::Installed { .. } | CrashHookStatus::AlreadyInstalled { .. }
    ));
    assert!(matches!(
        install_crash_hook(Some(&data_dir)),
        CrashHookStatus::AlreadyInstalled { .. }
    ));

    match mode.as_str() {
        "write_report" => panic!("deliberate crash for report test"),
        "unwritable" => {
            let crash_dir = data_dir.join(LOG_DIR_NAME).join(CRASH_DIR_NAME);
            if crash_dir.exists() {
                fs::remove_dir_all(&crash_dir).expect("remove crash directory");
            }
            fs::write(&crash_dir, b"not a directory").expect("replace crash dir with a file");
            panic!("deliberate crash with unwritable crash dir");
        }
        other => panic!("unknown child mode: {other}"),
    }
}

#[test]
fn crash_hook_writes_report() {
    let data_dir = tempdir().expect("tempdir");
    let output = run_crashing_child("write_report", data_dir.path());
    assert!(!output.status.success(), "child should panic");

    let reports = crash_reports(&data_dir.path().join(LOG_DIR_NAME).join(CRASH_DIR_NAME));
    let newest = reports.last().expect("a crash report should exist");
    let contents = fs::read_to_string(newest).expect("read crash report");

    assert!(contents.contains("timestamp_utc="));
    assert!(contents.contains("payload=deliberate crash for report test"));
    assert!(contents.contains("location="));
    assert!(contents.contains("backtrace_status="));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("thread panicked while panicking"));
}

#[test]
fn crash_hook_warns_when_crash_dir_is_unwritable() {
    let data_dir = tempdir().expect("tempdir");
    let output = run_crashing_child("unwritable", data_dir.path());
    assert!(!output.status.success(), "child should panic");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("deliberate crash with unwritable crash dir"));
    assert!(stderr.contains("Warning: failed to write crash report under"));
    assert!(!stderr.contains("thread panicked while panicking"));
}
