use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Used when the container does not report a usable frame rate.
pub const FALLBACK_FRAME_RATE: f64 = 23.976;

#[derive(Deserialize, Debug)]
pub struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize, Debug)]
struct FfprobeStream {
    index: usize,
    codec_name: Option<String>,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    disposition: HashMap<String, serde_json::Value>,
}

/// What the resampling pipelines need to know about the source video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub stream_index: usize,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec_name: String,
    pub frame_count: Option<u64>,
}

/// Parse `"num/den"` or a plain decimal. Zero or negative rates count as unknown.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn disposition_flag(stream: &FfprobeStream, key: &str) -> bool {
    stream
        .disposition
        .get(key)
        .and_then(|value| value.as_i64().map(|n| n != 0).or_else(|| value.as_bool()))
        .unwrap_or(false)
}

/// Lowest-index default video stream, skipping cover art.
fn primary_video_stream(streams: &[FfprobeStream]) -> Option<&FfprobeStream> {
    streams
        .iter()
        .filter(|stream| stream.codec_type.as_deref() == Some("video"))
        .min_by_key(|stream| {
            (
                disposition_flag(stream, "attached_pic"),
                !disposition_flag(stream, "default"),
                stream.index,
            )
        })
}

pub fn parse_ffprobe_json(json: &[u8]) -> Result<FfprobeOutput> {
    serde_json::from_slice(json).context("failed to parse ffprobe JSON output")
}

pub fn video_info(probe: &FfprobeOutput) -> Result<VideoInfo> {
    let stream = primary_video_stream(&probe.streams).context("no video stream found")?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        bail!("video stream {} does not report its dimensions", stream.index);
    };

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(FALLBACK_FRAME_RATE);

    Ok(VideoInfo {
        stream_index: stream.index,
        width,
        height,
        fps,
        codec_name: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        frame_count: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
    })
}

/// Run `ffprobe` on `path` and describe its primary video stream.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    if !path.is_file() {
        bail!("input video not found: {}", path.display());
    }

    let output = crate::runtime::command_for("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to execute ffprobe, is FFmpeg installed?")?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|line| !line.is_empty()) {
        debug!(target: "ffmpeg_probe_stderr", "{}", line);
    }

    if !output.status.success() {
        bail!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        );
    }

    let info = video_info(&parse_ffprobe_json(&output.stdout)?)?;
    debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        codec = %info.codec_name,
        frames = ?info.frame_count,
        "Probed input video"
    );
    Ok(info)
}
