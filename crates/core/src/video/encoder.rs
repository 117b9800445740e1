use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::OutputConfig;
use crate::pipeline::FrameSink;
use crate::types::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub output_path: PathBuf,
    pub codec: String,
    pub crf: u32,
    pub pixel_format: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl EncoderConfig {
    pub fn new(output: &OutputConfig, output_path: &Path, width: u32, height: u32, fps: f64) -> Self {
        Self {
            output_path: output_path.to_path_buf(),
            codec: output.codec.clone(),
            crf: output.crf,
            pixel_format: output.pixel_format.clone(),
            width,
            height,
            fps,
        }
    }

    pub fn build_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-nostdin".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-r".into(),
            format_frame_rate(self.fps),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            self.codec.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-pix_fmt".into(),
            self.pixel_format.clone(),
            self.output_path.to_string_lossy().into_owned(),
        ]
    }

    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Shortest decimal that keeps six fractional digits of precision.
pub fn format_frame_rate(fps: f64) -> String {
    let text = format!("{fps:.6}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// ffmpeg encode subprocess fed `rgb24` frames through stdin. Killed on drop.
pub struct VideoEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    frames_written: u64,
    output_path: PathBuf,
}

impl VideoEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        let args = config.build_ffmpeg_args();
        debug!(cmd = %format!("ffmpeg {}", args.join(" ")), "launching FFmpeg encoder");

        let mut child = crate::runtime::command_for("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to launch ffmpeg, is it installed?")?;

        let stdin = child.stdin.take().context("failed to open ffmpeg stdin")?;
        let stderr = child
            .stderr
            .take()
            .context("ffmpeg encoder stderr not captured")?;
        let stderr_thread = super::drain_stderr(stderr, |line| {
            debug!(target: "ffmpeg_encode_stderr", "{line}");
        });

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr_thread: Some(stderr_thread),
            width: config.width,
            height: config.height,
            frames_written: 0,
            output_path: config.output_path.clone(),
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for VideoEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let expected = (self.height as usize, self.width as usize, 3);
        if frame.dim() != expected {
            bail!(
                "frame shape mismatch: encoder expects {:?}, got {:?}",
                expected,
                frame.dim()
            );
        }

        let stdin = self.stdin.as_mut().context("encoder stdin already closed")?;
        let pixels = frame.view();
        let written = match pixels.as_slice() {
            Some(bytes) => stdin.write_all(bytes),
            None => stdin.write_all(&frame.to_rgb_bytes()),
        };
        written.context("failed to write frame to ffmpeg stdin")?;

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());

        let status = self.child.wait().context("failed to wait for ffmpeg")?;
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
        if !status.success() {
            bail!("ffmpeg encoder exited with status {}", status);
        }

        debug!(
            output = %self.output_path.display(),
            frames = self.frames_written,
            "FFmpeg encoder finished"
        );
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EncoderConfig {
        EncoderConfig::new(
            &OutputConfig::default(),
            Path::new("/out/clip_u.mp4"),
            320,
            240,
            59.94,
        )
    }

    #[test]
    fn encoder_args_read_rgb24_from_stdin() {
        let args = config().build_ffmpeg_args();
        let joined = args.join(" ");

        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 320x240 -r 59.94 -i pipe:0"));
        assert!(joined.contains("-c:v libx264 -crf 18 -pix_fmt yuv420p"));
        assert_eq!(args.last().map(String::as_str), Some("/out/clip_u.mp4"));
    }

    #[test]
    fn frame_size_is_packed_rgb() {
        assert_eq!(config().frame_size(), 320 * 240 * 3);
    }

    #[test]
    fn frame_rate_formatting_drops_trailing_zeros() {
        assert_eq!(format_frame_rate(60.0), "60");
        assert_eq!(format_frame_rate(11.988), "11.988");
        assert_eq!(format_frame_rate(30000.0 / 1001.0 * 2.0), "59.94006");
    }
}
