use std::io::Read;
use std::path::Path;
use std::process::{Child, Stdio};
use std::thread::JoinHandle;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use super::probe::VideoInfo;
use crate::types::Frame;

const CHANNELS: usize = 3;

/// ffmpeg decode subprocess yielding `rgb24` frames scaled to a fixed size.
pub struct VideoDecoder {
    child: Child,
    width: u32,
    height: u32,
    frame_size: usize,
    buf: Vec<u8>,
    stderr_thread: Option<JoinHandle<()>>,
    done: bool,
}

pub fn build_decoder_args(path: &Path, stream_index: usize, width: u32, height: u32) -> Vec<String> {
    vec![
        "-nostdin".to_string(),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-map".to_string(),
        format!("0:{stream_index}"),
        "-vf".to_string(),
        format!("scale={width}:{height}"),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "pipe:1".to_string(),
    ]
}

impl VideoDecoder {
    /// Start decoding `path`, normalizing every frame to `width x height`.
    pub fn new(path: &Path, info: &VideoInfo, width: u32, height: u32) -> Result<Self> {
        let args = build_decoder_args(path, info.stream_index, width, height);
        let frame_size = width as usize * height as usize * CHANNELS;

        let mut child = crate::runtime::command_for("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to launch ffmpeg, is it installed?")?;

        let stderr = child
            .stderr
            .take()
            .context("ffmpeg decoder stderr not captured")?;
        let stderr_thread = super::drain_stderr(stderr, |line| {
            debug!(target: "ffmpeg_decode_stderr", "{line}");
        });

        debug!(
            path = %path.display(),
            source_width = info.width,
            source_height = info.height,
            width,
            height,
            "FFmpeg decoder started"
        );

        Ok(Self {
            child,
            width,
            height,
            frame_size,
            buf: vec![0u8; frame_size],
            stderr_thread: Some(stderr_thread),
            done: false,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut filled = 0;
        while filled < self.frame_size {
            match stdout.read(&mut self.buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    warn!(
                        "partial frame at EOF ({filled}/{} bytes), discarding",
                        self.frame_size
                    );
                    return Ok(None);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("failed to read frame from ffmpeg stdout"),
            }
        }

        let frame = Frame::from_rgb_bytes(
            self.buf.clone(),
            self.width as usize,
            self.height as usize,
            CHANNELS,
        )?;
        Ok(Some(frame))
    }

    /// Wait for ffmpeg to exit and report a failed decode.
    pub fn finish(&mut self) -> Result<()> {
        let status = self.child.wait().context("failed to wait for ffmpeg")?;
        if !status.success() {
            bail!("ffmpeg decoder exited with status {}", status);
        }
        Ok(())
    }
}

impl Iterator for VideoDecoder {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}
