//! ffmpeg-backed frame source and sink.

pub mod decoder;
pub mod encoder;
pub mod probe;

pub use decoder::VideoDecoder;
pub use encoder::{EncoderConfig, VideoEncoder};
pub use probe::{probe, VideoInfo};

use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};

/// Forward every non-empty stderr line of an ffmpeg child to `log` until EOF.
pub(crate) fn drain_stderr<R, F>(stderr: R, log: F) -> JoinHandle<()>
where
    R: Read + Send + 'static,
    F: Fn(&str) + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) if line.is_empty() => {}
                Ok(line) => log(&line),
                Err(e) => {
                    log(&format!("stderr read error: {e}"));
                    break;
                }
            }
        }
    })
}
