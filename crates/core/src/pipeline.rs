//! Frame-rate resampling over a frame source and a [`FrameSink`].
//!
//! Sources are any iterator of `Result<Frame>`, so a [`VideoDecoder`](crate::video::VideoDecoder)
//! and an in-memory `Vec` plug in the same way.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use crate::engine::subdivide::{insert_frames, PairInterpolator};
use crate::error::EngineError;
use crate::types::Frame;

const PROGRESS_EVERY: u64 = 100;

/// Ordered destination for output frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResampleSummary {
    pub frames_read: u64,
    pub frames_written: u64,
    /// Intermediates produced by interpolation (zero when downsampling).
    pub frames_generated: u64,
}

impl ResampleSummary {
    /// Achieved output/input frame-count ratio.
    pub fn ratio(&self) -> f64 {
        if self.frames_read == 0 {
            0.0
        } else {
            self.frames_written as f64 / self.frames_read as f64
        }
    }
}

/// Raise the frame rate by an integer `factor`.
///
/// The first source frame is written as-is; every following frame is
/// preceded by `factor - 1` frames interpolated between it and its predecessor.
pub fn upsample<S, K, I>(
    source: S,
    sink: &mut K,
    interpolator: &I,
    factor: u32,
) -> Result<ResampleSummary>
where
    S: IntoIterator<Item = Result<Frame>>,
    K: FrameSink + ?Sized,
    I: PairInterpolator + ?Sized,
{
    if factor <= 1 {
        return Err(EngineError::invalid_config(format!(
            "upsampling factor must be greater than 1, got {factor}"
        ))
        .into());
    }

    let started = Instant::now();
    let per_gap = (factor - 1) as usize;
    let mut summary = ResampleSummary::default();
    let mut previous: Option<Frame> = None;

    for frame in source {
        let frame = frame?;
        summary.frames_read += 1;

        if let Some(previous) = previous.as_ref() {
            for intermediate in insert_frames(interpolator, previous, &frame, per_gap)? {
                sink.write_frame(&intermediate)?;
                summary.frames_generated += 1;
                summary.frames_written += 1;
            }
        }

        sink.write_frame(&frame)?;
        summary.frames_written += 1;
        previous = Some(frame);

        if summary.frames_read % PROGRESS_EVERY == 0 {
            info!(
                frames_read = summary.frames_read,
                frames_written = summary.frames_written,
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Upsampling progress"
            );
        }
    }

    sink.finish()?;

    info!(
        factor,
        frames_read = summary.frames_read,
        frames_written = summary.frames_written,
        frames_generated = summary.frames_generated,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Upsampling complete"
    );
    Ok(summary)
}

/// Lower the frame rate by a factor in `(0, 1]`.
///
/// Source frames are counted from 1. With `period = 1 / factor`, a slot is
/// emitted whenever `count % period < 1`; the slot takes the previous frame
/// when the remainder exceeds one half and a previous frame exists, otherwise
/// the current one.
pub fn downsample<S, K>(source: S, sink: &mut K, factor: f64) -> Result<ResampleSummary>
where
    S: IntoIterator<Item = Result<Frame>>,
    K: FrameSink + ?Sized,
{
    if !(factor > 0.0 && factor <= 1.0) {
        return Err(EngineError::invalid_config(format!(
            "downsampling factor must be in (0, 1], got {factor}"
        ))
        .into());
    }

    let started = Instant::now();
    let period = 1.0 / factor;
    let mut summary = ResampleSummary::default();
    let mut previous: Option<Frame> = None;

    for frame in source {
        let frame = frame?;
        summary.frames_read += 1;

        let remainder = summary.frames_read as f64 % period;
        if remainder < 1.0 {
            match previous.as_ref() {
                Some(previous) if remainder > 0.5 => sink.write_frame(previous)?,
                _ => sink.write_frame(&frame)?,
            }
            summary.frames_written += 1;
        }
        previous = Some(frame);

        if summary.frames_read % PROGRESS_EVERY == 0 {
            debug!(
                frames_read = summary.frames_read,
                frames_written = summary.frames_written,
                "Downsampling progress"
            );
        }
    }

    sink.finish()?;

    info!(
        factor,
        frames_read = summary.frames_read,
        frames_written = summary.frames_written,
        achieved_ratio = summary.ratio(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Downsampling complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use std::cell::Cell;

    fn gray(value: u8) -> Frame {
        Frame::filled(4, 4, 3, value).unwrap()
    }

    fn source(values: &[u8]) -> Vec<Result<Frame>> {
        values.iter().map(|&v| Ok(gray(v))).collect()
    }

    fn values(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.view()[[0, 0, 0]]).collect()
    }

    fn midpoint(a: &Frame, b: &Frame) -> EngineResult<Frame> {
        let mid = (u16::from(a.view()[[0, 0, 0]]) + u16::from(b.view()[[0, 0, 0]])) / 2;
        Frame::filled(4, 4, 3, mid as u8)
    }

    struct FinishTracker {
        frames: Vec<Frame>,
        finished: bool,
    }

    impl FrameSink for FinishTracker {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            assert!(!self.finished, "write after finish");
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    #[test]
    fn upsample_doubles_frame_count_minus_one() {
        let mut sink = FinishTracker {
            frames: Vec::new(),
            finished: false,
        };
        let summary = upsample(source(&[0, 100, 200]), &mut sink, &midpoint, 2).unwrap();

        assert_eq!(values(&sink.frames), vec![0, 50, 100, 150, 200]);
        assert!(sink.finished);
        assert_eq!(
            summary,
            ResampleSummary {
                frames_read: 3,
                frames_written: 5,
                frames_generated: 2,
            }
        );
    }

    #[test]
    fn upsample_factor_four_inserts_three_per_gap() {
        let mut sink: Vec<Frame> = Vec::new();
        let summary = upsample(source(&[0, 240]), &mut sink, &midpoint, 4).unwrap();

        assert_eq!(values(&sink), vec![0, 60, 120, 180, 240]);
        assert_eq!(summary.frames_generated, 3);
    }

    #[test]
    fn upsample_rejects_factor_one() {
        let calls = Cell::new(0usize);
        let counting = |a: &Frame, _b: &Frame| -> EngineResult<Frame> {
            calls.set(calls.get() + 1);
            Ok(a.clone())
        };
        let mut sink: Vec<Frame> = Vec::new();

        let err = upsample(source(&[0, 1]), &mut sink, &counting, 1).unwrap_err();
        assert!(err.to_string().contains("greater than 1"));
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidConfig(_))
        ));
        assert!(sink.is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn upsample_single_frame_source_writes_it_once() {
        let mut sink: Vec<Frame> = Vec::new();
        let summary = upsample(source(&[7]), &mut sink, &midpoint, 3).unwrap();
        assert_eq!(values(&sink), vec![7]);
        assert_eq!(summary.frames_generated, 0);
    }

    #[test]
    fn upsample_propagates_source_errors() {
        let frames = vec![Ok(gray(0)), Err(anyhow::anyhow!("decode failed"))];
        let mut sink: Vec<Frame> = Vec::new();
        let err = upsample(frames, &mut sink, &midpoint, 2).unwrap_err();
        assert!(err.to_string().contains("decode failed"));
    }

    #[test]
    fn downsample_half_keeps_every_second_frame() {
        let mut sink: Vec<Frame> = Vec::new();
        let summary = downsample(source(&[1, 2, 3, 4, 5, 6]), &mut sink, 0.5).unwrap();

        assert_eq!(values(&sink), vec![2, 4, 6]);
        assert_eq!(summary.frames_read, 6);
        assert_eq!(summary.frames_written, 3);
        assert_eq!(summary.ratio(), 0.5);
    }

    #[test]
    fn downsample_factor_one_is_identity() {
        let mut sink: Vec<Frame> = Vec::new();
        downsample(source(&[1, 2, 3]), &mut sink, 1.0).unwrap();
        assert_eq!(values(&sink), vec![1, 2, 3]);
    }

    #[test]
    fn downsample_uses_previous_frame_for_late_slots() {
        // period 5/3: slots open at count 2 (r = 1/3) and count 4 (r = 2/3, takes frame 3);
        // 5 % period rounds to just under the period, so count 5 opens nothing
        let mut sink: Vec<Frame> = Vec::new();
        downsample(source(&[1, 2, 3, 4, 5]), &mut sink, 0.6).unwrap();
        assert_eq!(values(&sink), vec![2, 3]);
    }

    #[test]
    fn downsample_quarter_keeps_every_fourth_frame() {
        let mut sink: Vec<Frame> = Vec::new();
        let summary = downsample(source(&[1, 2, 3, 4, 5, 6, 7, 8]), &mut sink, 0.25).unwrap();
        assert_eq!(values(&sink), vec![4, 8]);
        assert_eq!(summary.ratio(), 0.25);
    }

    #[test]
    fn downsample_slot_on_the_half_keeps_current_frame() {
        // period 2.5: remainders 0.5, 0 and 0.5 at counts 3, 5 and 8 are exact
        let mut sink: Vec<Frame> = Vec::new();
        downsample(source(&[1, 2, 3, 4, 5, 6, 7, 8]), &mut sink, 0.4).unwrap();
        assert_eq!(values(&sink), vec![3, 5, 8]);
    }

    #[test]
    fn downsample_rejects_out_of_range_factor() {
        for factor in [0.0, -0.5, 1.5, f64::NAN] {
            let mut sink: Vec<Frame> = Vec::new();
            assert!(
                downsample(source(&[1, 2]), &mut sink, factor).is_err(),
                "factor {factor} should be rejected"
            );
        }
    }

    #[test]
    fn summary_ratio_of_empty_run_is_zero() {
        assert_eq!(ResampleSummary::default().ratio(), 0.0);
    }
}
