//! Recursive bisection that fills a gap between two frames with `count` intermediates.

use crate::error::EngineResult;
use crate::types::Frame;

/// Anything that can produce the temporal midpoint of two frames.
pub trait PairInterpolator {
    fn interpolate_pair(&self, first: &Frame, second: &Frame) -> EngineResult<Frame>;
}

impl<F> PairInterpolator for F
where
    F: Fn(&Frame, &Frame) -> EngineResult<Frame>,
{
    fn interpolate_pair(&self, first: &Frame, second: &Frame) -> EngineResult<Frame> {
        self(first, second)
    }
}

/// Produce exactly `count` frames strictly between `first` and `last`, in temporal order.
///
/// Each level interpolates the current pair once and splits the remaining
/// count around that midpoint, so `count` pair interpolations run in total.
///
/// Midpoints are stored as u8 before they become endpoints of the next level,
/// so each level of a deep recursion can drift by up to 1 LSB from a float carry.
pub fn insert_frames<I: PairInterpolator + ?Sized>(
    interpolator: &I,
    first: &Frame,
    last: &Frame,
    count: usize,
) -> EngineResult<Vec<Frame>> {
    let mut frames = Vec::with_capacity(count);
    fill_between(interpolator, first, last, count, &mut frames)?;
    Ok(frames)
}

fn fill_between<I: PairInterpolator + ?Sized>(
    interpolator: &I,
    first: &Frame,
    last: &Frame,
    count: usize,
    out: &mut Vec<Frame>,
) -> EngineResult<()> {
    if count == 0 {
        return Ok(());
    }

    let left = (count - 1) / 2;
    let middle = interpolator.interpolate_pair(first, last)?;
    fill_between(interpolator, first, &middle, left, out)?;
    let right_start = out.len();
    fill_between(interpolator, &middle, last, count - 1 - left, out)?;
    out.insert(right_start, middle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn gray(value: u8) -> Frame {
        Frame::filled(2, 2, 1, value).unwrap()
    }

    fn value_of(frame: &Frame) -> u8 {
        frame.view()[[0, 0, 0]]
    }

    #[test]
    fn zero_count_performs_no_interpolation() {
        let calls = Cell::new(0usize);
        let interp = |a: &Frame, _b: &Frame| -> EngineResult<Frame> {
            calls.set(calls.get() + 1);
            Ok(a.clone())
        };

        let frames = insert_frames(&interp, &gray(0), &gray(240), 0).unwrap();
        assert!(frames.is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn five_frames_follow_bisection_order() {
        let calls = Cell::new(0usize);
        let midpoint = |a: &Frame, b: &Frame| -> EngineResult<Frame> {
            calls.set(calls.get() + 1);
            let mid = (u16::from(value_of(a)) + u16::from(value_of(b))) / 2;
            Ok(gray(mid as u8))
        };

        let frames = insert_frames(&midpoint, &gray(0), &gray(240), 5).unwrap();
        let values: Vec<u8> = frames.iter().map(value_of).collect();

        // M = 120; two frames in (0, 120): 60 then 90; two in (120, 240): 180 then 210
        assert_eq!(values, vec![60, 90, 120, 180, 210]);
        assert_eq!(calls.get(), 5);
    }

    #[test]
    fn count_matches_request_for_small_values() {
        for count in 0..12 {
            let calls = Cell::new(0usize);
            let midpoint = |a: &Frame, b: &Frame| -> EngineResult<Frame> {
                calls.set(calls.get() + 1);
                let mid = (u16::from(value_of(a)) + u16::from(value_of(b))) / 2;
                Ok(gray(mid as u8))
            };

            let frames = insert_frames(&midpoint, &gray(0), &gray(255), count).unwrap();
            assert_eq!(frames.len(), count);
            assert_eq!(calls.get(), count);

            let values: Vec<u8> = frames.iter().map(value_of).collect();
            assert!(
                values.windows(2).all(|pair| pair[0] <= pair[1]),
                "frames out of order for count {count}: {values:?}"
            );
        }
    }

    #[test]
    fn interpolation_failure_aborts_request() {
        let calls = Cell::new(0usize);
        let failing = |a: &Frame, b: &Frame| -> EngineResult<Frame> {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                return Err(crate::error::EngineError::FrameMismatch {
                    first: a.dim(),
                    second: b.dim(),
                });
            }
            Ok(a.clone())
        };

        assert!(insert_frames(&failing, &gray(0), &gray(240), 3).is_err());
        assert_eq!(calls.get(), 2);
    }
}
