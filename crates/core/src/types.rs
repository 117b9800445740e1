use ndarray::{Array3, ArrayView3};

use crate::error::{EngineError, EngineResult};

/// A decoded video frame: HWC, one `u8` sample per channel.
///
/// Frames are immutable once built. Storage as `u8` keeps every sample finite
/// and inside `[0, 255]`; the fallible constructors reject anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Array3<u8>,
}

impl Frame {
    pub fn new(pixels: Array3<u8>) -> EngineResult<Self> {
        let (h, w, c) = pixels.dim();
        if h == 0 || w == 0 || c == 0 {
            return Err(EngineError::malformed_frame(format!(
                "frame has an empty dimension ({h}x{w}x{c})"
            )));
        }
        Ok(Self { pixels })
    }

    /// A frame filled with a single value, mostly useful for tests and padding.
    pub fn filled(height: usize, width: usize, channels: usize, value: u8) -> EngineResult<Self> {
        Self::new(Array3::from_elem((height, width, channels), value))
    }

    /// Wrap packed interleaved bytes (e.g. ffmpeg `rgb24` output).
    pub fn from_rgb_bytes(
        data: Vec<u8>,
        width: usize,
        height: usize,
        channels: usize,
    ) -> EngineResult<Self> {
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(EngineError::malformed_frame(format!(
                "data length mismatch: expected {expected} ({height}x{width}x{channels}), got {}",
                data.len()
            )));
        }
        let pixels = Array3::from_shape_vec((height, width, channels), data)
            .map_err(|e| EngineError::malformed_frame(e.to_string()))?;
        Self::new(pixels)
    }

    /// Quantize float samples, rejecting NaN/inf and anything outside `[0, 255]`.
    pub fn from_f32(samples: ArrayView3<'_, f32>) -> EngineResult<Self> {
        if let Some(bad) = samples
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 255.0)
        {
            return Err(EngineError::malformed_frame(format!(
                "sample {bad} is not a finite value in [0, 255]"
            )));
        }
        Self::new(samples.mapv(|v| v as u8))
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }

    /// `(height, width, channels)`
    pub fn dim(&self) -> (usize, usize, usize) {
        self.pixels.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    /// Packed row-major bytes, ready to be piped into an encoder.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().copied().collect()
    }

    pub fn into_array(self) -> Array3<u8> {
        self.pixels
    }
}

/// Reject a pair that cannot be interpolated against each other.
pub fn ensure_same_shape(first: &Frame, second: &Frame) -> EngineResult<()> {
    if first.dim() != second.dim() {
        return Err(EngineError::FrameMismatch {
            first: first.dim(),
            second: second.dim(),
        });
    }
    Ok(())
}
