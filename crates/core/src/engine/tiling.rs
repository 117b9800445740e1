//! Tile grid planning: padding, tile enumeration and context-window extraction.

use ndarray::{s, Array3, ArrayView3};

use crate::config::TileGeometry;
use crate::types::Frame;

/// Top-left corner of a tile in padded-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub row: usize,
    pub col: usize,
}

/// The padding and tile layout for one frame size.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    geometry: TileGeometry,
    height: usize,
    width: usize,
    pad_h: usize,
    pad_w: usize,
}

/// Smallest non-negative amount that makes `dim` a multiple of `align`.
pub fn pad_amount(dim: usize, align: usize) -> usize {
    (align - dim % align) % align
}

impl TileGrid {
    pub fn plan(geometry: TileGeometry, height: usize, width: usize) -> Self {
        Self {
            geometry,
            height,
            width,
            pad_h: pad_amount(height, geometry.image_dim),
            pad_w: pad_amount(width, geometry.image_dim),
        }
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    /// Original `(height, width)`.
    pub fn frame_dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// `(height, width)` rounded up to whole tiles.
    pub fn aligned_dims(&self) -> (usize, usize) {
        (self.height + self.pad_h, self.width + self.pad_w)
    }

    /// Aligned dimensions plus the context margin on every side.
    pub fn padded_dims(&self) -> (usize, usize) {
        let margin = 2 * self.geometry.image_window_start;
        let (h, w) = self.aligned_dims();
        (h + margin, w + margin)
    }

    pub fn rows(&self) -> usize {
        self.aligned_dims().0 / self.geometry.image_dim
    }

    pub fn cols(&self) -> usize {
        self.aligned_dims().1 / self.geometry.image_dim
    }

    pub fn tile_count(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Tile corners in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let start = self.geometry.image_window_start;
        let step = self.geometry.image_dim;
        let cols = self.cols();
        (0..self.rows()).flat_map(move |r| {
            (0..cols).map(move |c| TileCoord {
                row: start + r * step,
                col: start + c * step,
            })
        })
    }

    /// Zero-filled copy of `frame` with the leading margin and trailing alignment padding.
    pub fn pad(&self, frame: &Frame) -> Array3<u8> {
        let (ph, pw) = self.padded_dims();
        let start = self.geometry.image_window_start;
        let mut padded = Array3::<u8>::zeros((ph, pw, frame.channels()));
        padded
            .slice_mut(s![start..start + self.height, start..start + self.width, ..])
            .assign(&frame.view());
        padded
    }

    pub fn tile<'a>(&self, padded: &'a Array3<u8>, coord: TileCoord) -> ArrayView3<'a, u8> {
        let dim = self.geometry.image_dim;
        padded.slice(s![coord.row..coord.row + dim, coord.col..coord.col + dim, ..])
    }

    /// `WINDOW_DIM x WINDOW_DIM x 2C` model input centered on `coord`.
    ///
    /// Samples stay in the raw `0..=255` range; the first frame's channels come first.
    pub fn context_window(
        &self,
        first: &Array3<u8>,
        second: &Array3<u8>,
        coord: TileCoord,
    ) -> Array3<f32> {
        let window = self.geometry.window_dim;
        let top = coord.row - self.geometry.image_window_start;
        let left = coord.col - self.geometry.image_window_start;
        let channels = first.dim().2;

        let mut out = Array3::<f32>::zeros((window, window, 2 * channels));
        let region = s![top..top + window, left..left + window, ..];
        out.slice_mut(s![.., .., ..channels])
            .assign(&first.slice(region).mapv(f32::from));
        out.slice_mut(s![.., .., channels..])
            .assign(&second.slice(region).mapv(f32::from));
        out
    }
}
