use ndarray::{s, Array3};

use super::tiling::{TileCoord, TileGrid};
use crate::error::EngineResult;
use crate::types::Frame;

/// Write resolved patches onto a zeroed padded canvas and crop back to the frame size.
pub fn assemble(
    grid: &TileGrid,
    channels: usize,
    patches: &[(TileCoord, Array3<u8>)],
) -> EngineResult<Frame> {
    let (ph, pw) = grid.padded_dims();
    let dim = grid.geometry().image_dim;
    let mut canvas = Array3::<u8>::zeros((ph, pw, channels));

    for (coord, patch) in patches {
        canvas
            .slice_mut(s![coord.row..coord.row + dim, coord.col..coord.col + dim, ..])
            .assign(patch);
    }

    let start = grid.geometry().image_window_start;
    let (h, w) = grid.frame_dims();
    Frame::new(canvas.slice(s![start..start + h, start..start + w, ..]).to_owned())
}
