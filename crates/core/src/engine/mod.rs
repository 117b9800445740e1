//! Tile-based frame interpolation.
//!
//! A pair of frames is padded and cut into `image_dim` tiles. Tiles whose
//! sources both sit close to their average are averaged; the rest are sent to
//! the [`Predictor`] together in a single batch. The resolved tiles are then
//! stitched back into a frame with the original dimensions.

pub mod assemble;
pub mod dispatch;
pub mod heuristic;
pub mod subdivide;
pub mod tiling;

use std::time::Instant;

use tracing::debug;

use self::dispatch::{resolve_tiles, TilePlan};
use self::heuristic::{classify, TileClass};
use self::tiling::TileGrid;
use crate::config::{EngineConfig, TileGeometry};
use crate::error::EngineResult;
use crate::inference::Predictor;
use crate::types::{ensure_same_shape, Frame};

pub use self::subdivide::{insert_frames, PairInterpolator};

/// Single-pair interpolation bound to one predictor and one validated configuration.
pub struct Interpolator<'p, P: Predictor + ?Sized> {
    predictor: &'p P,
    geometry: TileGeometry,
    threshold: f64,
}

impl<'p, P: Predictor + ?Sized> Interpolator<'p, P> {
    pub fn new(predictor: &'p P, config: &EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            predictor,
            geometry: config.geometry()?,
            threshold: config.threshold()?,
        })
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The temporal midpoint of `first` and `second`.
    pub fn interpolate(&self, first: &Frame, second: &Frame) -> EngineResult<Frame> {
        ensure_same_shape(first, second)?;
        let started = Instant::now();
        let (height, width, channels) = first.dim();

        let grid = TileGrid::plan(self.geometry, height, width);
        let padded_first = grid.pad(first);
        let padded_second = grid.pad(second);

        let tiles: Vec<_> = grid
            .coords()
            .map(|coord| {
                let plan = match classify(
                    grid.tile(&padded_first, coord),
                    grid.tile(&padded_second, coord),
                    self.threshold,
                ) {
                    TileClass::LowMotion(patch) => TilePlan::Averaged(patch),
                    TileClass::NeedsPrediction => TilePlan::Predicted(grid.context_window(
                        &padded_first,
                        &padded_second,
                        coord,
                    )),
                };
                (coord, plan)
            })
            .collect();

        let predicted = tiles
            .iter()
            .filter(|(_, plan)| matches!(plan, TilePlan::Predicted(_)))
            .count();
        let averaged = tiles.len() - predicted;

        let patches = resolve_tiles(self.predictor, tiles, &self.geometry, channels)?;
        let frame = assemble::assemble(&grid, channels, &patches)?;

        debug!(
            height,
            width,
            tiles = grid.tile_count(),
            averaged,
            predicted,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Interpolated frame pair"
        );

        Ok(frame)
    }

    /// `count` frames strictly between `first` and `last`.
    pub fn insert_frames(
        &self,
        first: &Frame,
        last: &Frame,
        count: usize,
    ) -> EngineResult<Vec<Frame>> {
        subdivide::insert_frames(self, first, last, count)
    }
}

impl<P: Predictor + ?Sized> PairInterpolator for Interpolator<'_, P> {
    fn interpolate_pair(&self, first: &Frame, second: &Frame) -> EngineResult<Frame> {
        self.interpolate(first, second)
    }
}
