//! Per-tile motion test that decides between averaging and model prediction.

use ndarray::{Array3, ArrayView3, Zip};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileClass {
    /// Both sources sit close to their average, which is used as-is.
    LowMotion(Array3<u8>),
    NeedsPrediction,
}

/// Element-wise `(a + b) / 2`, rounded down.
pub fn average_patch(first: ArrayView3<'_, u8>, second: ArrayView3<'_, u8>) -> Array3<u8> {
    Zip::from(&first)
        .and(&second)
        .map_collect(|&a, &b| ((u16::from(a) + u16::from(b)) / 2) as u8)
}

/// Mean of squared per-sample differences.
pub fn mean_squared_distance(patch: ArrayView3<'_, u8>, average: ArrayView3<'_, u8>) -> f64 {
    let count = patch.len();
    if count == 0 {
        return 0.0;
    }
    let mut sum = 0u64;
    Zip::from(&patch).and(&average).for_each(|&a, &b| {
        let diff = u64::from(a.abs_diff(b));
        sum += diff * diff;
    });
    sum as f64 / count as f64
}

/// Both distances must be strictly below `threshold`. Identical patches are
/// always averaged, so a zero threshold still passes unchanged regions through.
pub fn classify(first: ArrayView3<'_, u8>, second: ArrayView3<'_, u8>, threshold: f64) -> TileClass {
    let average = average_patch(first, second);
    let first_distance = mean_squared_distance(first, average.view());
    let second_distance = mean_squared_distance(second, average.view());

    let identical = first_distance == 0.0 && second_distance == 0.0;
    if identical || (first_distance < threshold && second_distance < threshold) {
        TileClass::LowMotion(average)
    } else {
        TileClass::NeedsPrediction
    }
}
