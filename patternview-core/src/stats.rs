//! Summary statistics for a pattern frame.

use ndarray::ArrayView2;
use serde::Serialize;

/// Statistics over the pixels of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FrameStatistics {
    pub rows: usize,
    pub cols: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub sum: f64,
    /// Number of pixels exactly equal to zero (gaps and masked pixels).
    pub zero_pixels: usize,
}

impl FrameStatistics {
    /// Computes statistics over a frame. Empty frames yield all-zero values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_view(frame: ArrayView2<'_, f32>) -> Self {
        let (rows, cols) = frame.dim();
        if frame.is_empty() {
            return Self {
                rows,
                cols,
                ..Self::default()
            };
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut zero_pixels = 0usize;
        for &v in &frame {
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
            if v == 0.0 {
                zero_pixels += 1;
            }
        }

        Self {
            rows,
            cols,
            min,
            max,
            mean: sum / frame.len() as f64,
            sum,
            zero_pixels,
        }
    }
}
