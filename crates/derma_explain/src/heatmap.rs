//! Spatial attention maps.

use derma_core::{CoreError, Result};
use ndarray::Array2;

/// A `(height, width)` grid of attention weights.
///
/// Heatmaps produced by [`GradCam`](crate::GradCam) are normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f32>,
}

impl Heatmap {
    /// Wrap a `(height, width)` array.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid is empty or holds non-finite values.
    pub fn new(values: Array2<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(CoreError::ShapeMismatch("heatmap has zero extent".into()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InferenceFailure("heatmap contains non-finite values".into()));
        }
        Ok(Self { values })
    }

    /// An all-zero heatmap.
    #[must_use]
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            values: Array2::zeros((height.max(1), width.max(1))),
        }
    }

    /// Grid height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Grid width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Value at row `y`, column `x`.
    #[must_use]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[[y, x]]
    }

    /// Raw values.
    #[must_use]
    pub const fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Smallest and largest value.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Min-max normalize into `[0, 1]`: `(h - min) / (max - min + eps)`.
    ///
    /// A uniform map becomes all zeros.
    #[must_use]
    pub fn normalized(&self, eps: f32) -> Self {
        let (lo, hi) = self.min_max();
        let denom = hi - lo + eps;
        Self {
            values: self.values.mapv(|v| ((v - lo) / denom).clamp(0.0, 1.0)),
        }
    }

    /// Resample to `(height, width)` with bilinear interpolation.
    ///
    /// Sample positions use pixel-centre alignment and clamp at the border, so
    /// values stay within the source range.
    #[must_use]
    pub fn resize_bilinear(&self, height: usize, width: usize) -> Self {
        let (src_h, src_w) = (self.height(), self.width());
        if (src_h, src_w) == (height, width) {
            return self.clone();
        }
        let scale_y = src_h as f32 / height.max(1) as f32;
        let scale_x = src_w as f32 / width.max(1) as f32;

        let axis = |dst: usize, scale: f32, len: usize| -> (usize, usize, f32) {
            let pos = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, (len - 1) as f32);
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            (lo, hi, pos - lo as f32)
        };

        let values = Array2::from_shape_fn((height.max(1), width.max(1)), |(y, x)| {
            let (y0, y1, fy) = axis(y, scale_y, src_h);
            let (x0, x1, fx) = axis(x, scale_x, src_w);
            let top = self.values[[y0, x0]] * (1.0 - fx) + self.values[[y0, x1]] * fx;
            let bottom = self.values[[y1, x0]] * (1.0 - fx) + self.values[[y1, x1]] * fx;
            top * (1.0 - fy) + bottom * fy
        });
        Self { values }
    }

    /// Whether every value lies in `[0, 1]`.
    #[must_use]
    pub fn is_unit_bounded(&self) -> bool {
        self.values.iter().all(|v| (0.0..=1.0).contains(v))
    }
}
