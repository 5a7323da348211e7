//! Blending a heatmap onto its source image.

use image::{Rgb, RgbImage};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::heatmap::Heatmap;

/// Configuration for [`Compositor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Weight of the heatmap overlay.
    pub alpha: f32,
    /// Color channel receiving the heatmap (0 = red).
    pub channel: usize,
    /// Number of intensity levels the heatmap is quantized to.
    pub levels: f32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            channel: 0,
            levels: 255.0,
        }
    }
}

/// An `H x W x 3` image with every sample in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Visualization {
    values: Array3<f32>,
}

impl Visualization {
    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.values.dim().0
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.values.dim().1
    }

    /// Raw `(H, W, 3)` samples.
    #[must_use]
    pub const fn values(&self) -> &Array3<f32> {
        &self.values
    }

    /// Convert to display form, `round(v * 255)`.
    #[must_use]
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb(std::array::from_fn(|c| {
                (self.values[[y, x, c]] * 255.0).round().clamp(0.0, 255.0) as u8
            }))
        })
    }
}

/// Overlays a heatmap as a single-channel intensity tint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    config: CompositorConfig,
}

impl Compositor {
    /// Create from config.
    #[must_use]
    pub const fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    /// `clip(image / 255 + alpha * tint, 0, 1)`, where `tint` carries the
    /// quantized heatmap in the configured channel and zero elsewhere.
    ///
    /// The heatmap is resampled to the image size first when needed.
    ///
    /// # Panics
    ///
    /// Panics if the configured channel is not 0, 1 or 2.
    #[must_use]
    pub fn composite(&self, image: &RgbImage, heatmap: &Heatmap) -> Visualization {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let heatmap = heatmap.resize_bilinear(height, width);
        assert!(self.config.channel < 3, "overlay channel {} out of range", self.config.channel);
        assert_eq!((heatmap.height(), heatmap.width()), (height, width));

        let levels = self.config.levels;
        let alpha = self.config.alpha;
        let values = Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            let base = f32::from(image.get_pixel(x as u32, y as u32).0[c]) / 255.0;
            let tint = if c == self.config.channel {
                (levels * heatmap.get(y, x).clamp(0.0, 1.0)).floor() / levels
            } else {
                0.0
            };
            (base + alpha * tint).clamp(0.0, 1.0)
        });
        Visualization { values }
    }
}
