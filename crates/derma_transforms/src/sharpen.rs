//! Unsharp-mask sharpening.

use derma_core::{CoreError, ImageFilter, Result};
use image::{Rgb, Rgb32FImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

/// Configuration for [`UnsharpMask`].
///
/// `out = clamp(weight * image + blur_weight * blur(image) + offset)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpenConfig {
    /// Whether the filter runs at all.
    pub enabled: bool,
    /// Gaussian sigma of the blur.
    pub sigma: f32,
    /// Weight of the original image.
    pub weight: f32,
    /// Weight of the blurred image.
    pub blur_weight: f32,
    /// Constant added to every sample.
    pub offset: f32,
}

impl Default for SharpenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sigma: 2.0,
            weight: 1.5,
            blur_weight: -0.5,
            offset: 0.0,
        }
    }
}

/// Sharpens by subtracting a Gaussian-blurred copy.
#[derive(Debug, Clone)]
pub struct UnsharpMask {
    config: SharpenConfig,
}

impl UnsharpMask {
    /// Create with sigma 2.0 and weights (1.5, -0.5).
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(SharpenConfig::default())
    }

    /// Create from config.
    #[must_use]
    pub fn from_config(config: SharpenConfig) -> Self {
        Self { config }
    }
}

impl Default for UnsharpMask {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFilter for UnsharpMask {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
        let c = &self.config;
        if !(c.sigma.is_finite() && c.sigma > 0.0) {
            return Err(CoreError::degraded(self.name(), format!("invalid sigma {}", c.sigma)));
        }
        // Blur in f32 so a flat region stays exactly flat.
        let samples = Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
            Rgb(image.get_pixel(x, y).0.map(f32::from))
        });
        let blurred = gaussian_blur_f32(&samples, c.sigma);
        Ok(RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let a = image.get_pixel(x, y).0;
            let b = blurred.get_pixel(x, y).0;
            Rgb(std::array::from_fn(|i| {
                let v = c.weight * f32::from(a[i]) + c.blur_weight * b[i] + c.offset;
                v.round().clamp(0.0, 255.0) as u8
            }))
        }))
    }

    fn name(&self) -> &str {
        "UnsharpMask"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_unchanged() {
        let img = RgbImage::from_pixel(16, 12, Rgb([90, 120, 200]));
        let out = UnsharpMask::new().apply(&img).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_edge_contrast_increases() {
        let img = RgbImage::from_fn(20, 8, |x, _| if x < 10 { Rgb([80; 3]) } else { Rgb([160; 3]) });
        let out = UnsharpMask::new().apply(&img).unwrap();

        assert_eq!(out.dimensions(), img.dimensions());
        assert!(out.get_pixel(9, 4).0[0] < 80);
        assert!(out.get_pixel(10, 4).0[0] > 160);
    }

    #[test]
    fn test_output_clipped() {
        let img = RgbImage::from_fn(10, 4, |x, _| if x < 5 { Rgb([0; 3]) } else { Rgb([255; 3]) });
        let out = UnsharpMask::new().apply(&img).unwrap();
        assert_eq!(out.get_pixel(4, 2).0[0], 0);
        assert_eq!(out.get_pixel(5, 2).0[0], 255);
    }

    #[test]
    fn test_invalid_sigma() {
        let f = UnsharpMask::from_config(SharpenConfig {
            sigma: 0.0,
            ..Default::default()
        });
        assert!(f.apply(&RgbImage::new(4, 4)).is_err());
    }
}
