//! Hair artifact removal.
//!
//! Thin dark structures are isolated with a morphological black-hat on the
//! luminance channel, thresholded into a mask and inpainted.

use derma_core::{CoreError, ImageFilter, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::morphology::{grayscale_close, Mask};
use serde::{Deserialize, Serialize};

use crate::inpaint::inpaint_telea;

/// Configuration for [`HairRemoval`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HairRemovalConfig {
    /// Whether the filter runs at all.
    pub enabled: bool,
    /// Side of the square structuring element, in pixels (odd).
    pub kernel_size: u32,
    /// Black-hat responses strictly above this become hair.
    pub threshold: u8,
    /// Inpainting neighbourhood radius, in pixels.
    pub inpaint_radius: f32,
}

impl Default for HairRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 17,
            threshold: 10,
            inpaint_radius: 1.0,
        }
    }
}

/// Removes hair by black-hat masking and Telea inpainting.
#[derive(Debug, Clone)]
pub struct HairRemoval {
    config: HairRemovalConfig,
}

impl HairRemoval {
    /// Create with the default 17x17 element, threshold 10 and radius 1.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(HairRemovalConfig::default())
    }

    /// Create from config.
    #[must_use]
    pub fn from_config(config: HairRemovalConfig) -> Self {
        Self { config }
    }

    /// Compute the binary hair mask (255 = hair).
    pub fn hair_mask(&self, image: &RgbImage) -> Result<GrayImage> {
        if self.config.kernel_size == 0 || self.config.kernel_size > 511 {
            return Err(CoreError::degraded(
                self.name(),
                format!("unsupported kernel size {}", self.config.kernel_size),
            ));
        }
        let gray = luminance(image);
        let hat = black_hat(&gray, self.config.kernel_size);
        let threshold = self.config.threshold;
        Ok(GrayImage::from_fn(hat.width(), hat.height(), |x, y| {
            if hat.get_pixel(x, y).0[0] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }
}

impl Default for HairRemoval {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFilter for HairRemoval {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
        let mask = self.hair_mask(image)?;
        inpaint_telea(image, &mask, self.config.inpaint_radius)
    }

    fn name(&self) -> &str {
        "HairRemoval"
    }
}

/// ITU-R BT.601 luma, rounded.
#[must_use]
pub fn luminance(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        Luma([y.round().clamp(0.0, 255.0) as u8])
    })
}

/// Morphological black-hat: `close(gray) - gray` with a square element.
#[must_use]
pub fn black_hat(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = (kernel_size / 2).min(u32::from(u8::MAX)) as u8;
    let closed = grayscale_close(gray, &Mask::square(radius));
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let c = closed.get_pixel(x, y).0[0];
        let g = gray.get_pixel(x, y).0[0];
        Luma([c.saturating_sub(g)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn skin_with_hair() -> RgbImage {
        let mut img = RgbImage::from_pixel(40, 40, Rgb([210, 160, 140]));
        for y in 0..40 {
            img.put_pixel(20, y, Rgb([20, 15, 10]));
        }
        img
    }

    #[test]
    fn test_luminance_weights() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(luminance(&img).get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn test_black_hat_flat_is_zero() {
        let gray = GrayImage::from_pixel(20, 20, Luma([90]));
        assert!(black_hat(&gray, 17).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_mask_finds_thin_dark_line() {
        let mask = HairRemoval::new().hair_mask(&skin_with_hair()).unwrap();
        assert_eq!(mask.get_pixel(20, 10).0[0], 255);
        assert_eq!(mask.get_pixel(5, 10).0[0], 0);
    }

    #[test]
    fn test_removes_hair_and_preserves_shape() {
        let img = skin_with_hair();
        let out = HairRemoval::new().apply(&img).unwrap();

        assert_eq!(out.dimensions(), img.dimensions());
        let px = out.get_pixel(20, 20).0;
        assert!(px[0] > 150, "hair pixel should be filled from skin, got {px:?}");
        assert_eq!(out.get_pixel(3, 3).0, [210, 160, 140]);
    }

    #[test]
    fn test_uniform_image_unchanged() {
        let img = RgbImage::from_pixel(24, 24, Rgb([120, 100, 90]));
        assert_eq!(HairRemoval::new().apply(&img).unwrap(), img);
    }

    #[test]
    fn test_bad_kernel_reports_degraded() {
        let filter = HairRemoval::from_config(HairRemovalConfig {
            kernel_size: 0,
            ..Default::default()
        });
        assert!(matches!(
            filter.apply(&skin_with_hair()),
            Err(CoreError::PreprocessingDegraded { .. })
        ));
    }
}
