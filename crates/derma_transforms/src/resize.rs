//! Deterministic nearest-neighbour resize.

use derma_core::{ImageFilter, InputSize, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Resizes to a fixed resolution with nearest-neighbour sampling.
#[derive(Debug, Clone, Copy)]
pub struct NearestResize {
    size: InputSize,
}

impl NearestResize {
    /// Create a resize to `size`.
    #[must_use]
    pub const fn new(size: InputSize) -> Self {
        Self { size }
    }

    /// Target size.
    #[must_use]
    pub const fn size(&self) -> InputSize {
        self.size
    }

    /// Resize; a no-op copy when the image already has the target size.
    #[must_use]
    pub fn resize(&self, image: &RgbImage) -> RgbImage {
        if image.width() == self.size.width && image.height() == self.size.height {
            return image.clone();
        }
        imageops::resize(image, self.size.width, self.size.height, FilterType::Nearest)
    }
}

impl ImageFilter for NearestResize {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
        Ok(self.resize(image))
    }

    fn name(&self) -> &str {
        "NearestResize"
    }
}
