//! The fixed preprocessing pipeline: hair removal, sharpening, resize.

use derma_core::{validate_image, FilterChain, ImageFilter, InputSize, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::hair::{HairRemoval, HairRemovalConfig};
use crate::resize::NearestResize;
use crate::sharpen::{SharpenConfig, UnsharpMask};

/// Configuration for [`Preprocessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Output resolution.
    pub target_size: InputSize,
    /// Hair removal settings.
    #[serde(default)]
    pub hair_removal: HairRemovalConfig,
    /// Unsharp-mask settings.
    #[serde(default)]
    pub sharpen: SharpenConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: InputSize::square(224),
            hair_removal: HairRemovalConfig::default(),
            sharpen: SharpenConfig::default(),
        }
    }
}

/// Prepares a raw image for the classifiers.
///
/// Steps run in a fixed order. The filter steps are fail-soft: a failing step
/// passes its input through. Only a malformed input image is an error.
#[derive(Debug)]
pub struct Preprocessor {
    filters: FilterChain,
    resize: NearestResize,
}

impl Preprocessor {
    /// Build the pipeline from config.
    pub fn new(config: &PreprocessConfig) -> Result<Self> {
        config.target_size.validate()?;
        let mut filters = FilterChain::new();
        if config.hair_removal.enabled {
            filters.push(HairRemoval::from_config(config.hair_removal.clone()));
        }
        if config.sharpen.enabled {
            filters.push(UnsharpMask::from_config(config.sharpen.clone()));
        }
        Ok(Self {
            filters,
            resize: NearestResize::new(config.target_size),
        })
    }

    /// Assemble from an explicit filter chain.
    #[must_use]
    pub fn from_parts(filters: FilterChain, target_size: InputSize) -> Self {
        Self {
            filters,
            resize: NearestResize::new(target_size),
        }
    }

    /// Output resolution.
    #[must_use]
    pub fn target_size(&self) -> InputSize {
        self.resize.size()
    }

    /// Names of the filter steps, in order.
    #[must_use]
    pub fn steps(&self) -> Vec<&str> {
        let mut steps = self.filters.names();
        steps.push(self.resize.name());
        steps
    }

    /// Run the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`derma_core::CoreError::InvalidInput`] for an empty image.
    pub fn preprocess(&self, image: &RgbImage) -> Result<RgbImage> {
        validate_image(image)?;
        let filtered = self.filters.apply(image);
        let out = self.resize.resize(&filtered);
        tracing::debug!(
            "Preprocessed {}x{} -> {}x{}",
            image.width(),
            image.height(),
            out.width(),
            out.height()
        );
        Ok(out)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_parts(
            FilterChain::new().with(HairRemoval::new()).with(UnsharpMask::new()),
            InputSize::square(224),
        )
    }
}
