//! Image filter trait for preprocessing.

use image::RgbImage;

use crate::error::Result;

/// A deterministic filter applied to a display-form image.
///
/// # Implementation Notes
///
/// - Filters must not change the image dimensions unless that is their purpose
///   (resizing)
/// - Filters report internal failures as errors; [`FilterChain`] decides how
///   to recover
///
/// # Example
///
/// ```rust,ignore
/// use derma_core::{ImageFilter, Result};
/// use image::RgbImage;
///
/// struct Invert;
///
/// impl ImageFilter for Invert {
///     fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
///         let mut out = image.clone();
///         image::imageops::invert(&mut out);
///         Ok(out)
///     }
/// }
/// ```
pub trait ImageFilter: Send + Sync {
    /// Apply the filter.
    fn apply(&self, image: &RgbImage) -> Result<RgbImage>;

    /// Get the name of this filter for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Identity filter that passes the image through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl ImageFilter for Identity {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
        Ok(image.clone())
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

/// Applies filters in sequence, each one fail-soft.
///
/// A filter that errors is skipped: its input is passed on unchanged and the
/// failure is logged, never returned.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn ImageFilter>>,
}

impl FilterChain {
    /// Create a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the end of the chain.
    pub fn push<F: ImageFilter + 'static>(&mut self, filter: F) {
        self.filters.push(Box::new(filter));
    }

    /// Builder-style [`FilterChain::push`].
    #[must_use]
    pub fn with<F: ImageFilter + 'static>(mut self, filter: F) -> Self {
        self.push(filter);
        self
    }

    /// Names of the filters, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter; failures fall back to the filter's input.
    #[must_use]
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut current = image.clone();
        for filter in &self.filters {
            match filter.apply(&current) {
                Ok(out) => current = out,
                Err(e) => {
                    tracing::warn!("Filter '{}' failed, keeping its input: {}", filter.name(), e);
                }
            }
        }
        current
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("filters", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use image::Rgb;

    struct Brighten;

    impl ImageFilter for Brighten {
        fn apply(&self, image: &RgbImage) -> Result<RgbImage> {
            let mut out = image.clone();
            for p in out.pixels_mut() {
                p.0 = p.0.map(|v| v.saturating_add(10));
            }
            Ok(out)
        }

        fn name(&self) -> &str {
            "Brighten"
        }
    }

    struct Broken;

    impl ImageFilter for Broken {
        fn apply(&self, _image: &RgbImage) -> Result<RgbImage> {
            Err(CoreError::degraded("Broken", "always fails"))
        }

        fn name(&self) -> &str {
            "Broken"
        }
    }

    #[test]
    fn test_identity_name() {
        assert_eq!(Identity.name(), "Identity");
    }

    #[test]
    fn test_chain_skips_failing_filter() {
        let chain = FilterChain::new().with(Broken).with(Brighten);
        let img = RgbImage::from_pixel(3, 3, Rgb([100, 100, 100]));
        let out = chain.apply(&img);
        assert_eq!(out.get_pixel(1, 1).0, [110, 110, 110]);
        assert_eq!(chain.names(), vec!["Broken", "Brighten"]);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        let img = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        assert_eq!(chain.apply(&img), img);
    }
}
