//! Per-backend model description.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::layout::{ChannelLayout, InputSize};

/// Channel-wise normalization applied when converting pixels to tensor form.
///
/// `value = (pixel * scale - mean[c]) / std[c]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Multiplier applied to the raw `u8` sample.
    pub scale: f32,
    /// Per-channel mean (R, G, B).
    pub mean: [f32; 3],
    /// Per-channel standard deviation (R, G, B).
    pub std: [f32; 3],
}

impl Normalization {
    /// ImageNet statistics on `[0, 1]` scaled pixels.
    #[must_use]
    pub const fn imagenet() -> Self {
        Self {
            scale: 1.0 / 255.0,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    /// Plain `[0, 1]` scaling, no centering.
    #[must_use]
    pub const fn unit() -> Self {
        Self {
            scale: 1.0 / 255.0,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
        }
    }

    /// Maps `[0, 255]` onto `[-1, 1]`.
    #[must_use]
    pub const fn symmetric_unit() -> Self {
        Self {
            scale: 1.0 / 255.0,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }

    /// Normalize one sample of channel `c`.
    #[inline]
    #[must_use]
    pub fn apply(&self, sample: u8, c: usize) -> f32 {
        (f32::from(sample) * self.scale - self.mean[c]) / self.std[c]
    }

    fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(CoreError::Config(format!("scale must be positive, got {}", self.scale)));
        }
        if self.std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(CoreError::Config(format!("std must be positive, got {:?}", self.std)));
        }
        Ok(())
    }
}

/// Identifies one loaded model and everything needed to feed and explain it.
///
/// Built once at startup and shared by reference for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Human readable model name, used in logs and errors.
    pub name: String,
    /// Number of output classes.
    pub n_classes: usize,
    /// Spatial size the network expects.
    pub input_size: InputSize,
    /// Tensor channel ordering of the backend.
    pub layout: ChannelLayout,
    /// Pixel normalization statistics.
    pub normalization: Normalization,
    /// Identifier of the layer used for attribution.
    pub target_layer: String,
    /// Fall back to the last convolution when `target_layer` does not resolve.
    #[serde(default)]
    pub fallback_to_last_conv: bool,
}

impl ModelDescriptor {
    /// Create a descriptor with a 224x224 input and no fallback.
    pub fn new(
        name: impl Into<String>,
        n_classes: usize,
        layout: ChannelLayout,
        normalization: Normalization,
        target_layer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            n_classes,
            input_size: InputSize::default(),
            layout,
            normalization,
            target_layer: target_layer.into(),
            fallback_to_last_conv: false,
        }
    }

    /// Set the expected input size.
    #[must_use]
    pub fn with_input_size(mut self, input_size: InputSize) -> Self {
        self.input_size = input_size;
        self
    }

    /// Set the attribution target layer.
    #[must_use]
    pub fn with_target_layer(mut self, target_layer: impl Into<String>) -> Self {
        self.target_layer = target_layer.into();
        self
    }

    /// Allow falling back to the last convolution layer.
    #[must_use]
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback_to_last_conv = fallback;
        self
    }

    /// Check the descriptor is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.n_classes < 2 {
            return Err(CoreError::Config(format!(
                "model '{}' needs at least 2 classes, got {}",
                self.name, self.n_classes
            )));
        }
        if self.target_layer.trim().is_empty() {
            return Err(CoreError::Config(format!("model '{}' has an empty target layer", self.name)));
        }
        self.input_size.validate()?;
        self.normalization.validate()
    }
}
