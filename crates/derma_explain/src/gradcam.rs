//! Gradient-weighted Class Activation Mapping.
//!
//! Reference: Selvaraju et al., "Grad-CAM: Visual Explanations from Deep
//! Networks via Gradient-based Localization", ICCV 2017.

use derma_core::{CoreError, FeatureGrid, ImageTensor, ModelAdapter, Result};
use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::heatmap::Heatmap;

/// Configuration for [`GradCam`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradCamConfig {
    /// Added to the normalization denominator.
    pub epsilon: f32,
}

impl Default for GradCamConfig {
    fn default() -> Self {
        Self { epsilon: 1e-8 }
    }
}

/// The attribution engine.
///
/// Works against any [`ModelAdapter`]: the adapter supplies the target-layer
/// activation and the gradient of one class score w.r.t. it, in whatever
/// layout the backend uses.
///
/// # Example
///
/// ```rust,ignore
/// let cam = GradCam::default();
/// let heatmap = cam.explain(&adapter, &image, prediction.class_index)?;
/// assert_eq!((heatmap.width(), heatmap.height()), image.dimensions());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GradCam {
    config: GradCamConfig,
}

impl GradCam {
    /// Create from config.
    #[must_use]
    pub const fn new(config: GradCamConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &GradCamConfig {
        &self.config
    }

    /// Combine an activation and its gradient into a normalized heatmap at
    /// the activation's resolution.
    ///
    /// Channel weights are the spatial mean of the gradient; the map is the
    /// weighted channel sum of the activation, rectified and min-max
    /// normalized.
    pub fn combine(&self, activation: &FeatureGrid, gradient: &FeatureGrid) -> Result<Heatmap> {
        if !activation.same_extent(gradient) {
            return Err(CoreError::ShapeMismatch(format!(
                "activation {:?} and gradient {:?} differ",
                activation.values().dim(),
                gradient.values().dim()
            )));
        }
        let (height, width) = activation.spatial();
        let mut cam = Array2::<f32>::zeros((height, width));
        for c in 0..activation.channels() {
            let weight = gradient.channel(c).mean().unwrap_or(0.0);
            cam.scaled_add(weight, &activation.channel(c));
        }
        cam.mapv_inplace(|v| v.max(0.0));

        Ok(Heatmap::new(cam)?.normalized(self.config.epsilon))
    }

    /// Heatmap of `target_class` for an already converted input, resampled to
    /// `(height, width)`.
    pub fn attribute<A: ModelAdapter + ?Sized>(
        &self,
        adapter: &A,
        input: &ImageTensor,
        target_class: usize,
        height: usize,
        width: usize,
    ) -> Result<Heatmap> {
        let capture = adapter.capture_target_activation(input)?;
        let gradient = adapter.gradient_of_class(&capture, target_class)?;
        let heatmap = self.combine(&capture.activation, &gradient)?;

        tracing::debug!(
            "Grad-CAM for class {} at '{}' ({}x{} -> {}x{})",
            target_class,
            adapter.target_layer().name,
            heatmap.width(),
            heatmap.height(),
            width,
            height
        );
        Ok(heatmap.resize_bilinear(height, width))
    }

    /// Heatmap of `target_class` for a display-form image, at the image's size.
    pub fn explain<A: ModelAdapter + ?Sized>(
        &self,
        adapter: &A,
        image: &RgbImage,
        target_class: usize,
    ) -> Result<Heatmap> {
        let input = adapter.to_tensor(image)?;
        self.attribute(adapter, &input, target_class, image.height() as usize, image.width() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use derma_core::ChannelLayout;
    use ndarray::Array3;

    fn grid(values: Array3<f32>, layout: ChannelLayout) -> FeatureGrid {
        FeatureGrid::new(values, layout)
    }

    #[test]
    fn test_weighted_sum_and_relu() {
        // Two channels, 1x3 map. Channel 0 gradient mean 1, channel 1 mean -1.
        let act = Array3::from_shape_vec((2, 1, 3), vec![1.0, 2.0, 3.0, 3.0, 0.0, 0.0]).unwrap();
        let grad = Array3::from_shape_vec((2, 1, 3), vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0]).unwrap();
        let cam = GradCam::default()
            .combine(
                &grid(act, ChannelLayout::ChannelsFirst),
                &grid(grad, ChannelLayout::ChannelsFirst),
            )
            .unwrap();

        // raw = [1-3, 2, 3] -> relu [0, 2, 3] -> / 3
        assert_eq!(cam.get(0, 0), 0.0);
        assert!((cam.get(0, 1) - 2.0 / 3.0).abs() < 1e-6);
        assert!((cam.get(0, 2) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_layouts_agree() {
        let first = Array3::from_shape_fn((3, 4, 5), |(c, y, x)| ((c * 7 + y * 3 + x) % 5) as f32 - 1.0);
        let grad_first = Array3::from_shape_fn((3, 4, 5), |(c, y, x)| (c as f32 - 1.0) * (1.0 + (y + x) as f32 * 0.1));
        let last = first.clone().permuted_axes([1, 2, 0]).as_standard_layout().to_owned();
        let grad_last = grad_first.clone().permuted_axes([1, 2, 0]).as_standard_layout().to_owned();

        let cam = GradCam::default();
        let a = cam
            .combine(
                &grid(first, ChannelLayout::ChannelsFirst),
                &grid(grad_first, ChannelLayout::ChannelsFirst),
            )
            .unwrap();
        let b = cam
            .combine(
                &grid(last, ChannelLayout::ChannelsLast),
                &grid(grad_last, ChannelLayout::ChannelsLast),
            )
            .unwrap();

        for (x, y) in a.values().iter().zip(b.values().iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_uniform_activation_is_all_zero() {
        let act = Array3::from_elem((4, 3, 3), 2.5);
        let grad = Array3::from_shape_fn((4, 3, 3), |(c, _, _)| c as f32 - 1.5);
        let cam = GradCam::default()
            .combine(
                &grid(act, ChannelLayout::ChannelsFirst),
                &grid(grad, ChannelLayout::ChannelsFirst),
            )
            .unwrap();
        assert!(cam.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extent_mismatch() {
        let act = grid(Array3::zeros((2, 3, 3)), ChannelLayout::ChannelsFirst);
        let grad = grid(Array3::zeros((2, 3, 4)), ChannelLayout::ChannelsFirst);
        assert!(matches!(
            GradCam::default().combine(&act, &grad),
            Err(CoreError::ShapeMismatch(_))
        ));
    }
}
