//! The capability surface every inference backend exposes.
//!
//! The attribution engine and the cascade are written once against
//! [`ModelAdapter`]; tensor layout, layer addressing and the autodiff idiom
//! stay inside each implementation.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::descriptor::ModelDescriptor;
use crate::error::Result;
use crate::prediction::PredictionResult;
use crate::tensor::{FeatureGrid, ImageTensor};

/// Kind of an addressable layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Convolution (or a block ending in one).
    Conv,
    /// Standalone non-linearity.
    Activation,
    /// Spatial pooling.
    Pooling,
    /// Fully connected.
    Dense,
}

/// One addressable layer of a loaded architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Identifier in the backend's addressing scheme.
    pub name: String,
    /// What the layer computes.
    pub kind: LayerKind,
    /// Position in execution order.
    pub index: usize,
}

impl LayerInfo {
    /// Create a new layer description.
    pub fn new(name: impl Into<String>, kind: LayerKind, index: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            index,
        }
    }
}

/// Activation recorded at the target layer during a forward pass.
///
/// `tape` is whatever private state the adapter needs to later compute
/// gradients for this capture.
#[derive(Debug)]
pub struct TargetCapture<T> {
    /// Activation at the target layer.
    pub activation: FeatureGrid,
    /// Output logits of the same forward pass.
    pub logits: Vec<f32>,
    /// Adapter-private gradient state.
    pub tape: T,
}

/// Uniform interface over a concrete model backend.
///
/// Implementations must tolerate concurrent calls through `&self`.
pub trait ModelAdapter: Send + Sync {
    /// Backend-private state carried from capture to gradient.
    type Tape;

    /// The descriptor this adapter was built from.
    fn descriptor(&self) -> &ModelDescriptor;

    /// The resolved target layer (after any fallback).
    fn target_layer(&self) -> &LayerInfo;

    /// Addressable layers of the loaded architecture.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Run inference and return raw logits.
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>>;

    /// Run a forward pass recording the target-layer activation.
    fn capture_target_activation(&self, input: &ImageTensor) -> Result<TargetCapture<Self::Tape>>;

    /// Gradient of the `target_class` output w.r.t. the captured activation.
    ///
    /// The returned grid has the activation's extent and layout.
    fn gradient_of_class(
        &self,
        capture: &TargetCapture<Self::Tape>,
        target_class: usize,
    ) -> Result<FeatureGrid>;

    /// Convert a display-form image into this backend's tensor form.
    fn to_tensor(&self, image: &RgbImage) -> Result<ImageTensor> {
        ImageTensor::from_image(image, self.descriptor())
    }

    /// Classify an image.
    fn predict(&self, image: &RgbImage) -> Result<PredictionResult> {
        let input = self.to_tensor(image)?;
        let logits = self.forward(&input)?;
        PredictionResult::from_logits(&logits)
    }
}

/// Resolve `name` against `layers`, optionally falling back to the last
/// convolution.
///
/// Returns the resolved layer and whether the fallback was taken.
pub fn resolve_target_layer(
    layers: &[LayerInfo],
    name: &str,
    model: &str,
    allow_fallback: bool,
) -> Result<(LayerInfo, bool)> {
    if let Some(layer) = layers.iter().find(|l| l.name == name) {
        return Ok((layer.clone(), false));
    }
    if allow_fallback {
        if let Some(layer) = layers.iter().rev().find(|l| l.kind == LayerKind::Conv) {
            tracing::warn!(
                "Layer '{}' not found in '{}', falling back to last convolution '{}'",
                name,
                model,
                layer.name
            );
            return Ok((layer.clone(), true));
        }
    }
    Err(crate::error::CoreError::layer_not_found(name, model))
}
