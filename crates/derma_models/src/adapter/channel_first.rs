//! Adapter for the channels-first MobileNet family (graph replay gradients).

use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use derma_core::{
    ChannelLayout, CoreError, FeatureGrid, ImageTensor, LayerInfo, ModelAdapter, ModelDescriptor, Normalization,
    Result, TargetCapture,
};
use parking_lot::Mutex;

use super::{check_descriptor, check_gradient, check_logits, resolve_spatial_target};
use crate::checkpoint::WeightSource;
use crate::convert;
use crate::mobilenet::{MobileNet, MobileNetConfig};
use crate::tape::ReplayState;

/// Descriptor defaults for a channels-first model: ImageNet statistics and the
/// whole feature extractor as target.
pub fn channel_first_descriptor(name: impl Into<String>, n_classes: usize) -> ModelDescriptor {
    ModelDescriptor::new(
        name,
        n_classes,
        ChannelLayout::ChannelsFirst,
        Normalization::imagenet(),
        "features",
    )
}

/// [`ModelAdapter`] over a [`MobileNet`].
///
/// Forward passes and activation capture run on the inner backend. The
/// gradient call rebuilds the network head on the autodiff backend from the
/// captured activation and backpropagates a one-hot weighting of the logits.
pub struct ChannelFirstAdapter<B: AutodiffBackend> {
    descriptor: ModelDescriptor,
    layers: Vec<LayerInfo>,
    target: LayerInfo,
    model: Mutex<MobileNet<B>>,
    inference: Mutex<MobileNet<B::InnerBackend>>,
    device: B::Device,
}

impl<B: AutodiffBackend> ChannelFirstAdapter<B> {
    /// Wrap an initialized model.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor does not match the model, or its target layer
    /// does not resolve to a spatial layer.
    pub fn new(descriptor: ModelDescriptor, model: MobileNet<B>, device: B::Device) -> Result<Self> {
        check_descriptor(&descriptor, ChannelLayout::ChannelsFirst, model.n_classes())?;
        let layers = model.layers();
        let target = resolve_spatial_target(&descriptor, &layers, |l| model.is_spatial(l))?;
        let inference = model.valid();

        tracing::info!(
            "Loaded '{}' ({} classes), target layer '{}'",
            descriptor.name,
            descriptor.n_classes,
            target.name
        );

        Ok(Self {
            descriptor,
            layers,
            target,
            model: Mutex::new(model),
            inference: Mutex::new(inference),
            device,
        })
    }

    /// Build the model from `config` with weights from `source`.
    pub fn from_config(
        descriptor: ModelDescriptor,
        config: &MobileNetConfig,
        source: &WeightSource,
        device: B::Device,
    ) -> Result<Self> {
        let model = source.materialize(&descriptor.name, |d| config.init::<B>(d), &device)?;
        Self::new(descriptor, model, device)
    }

    /// Load weights from a record file.
    pub fn load(
        descriptor: ModelDescriptor,
        config: &MobileNetConfig,
        checkpoint: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        let source = WeightSource::Checkpoint {
            path: checkpoint.as_ref().to_path_buf(),
        };
        Self::from_config(descriptor, config, &source, device)
    }
}

impl<B: AutodiffBackend> ModelAdapter for ChannelFirstAdapter<B> {
    type Tape = ReplayState<B>;

    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn target_layer(&self) -> &LayerInfo {
        &self.target
    }

    fn layers(&self) -> Vec<LayerInfo> {
        self.layers.clone()
    }

    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let x = convert::image_to_tensor::<B::InnerBackend>(input, ChannelLayout::ChannelsFirst, &self.device)?;
        let logits = self.inference.lock().forward(x);
        check_logits(&self.descriptor, convert::logits_to_vec(logits)?)
    }

    fn capture_target_activation(&self, input: &ImageTensor) -> Result<TargetCapture<Self::Tape>> {
        let x = convert::image_to_tensor::<B::InnerBackend>(input, ChannelLayout::ChannelsFirst, &self.device)?;
        let index = self.target.index;
        let (activation, logits) = {
            let model = self.inference.lock();
            let activation = model.forward_features(x, index);
            let logits = model.forward_head(activation.clone(), index);
            (activation, logits)
        };

        Ok(TargetCapture {
            activation: convert::tensor_to_grid(activation.clone(), ChannelLayout::ChannelsFirst)?,
            logits: check_logits(&self.descriptor, convert::logits_to_vec(logits)?)?,
            tape: ReplayState::new(activation, index),
        })
    }

    fn gradient_of_class(&self, capture: &TargetCapture<Self::Tape>, target_class: usize) -> Result<FeatureGrid> {
        let one_hot = convert::one_hot::<B>(self.descriptor.n_classes, target_class, &self.device)?;
        let leaf = capture.tape.leaf();
        let logits = self.model.lock().forward_head(leaf.clone(), capture.tape.layer_index);

        let grads = (logits * one_hot).sum().backward();
        let grad = leaf.grad(&grads).ok_or_else(|| {
            CoreError::InferenceFailure(format!(
                "no gradient reached '{}' in '{}'",
                self.target.name, self.descriptor.name
            ))
        })?;
        let grid = convert::tensor_to_grid(grad, ChannelLayout::ChannelsFirst)?;
        check_gradient(&capture.activation, grid)
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for ChannelFirstAdapter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFirstAdapter")
            .field("model", &self.descriptor.name)
            .field("target", &self.target.name)
            .finish()
    }
}
