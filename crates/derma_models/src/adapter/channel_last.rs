//! Adapter for the channels-last sequential family (tape gradients).

use std::path::Path;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use derma_core::{
    ChannelLayout, CoreError, FeatureGrid, ImageTensor, LayerInfo, ModelAdapter, ModelDescriptor, Normalization, Result,
    TargetCapture,
};
use parking_lot::Mutex;

use super::{check_descriptor, check_gradient, check_logits, resolve_spatial_target};
use crate::checkpoint::WeightSource;
use crate::convert;
use crate::sequential::{SequentialCnn, SequentialConfig};
use crate::tape::GradientTape;

/// Descriptor defaults for a channels-last model: inputs scaled to [0, 1]
/// and fallback to the last convolution allowed.
pub fn channel_last_descriptor(
    name: impl Into<String>,
    n_classes: usize,
    target_layer: impl Into<String>,
) -> ModelDescriptor {
    ModelDescriptor::new(
        name,
        n_classes,
        ChannelLayout::ChannelsLast,
        Normalization::unit(),
        target_layer,
    )
    .with_fallback(true)
}

/// [`ModelAdapter`] over a [`SequentialCnn`].
///
/// Plain forward passes run on the inner backend. Activation capture runs the
/// full network on the autodiff backend with a [`GradientTape`] watching the
/// target layer; the gradient call replays that tape.
pub struct ChannelLastAdapter<B: AutodiffBackend> {
    descriptor: ModelDescriptor,
    layers: Vec<LayerInfo>,
    target: LayerInfo,
    model: Mutex<SequentialCnn<B>>,
    inference: Mutex<SequentialCnn<B::InnerBackend>>,
    device: B::Device,
}

impl<B: AutodiffBackend> ChannelLastAdapter<B> {
    /// Wrap an initialized model.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor does not match the model, or its target layer
    /// does not resolve to a spatial layer.
    pub fn new(descriptor: ModelDescriptor, model: SequentialCnn<B>, device: B::Device) -> Result<Self> {
        check_descriptor(&descriptor, ChannelLayout::ChannelsLast, model.n_classes())?;
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
        config: &SequentialConfig,
        source: &WeightSource,
        device: B::Device,
    ) -> Result<Self> {
        let model = source.materialize(&descriptor.name, |d| config.init::<B>(d), &device)?;
        Self::new(descriptor, model, device)
    }

    /// Load weights from a record file.
    pub fn load(
        descriptor: ModelDescriptor,
        config: &SequentialConfig,
        checkpoint: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        let source = WeightSource::Checkpoint {
            path: checkpoint.as_ref().to_path_buf(),
        };
        Self::from_config(descriptor, config, &source, device)
    }
}

impl<B: AutodiffBackend> ModelAdapter for ChannelLastAdapter<B> {
    type Tape = GradientTape<B>;

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
        let x = convert::image_to_tensor::<B::InnerBackend>(input, ChannelLayout::ChannelsLast, &self.device)?;
        let logits = self.inference.lock().forward(x);
        check_logits(&self.descriptor, convert::logits_to_vec(logits)?)
    }

    fn capture_target_activation(&self, input: &ImageTensor) -> Result<TargetCapture<Self::Tape>> {
        let x = convert::image_to_tensor::<B>(input, ChannelLayout::ChannelsLast, &self.device)?;
        let mut tape = GradientTape::new();
        let output = self
            .model
            .lock()
            .forward_watching(x, Some(self.target.index), |t| tape.watch(t));

        let watched = tape.watched().ok_or_else(|| {
            CoreError::InferenceFailure(format!(
                "layer '{}' of '{}' was never reached",
                self.target.name, self.descriptor.name
            ))
        })?;
        let activation = convert::tensor_to_grid(watched, ChannelLayout::ChannelsLast)?;
        let logits = check_logits(&self.descriptor, convert::logits_to_vec(output.clone().inner())?)?;
        tape.record_output(output);

        Ok(TargetCapture {
            activation,
            logits,
            tape,
        })
    }

    fn gradient_of_class(&self, capture: &TargetCapture<Self::Tape>, target_class: usize) -> Result<FeatureGrid> {
        let one_hot = convert::one_hot::<B>(self.descriptor.n_classes, target_class, &self.device)?;
        let grad = capture.tape.gradient(one_hot)?;
        let grid = convert::tensor_to_grid(grad, ChannelLayout::ChannelsLast)?;
        check_gradient(&capture.activation, grid)
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for ChannelLastAdapter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLastAdapter")
            .field("model", &self.descriptor.name)
            .field("target", &self.target.name)
            .finish()
    }
}
