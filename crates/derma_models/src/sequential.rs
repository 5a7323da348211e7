//! Keras-style sequential CNN over channels-last images.
//!
//! Tensors flow as `[batch, H, W, C]`. Layers carry the flat names Keras
//! assigns (`conv2d`, `activation`, `max_pooling2d`, then `_1`, `_2`, ...
//! suffixes per layer type), so an exported graph can be addressed with the
//! names its training code used.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;
use derma_core::{LayerInfo, LayerKind};
use serde::{Deserialize, Serialize};

/// Configuration for [`SequentialCnn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Input channels.
    pub in_channels: usize,
    /// Filters of each convolution block.
    pub filters: Vec<usize>,
    /// Square kernel side of every convolution.
    pub kernel_size: usize,
    /// Units of the hidden dense layer.
    pub dense_units: usize,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self::new(7)
    }
}

impl SequentialConfig {
    /// Three convolution blocks (16, 32, 64) and a 64 unit hidden layer.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            in_channels: 3,
            filters: vec![16, 32, 64],
            kernel_size: 3,
            dense_units: 64,
        }
    }

    /// Set the convolution filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the hidden dense width.
    #[must_use]
    pub fn with_dense_units(mut self, units: usize) -> Self {
        self.dense_units = units;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SequentialCnn<B> {
        SequentialCnn::new(self, device)
    }
}

/// A spatial step of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Conv(usize),
    Activation(usize),
    Pool(usize),
}

fn keras_name(base: &str, k: usize) -> String {
    if k == 0 {
        base.to_string()
    } else {
        format!("{base}_{k}")
    }
}

fn to_nchw<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.permute([0, 3, 1, 2])
}

fn to_nhwc<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.permute([0, 2, 3, 1])
}

/// `[Conv2D -> Activation(relu) -> MaxPooling2D] * n`, the last block without
/// pooling, then global average pooling, a relu dense layer and the output
/// dense layer.
#[derive(Module, Debug)]
pub struct SequentialCnn<B: Backend> {
    /// Convolutions, one per block.
    convs: Vec<Conv2d<B>>,
    /// 2x2 max pooling shared by every block.
    pool: MaxPool2d,
    /// Hidden dense layer.
    dense: Linear<B>,
    /// Output dense layer.
    output: Linear<B>,
    /// Number of output classes.
    n_classes: usize,
}

impl<B: Backend> SequentialCnn<B> {
    /// Create a new model.
    pub fn new(config: &SequentialConfig, device: &B::Device) -> Self {
        let mut in_channels = config.in_channels;
        let mut convs = Vec::with_capacity(config.filters.len());
        for &filters in &config.filters {
            convs.push(
                Conv2dConfig::new([in_channels, filters], [config.kernel_size, config.kernel_size])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            in_channels = filters;
        }
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let dense = LinearConfig::new(in_channels, config.dense_units).init(device);
        let output = LinearConfig::new(config.dense_units, config.n_classes).init(device);

        Self {
            convs,
            pool,
            dense,
            output,
            n_classes: config.n_classes,
        }
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn steps(&self) -> Vec<Step> {
        let n = self.convs.len();
        let mut steps = Vec::with_capacity(3 * n);
        for k in 0..n {
            steps.push(Step::Conv(k));
            steps.push(Step::Activation(k));
            if k + 1 < n {
                steps.push(Step::Pool(k));
            }
        }
        steps
    }

    /// Addressable layers in execution order.
    pub fn layers(&self) -> Vec<LayerInfo> {
        let mut layers: Vec<LayerInfo> = self
            .steps()
            .into_iter()
            .enumerate()
            .map(|(i, step)| match step {
                Step::Conv(k) => LayerInfo::new(keras_name("conv2d", k), LayerKind::Conv, i),
                Step::Activation(k) => LayerInfo::new(keras_name("activation", k), LayerKind::Activation, i),
                Step::Pool(k) => LayerInfo::new(keras_name("max_pooling2d", k), LayerKind::Pooling, i),
            })
            .collect();
        let n = layers.len();
        layers.push(LayerInfo::new("global_average_pooling2d", LayerKind::Pooling, n));
        layers.push(LayerInfo::new("dense", LayerKind::Dense, n + 1));
        layers.push(LayerInfo::new("dense_1", LayerKind::Dense, n + 2));
        layers
    }

    /// Whether `layer` produces a spatial feature map.
    pub fn is_spatial(&self, layer: &LayerInfo) -> bool {
        layer.index < self.steps().len()
    }

    fn step(&self, step: Step, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match step {
            Step::Conv(k) => to_nhwc(self.convs[k].forward(to_nchw(x))),
            Step::Activation(_) => relu(x),
            Step::Pool(_) => to_nhwc(self.pool.forward(to_nchw(x))),
        }
    }

    /// Forward pass, passing the output of spatial layer `watch` through
    /// `hook` before continuing.
    pub fn forward_watching<F>(&self, x: Tensor<B, 4>, watch: Option<usize>, mut hook: F) -> Tensor<B, 2>
    where
        F: FnMut(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let mut x = x;
        for (i, step) in self.steps().into_iter().enumerate() {
            x = self.step(step, x);
            if watch == Some(i) {
                x = hook(x);
            }
        }
        let [batch, _, _, channels] = x.dims();
        let pooled = x.mean_dim(2).mean_dim(1).reshape([batch, channels]);
        let hidden = relu(self.dense.forward(pooled));
        self.output.forward(hidden)
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_watching(x, None, |x| x)
    }
}
