//! MobileNetV2-style classifier over channels-first images.
//!
//! Based on "MobileNetV2: Inverted Residuals and Linear Bottlenecks" by
//! Sandler et al. (2018).
//!
//! The network is an inference graph: batch normalization is assumed folded
//! into the convolution weights, and there is no dropout. Feature layers are
//! addressed by module path:
//! - `features.0`: stem convolution (stride 2)
//! - `features.1` .. `features.N`: inverted residual blocks
//! - `features.N+1`: final 1x1 convolution
//! - `features`: alias for the output of the whole feature extractor

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use derma_core::{LayerInfo, LayerKind};
use serde::{Deserialize, Serialize};

/// One inverted residual block: expansion, stride and output width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedResidualSpec {
    /// Hidden width multiplier.
    pub expansion: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Depthwise stride.
    pub stride: usize,
}

impl InvertedResidualSpec {
    /// Create a block spec.
    #[must_use]
    pub const fn new(expansion: usize, out_channels: usize, stride: usize) -> Self {
        Self {
            expansion,
            out_channels,
            stride,
        }
    }
}

/// Configuration for [`MobileNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileNetConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Input channels.
    pub in_channels: usize,
    /// Width of the stem convolution.
    pub stem_channels: usize,
    /// Inverted residual blocks in order.
    pub blocks: Vec<InvertedResidualSpec>,
    /// Width of the final 1x1 convolution.
    pub head_channels: usize,
}

impl Default for MobileNetConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MobileNetConfig {
    /// A narrow five-block variant.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            in_channels: 3,
            stem_channels: 16,
            blocks: vec![
                InvertedResidualSpec::new(1, 16, 1),
                InvertedResidualSpec::new(4, 24, 2),
                InvertedResidualSpec::new(4, 24, 1),
                InvertedResidualSpec::new(4, 32, 2),
                InvertedResidualSpec::new(4, 32, 1),
            ],
            head_channels: 64,
        }
    }

    /// The full MobileNetV2 (width 1.0) layout: 17 blocks, head of 1280.
    pub fn mobilenet_v2(n_classes: usize) -> Self {
        // (t, c, n, s) rows of the reference table.
        let table = [
            (1, 16, 1, 1),
            (6, 24, 2, 2),
            (6, 32, 3, 2),
            (6, 64, 4, 2),
            (6, 96, 3, 1),
            (6, 160, 3, 2),
            (6, 320, 1, 1),
        ];
        let blocks = table
            .iter()
            .flat_map(|&(t, c, n, s)| {
                (0..n).map(move |i| InvertedResidualSpec::new(t, c, if i == 0 { s } else { 1 }))
            })
            .collect();
        Self {
            n_classes,
            in_channels: 3,
            stem_channels: 32,
            blocks,
            head_channels: 1280,
        }
    }

    /// Set the block layout.
    #[must_use]
    pub fn with_blocks(mut self, blocks: Vec<InvertedResidualSpec>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Set the stem and head widths.
    #[must_use]
    pub fn with_widths(mut self, stem_channels: usize, head_channels: usize) -> Self {
        self.stem_channels = stem_channels;
        self.head_channels = head_channels;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNet<B> {
        MobileNet::new(self, device)
    }
}

fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, 6.0)
}

/// Expand (1x1) -> depthwise (3x3) -> linear project (1x1), with a skip
/// connection when shapes allow.
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    /// Pointwise expansion, absent when the expansion factor is 1.
    expand: Option<Conv2d<B>>,
    /// Depthwise convolution.
    depthwise: Conv2d<B>,
    /// Linear bottleneck projection.
    project: Conv2d<B>,
    /// Whether input is added to the output.
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    /// Create a block taking `in_channels` inputs.
    pub fn new(in_channels: usize, spec: InvertedResidualSpec, device: &B::Device) -> Self {
        let hidden = in_channels * spec.expansion.max(1);
        let expand = (spec.expansion > 1)
            .then(|| Conv2dConfig::new([in_channels, hidden], [1, 1]).init(device));
        let depthwise = Conv2dConfig::new([hidden, hidden], [3, 3])
            .with_stride([spec.stride, spec.stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(hidden)
            .init(device);
        let project = Conv2dConfig::new([hidden, spec.out_channels], [1, 1]).init(device);

        Self {
            expand,
            depthwise,
            project,
            use_residual: spec.stride == 1 && in_channels == spec.out_channels,
        }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let h = match &self.expand {
            Some(expand) => relu6(expand.forward(x.clone())),
            None => x.clone(),
        };
        let h = relu6(self.depthwise.forward(h));
        let h = self.project.forward(h);
        if self.use_residual {
            h + x
        } else {
            h
        }
    }
}

/// MobileNetV2-style image classifier.
///
/// Input `[batch, C, H, W]`, output logits `[batch, n_classes]`.
///
/// # Example
///
/// ```rust,ignore
/// let model = MobileNetConfig::new(2).init::<NdArray>(&device);
/// let act = model.forward_features(x, 3);       // output of features.3
/// let logits = model.forward_head(act, 3);      // rest of the network
/// ```
#[derive(Module, Debug)]
pub struct MobileNet<B: Backend> {
    /// Stem convolution.
    stem: Conv2d<B>,
    /// Inverted residual blocks.
    blocks: Vec<InvertedResidual<B>>,
    /// Final 1x1 convolution.
    head: Conv2d<B>,
    /// Linear classifier after global average pooling.
    classifier: Linear<B>,
    /// Number of output classes.
    n_classes: usize,
}

impl<B: Backend> MobileNet<B> {
    /// Create a new model.
    pub fn new(config: &MobileNetConfig, device: &B::Device) -> Self {
        let stem = Conv2dConfig::new([config.in_channels, config.stem_channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let mut in_channels = config.stem_channels;
        let mut blocks = Vec::with_capacity(config.blocks.len());
        for spec in &config.blocks {
            blocks.push(InvertedResidual::new(in_channels, *spec, device));
            in_channels = spec.out_channels;
        }

        let head = Conv2dConfig::new([in_channels, config.head_channels], [1, 1]).init(device);
        let classifier = LinearConfig::new(config.head_channels, config.n_classes).init(device);

        Self {
            stem,
            blocks,
            head,
            classifier,
            n_classes: config.n_classes,
        }
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Index of the last feature layer (the head convolution).
    pub fn last_feature(&self) -> usize {
        self.blocks.len() + 1
    }

    /// Addressable layers in execution order.
    pub fn layers(&self) -> Vec<LayerInfo> {
        let last = self.last_feature();
        let mut layers: Vec<LayerInfo> = (0..=last)
            .map(|i| LayerInfo::new(format!("features.{i}"), LayerKind::Conv, i))
            .collect();
        layers.push(LayerInfo::new("features", LayerKind::Conv, last));
        layers.push(LayerInfo::new("pool", LayerKind::Pooling, last + 1));
        layers.push(LayerInfo::new("classifier", LayerKind::Dense, last + 2));
        layers
    }

    /// Whether `layer` produces a spatial feature map.
    pub fn is_spatial(&self, layer: &LayerInfo) -> bool {
        layer.index <= self.last_feature()
    }

    fn feature(&self, index: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match index {
            0 => relu6(self.stem.forward(x)),
            i if i <= self.blocks.len() => self.blocks[i - 1].forward(x),
            _ => relu6(self.head.forward(x)),
        }
    }

    /// Run feature layers `0..=upto`.
    pub fn forward_features(&self, x: Tensor<B, 4>, upto: usize) -> Tensor<B, 4> {
        (0..=upto.min(self.last_feature())).fold(x, |x, i| self.feature(i, x))
    }

    /// Continue from the output of feature layer `from` to the logits.
    pub fn forward_head(&self, activation: Tensor<B, 4>, from: usize) -> Tensor<B, 2> {
        let x = (from + 1..=self.last_feature()).fold(activation, |x, i| self.feature(i, x));
        let [batch, channels, _, _] = x.dims();
        let pooled = x.mean_dim(3).mean_dim(2).reshape([batch, channels]);
        self.classifier.forward(pooled)
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let last = self.last_feature();
        self.forward_head(self.forward_features(x, last), last)
    }
}
