//! The deployment configuration file.

use std::path::Path;

use derma_core::{CoreError, ModelDescriptor, Result};
use derma_explain::{CompositorConfig, GradCamConfig};
use derma_models::{channel_first_descriptor, channel_last_descriptor, MobileNetConfig, SequentialConfig, WeightSource};
use derma_transforms::PreprocessConfig;
use serde::{Deserialize, Serialize};

use crate::routing::CascadeConfig;

/// One stage model: how it is addressed, its architecture, its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection<A> {
    /// Layout, normalization and target layer.
    pub descriptor: ModelDescriptor,
    /// Network hyperparameters.
    pub architecture: A,
    /// Weight origin.
    #[serde(default)]
    pub weights: WeightSource,
}

impl<A> ModelSection<A> {
    /// Section with seeded weights.
    pub fn seeded(descriptor: ModelDescriptor, architecture: A, seed: u64) -> Self {
        Self {
            descriptor,
            architecture,
            weights: WeightSource::Seeded { seed },
        }
    }
}

/// Every constant the pipeline uses.
///
/// `routing` and `stage2_labels` sit at the top level of the JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DermaConfig {
    /// Preprocessing filters and target size.
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// The channels-first triage model.
    #[serde(default = "default_stage1")]
    pub stage1: ModelSection<MobileNetConfig>,
    /// The channels-last specialist model.
    #[serde(default = "default_stage2")]
    pub stage2: ModelSection<SequentialConfig>,
    /// Routing and stage-2 labels.
    #[serde(flatten)]
    pub cascade: CascadeConfig,
    /// Attribution settings.
    #[serde(default)]
    pub gradcam: GradCamConfig,
    /// Overlay settings.
    #[serde(default)]
    pub compositor: CompositorConfig,
}

fn default_stage1() -> ModelSection<MobileNetConfig> {
    ModelSection::seeded(channel_first_descriptor("melanoma", 2), MobileNetConfig::new(2), 42)
}

fn default_stage2() -> ModelSection<SequentialConfig> {
    ModelSection::seeded(
        channel_last_descriptor("skin_lesion", 7, "conv2d_93"),
        SequentialConfig::new(7),
        43,
    )
}

impl Default for DermaConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            stage1: default_stage1(),
            stage2: default_stage2(),
            cascade: CascadeConfig::default(),
            gradcam: GradCamConfig::default(),
            compositor: CompositorConfig::default(),
        }
    }
}

impl DermaConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Read and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Names of the stage models running on seeded, untrained weights.
    pub fn untrained_models(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.stage1.weights.is_seeded() {
            names.push(self.stage1.descriptor.name.as_str());
        }
        if self.stage2.weights.is_seeded() {
            names.push(self.stage2.descriptor.name.as_str());
        }
        names
    }

    /// Check the sections against each other.
    pub fn validate(&self) -> Result<()> {
        self.preprocess.target_size.validate()?;
        self.stage1.descriptor.validate()?;
        self.stage2.descriptor.validate()?;
        if self.stage1.architecture.n_classes != self.stage1.descriptor.n_classes {
            return Err(CoreError::Config(format!(
                "stage 1 architecture has {} classes, descriptor {}",
                self.stage1.architecture.n_classes, self.stage1.descriptor.n_classes
            )));
        }
        if self.stage2.architecture.n_classes != self.stage2.descriptor.n_classes {
            return Err(CoreError::Config(format!(
                "stage 2 architecture has {} classes, descriptor {}",
                self.stage2.architecture.n_classes, self.stage2.descriptor.n_classes
            )));
        }
        if !(0.0..=1.0).contains(&self.compositor.alpha) || self.compositor.channel > 2 {
            return Err(CoreError::Config(format!(
                "compositor alpha {} / channel {} out of range",
                self.compositor.alpha, self.compositor.channel
            )));
        }
        if self.compositor.levels < 1.0 {
            return Err(CoreError::Config("compositor levels must be at least 1".into()));
        }
        self.cascade
            .validate(self.stage1.descriptor.n_classes, self.stage2.descriptor.n_classes)
    }
}
