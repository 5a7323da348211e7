//! The stage-selection policy and label tables.

use derma_core::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// The seven lesion categories of the specialist stage, by class index.
pub const DEFAULT_STAGE2_LABELS: [&str; 7] = [
    "Actinic Keratosis",
    "Basal Cell Carcinoma",
    "Benign Keratosis",
    "Dermatofibroma",
    "Melanoma",
    "Melanocytic Nevus",
    "Vascular Lesion",
];

/// How a stage-1 verdict is routed.
///
/// A stage-1 prediction of `specialist_index` sends the image to stage 2; any
/// other class is terminal and reported as `terminal_label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRouting {
    /// Stage-1 class that requires the specialist stage.
    pub specialist_index: usize,
    /// Label reported when stage 1 is terminal.
    pub terminal_label: String,
}

impl Default for CascadeRouting {
    fn default() -> Self {
        Self {
            specialist_index: 0,
            terminal_label: "Melanoma".to_string(),
        }
    }
}

impl CascadeRouting {
    /// Whether a stage-1 class needs the specialist stage.
    #[must_use]
    pub fn needs_specialist(&self, stage1_class: usize) -> bool {
        stage1_class == self.specialist_index
    }
}

/// Routing plus the stage-2 label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Stage-selection policy.
    #[serde(default)]
    pub routing: CascadeRouting,
    /// Human readable label of each stage-2 class.
    #[serde(default = "default_stage2_labels")]
    pub stage2_labels: Vec<String>,
}

fn default_stage2_labels() -> Vec<String> {
    DEFAULT_STAGE2_LABELS.iter().map(|s| (*s).to_string()).collect()
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            routing: CascadeRouting::default(),
            stage2_labels: default_stage2_labels(),
        }
    }
}

impl CascadeConfig {
    /// Check the config against the class counts of both stages.
    pub fn validate(&self, stage1_classes: usize, stage2_classes: usize) -> Result<()> {
        if self.routing.specialist_index >= stage1_classes {
            return Err(CoreError::Config(format!(
                "specialist index {} is not a stage-1 class (stage 1 has {stage1_classes})",
                self.routing.specialist_index
            )));
        }
        if self.routing.terminal_label.trim().is_empty() {
            return Err(CoreError::Config("terminal label is empty".into()));
        }
        if self.stage2_labels.len() != stage2_classes {
            return Err(CoreError::Config(format!(
                "{} stage-2 labels for {stage2_classes} stage-2 classes",
                self.stage2_labels.len()
            )));
        }
        Ok(())
    }

    /// Label of a stage-2 class.
    ///
    /// # Errors
    ///
    /// An index outside the table is an inference failure: the model produced
    /// a class the deployment cannot name.
    pub fn stage2_label(&self, class_index: usize) -> Result<&str> {
        self.stage2_labels
            .get(class_index)
            .map(String::as_str)
            .ok_or_else(|| {
                CoreError::InferenceFailure(format!(
                    "stage-2 class {class_index} has no label ({} known)",
                    self.stage2_labels.len()
                ))
            })
    }
}
