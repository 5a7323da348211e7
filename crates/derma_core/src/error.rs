//! Error types for derma_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Which side of the serving boundary an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The request itself is at fault (bad image, wrong channel count).
    Client,
    /// The service failed to process a well-formed request.
    Server,
}

/// Errors produced by the classification and attribution pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A preprocessing filter failed internally.
    ///
    /// Filters recover from this locally by returning their input unchanged;
    /// it is only ever logged.
    #[error("Preprocessing step '{step}' degraded: {reason}")]
    PreprocessingDegraded {
        /// Name of the filter that failed.
        step: String,
        /// What went wrong.
        reason: String,
    },

    /// The attribution target layer does not exist in the loaded architecture.
    #[error("Layer '{layer}' not found in model '{model}'")]
    LayerNotFound {
        /// Requested layer identifier.
        layer: String,
        /// Model the lookup ran against.
        model: String,
    },

    /// The input image is unusable (empty, wrong channel count, truncated).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The underlying model computation failed.
    #[error("Inference failure: {0}")]
    InferenceFailure(String),

    /// Shape mismatch between tensors or grids.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Checkpoint could not be read.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Build a [`CoreError::LayerNotFound`].
    pub fn layer_not_found(layer: impl Into<String>, model: impl Into<String>) -> Self {
        Self::LayerNotFound {
            layer: layer.into(),
            model: model.into(),
        }
    }

    /// Build a [`CoreError::PreprocessingDegraded`].
    pub fn degraded(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PreprocessingDegraded {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error for the serving boundary.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    /// Whether this is a [`CoreError::LayerNotFound`].
    #[must_use]
    pub fn is_layer_not_found(&self) -> bool {
        matches!(self, Self::LayerNotFound { .. })
    }
}
