//! Weight loading and saving using burn's record system.
//!
//! Records are stored as named MessagePack at full precision. burn replaces
//! the file extension with `.mpk`.
//!
//! # Example
//!
//! ```rust,ignore
//! use derma_models::checkpoint::{load_weights, save_weights};
//!
//! let model = MobileNetConfig::new(2).init::<NdArray>(&device);
//! save_weights(&model, "stage1")?;
//! let loaded = load_weights(MobileNetConfig::new(2).init(&device), "stage1", &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use derma_core::{CoreError, Result};
use serde::{Deserialize, Serialize};

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Save a model's weights.
pub fn save_weights<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| CoreError::Checkpoint(format!("saving {}: {e:?}", path.display())))?;
    tracing::info!("Saved weights to {}", path.display());
    Ok(())
}

/// Load weights into an already initialized model of the same architecture.
pub fn load_weights<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let model = model
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| CoreError::Checkpoint(format!("loading {}: {e:?}", path.display())))?;
    tracing::info!("Loaded weights from {}", path.display());
    Ok(model)
}

/// Where a model's weights come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Fresh initialization from a backend seed.
    Seeded {
        /// Seed passed to the backend before initialization.
        seed: u64,
    },
    /// A record file written by [`save_weights`].
    Checkpoint {
        /// Record path.
        path: PathBuf,
    },
}

impl Default for WeightSource {
    fn default() -> Self {
        Self::Seeded { seed: 42 }
    }
}

impl WeightSource {
    /// True when weights come from a seed rather than a trained record.
    pub fn is_seeded(&self) -> bool {
        matches!(self, Self::Seeded { .. })
    }

    /// Build the model `name` with `init` and fill its weights from this source.
    ///
    /// Seeded weights are untrained; their predictions carry no diagnostic meaning.
    pub fn materialize<B, M, F>(&self, name: &str, init: F, device: &B::Device) -> Result<M>
    where
        B: Backend,
        M: Module<B>,
        F: FnOnce(&B::Device) -> M,
    {
        match self {
            Self::Seeded { seed } => {
                tracing::warn!("Model '{name}' uses untrained weights (seed {seed}); predictions are not meaningful");
                B::seed(*seed);
                Ok(init(device))
            }
            Self::Checkpoint { path } => load_weights(init(device), path, device),
        }
    }
}
