//! # derma
//!
//! Cascaded dermoscopy classification with Grad-CAM attribution.
//!
//! An image is cleaned up (hair removal, sharpening, resize), classified by a
//! triage model and, when the triage verdict calls for it, by a specialist
//! model. The model whose verdict is reported is then explained with Grad-CAM
//! and the heatmap is blended onto the image.
//!
//! - **Core**: data model, errors, the [`ModelAdapter`](core::ModelAdapter) trait
//! - **Transforms**: the fail-soft preprocessing filters
//! - **Models**: a channels-first MobileNet and a channels-last sequential CNN,
//!   each behind its own adapter
//! - **Explain**: Grad-CAM and the heatmap compositor
//! - **Cascade**: routing, observers, the pipeline and its config file
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use derma::prelude::*;
//!
//! let config = DermaConfig::load("derma.json")?;
//! let pipeline = DefaultPipeline::from_config(&config, Default::default())?;
//!
//! let image = image::open("lesion.jpg")?.to_rgb8();
//! let diagnosis = pipeline.process(&image)?;
//! println!("{} ({:.1}%) from {}", diagnosis.final_class, diagnosis.confidence * 100.0, diagnosis.model_used);
//! diagnosis.visualization.to_rgb_image().save("overlay.png")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use derma_cascade as cascade;
pub use derma_core as core;
pub use derma_explain as explain;
pub use derma_models as models;
pub use derma_transforms as transforms;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use derma::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use derma_core::{
        ChannelLayout, CoreError, ErrorClass, FeatureGrid, ImageFilter, ImageTensor, InputSize, LayerInfo,
        LayerKind, ModelAdapter, ModelDescriptor, Normalization, PredictionResult, Result,
    };

    // Preprocessing
    pub use derma_transforms::{PreprocessConfig, Preprocessor};

    // Models
    pub use derma_models::{
        channel_first_descriptor, channel_last_descriptor, ChannelFirstAdapter, ChannelLastAdapter,
        MobileNetConfig, SequentialConfig, WeightSource,
    };

    // Explainability
    pub use derma_explain::{Compositor, CompositorConfig, GradCam, GradCamConfig, Heatmap, Visualization};

    // Cascade
    pub use derma_cascade::{
        CascadeConfig, CascadeController, CascadeObserver, CascadeResult, CascadeRouting, DermaConfig,
        DermaPipeline, Diagnosis, DiagnosisResponse, Stage,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use derma_cascade::DefaultPipeline;
    #[cfg(feature = "backend-ndarray")]
    pub use derma_models::backend::DefaultBackend;
}
