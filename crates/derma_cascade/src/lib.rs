//! # derma_cascade
//!
//! The two-stage cascade and the end-to-end request path for derma-rs.
//!
//! This crate provides:
//! - [`CascadeController`], which runs the triage model, routes to the
//!   specialist when needed, and explains whichever verdict is final
//! - [`CascadeObserver`] hooks, with [`TracingObserver`] as the default
//! - [`DermaPipeline`]: preprocess, cascade, composite
//! - [`DermaConfig`], the JSON configuration file
//!
//! ## Example
//!
//! ```rust,ignore
//! use derma_cascade::{DefaultPipeline, DermaConfig};
//!
//! let config = DermaConfig::load("derma.json")?;
//! let pipeline = DefaultPipeline::from_config(&config, Default::default())?;
//! let diagnosis = pipeline.process(&image)?;
//! println!("{} ({:.2}) via {}", diagnosis.final_class, diagnosis.confidence, diagnosis.model_used);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod observer;
pub mod pipeline;
pub mod routing;

pub use config::{DermaConfig, ModelSection};
pub use controller::{CascadeController, CascadeResult, Stage};
pub use observer::{CascadeObserver, NoopObserver, ObserverList, TracingObserver};
#[cfg(feature = "backend-ndarray")]
pub use pipeline::DefaultPipeline;
pub use pipeline::{DermaPipeline, Diagnosis, DiagnosisResponse};
pub use routing::{CascadeConfig, CascadeRouting, DEFAULT_STAGE2_LABELS};
