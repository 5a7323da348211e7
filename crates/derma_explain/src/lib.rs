//! # derma_explain
//!
//! Explainability for derma-rs: Grad-CAM attribution and heatmap overlays.
//!
//! This crate provides:
//! - [`GradCam`], written once against [`derma_core::ModelAdapter`] so it works
//!   for channels-first and channels-last backends alike
//! - [`Heatmap`], a normalized attention grid with bilinear resampling
//! - [`Compositor`], which tints the source image with a heatmap

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod gradcam;
mod heatmap;
mod overlay;

pub use gradcam::{GradCam, GradCamConfig};
pub use heatmap::Heatmap;
pub use overlay::{Compositor, CompositorConfig, Visualization};
