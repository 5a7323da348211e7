//! # derma_core
//!
//! Core types and traits for derma-rs dermoscopy classification.
//!
//! This crate provides:
//! - [`ImageTensor`] and [`FeatureGrid`], backend-neutral tensors tagged with a
//!   [`ChannelLayout`]
//! - [`ModelDescriptor`] holding per-backend input, normalization and target
//!   layer configuration
//! - [`ModelAdapter`], the capability surface every inference backend exposes
//! - [`ImageFilter`] and [`FilterChain`] for fail-soft preprocessing
//! - [`CoreError`], the error taxonomy shared by every crate
//!
//! ## Layout Convention
//!
//! Image tensors always have batch size one:
//! - `ChannelsFirst`: `(1, C, H, W)`
//! - `ChannelsLast`: `(1, H, W, C)`
//!
//! ## Example
//!
//! ```rust,ignore
//! use derma_core::{ChannelLayout, ImageTensor, ModelDescriptor, Normalization};
//!
//! let desc = ModelDescriptor::new("stage1", 2, ChannelLayout::ChannelsFirst,
//!     Normalization::imagenet(), "features");
//! let tensor = ImageTensor::from_image(&image, &desc)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
mod descriptor;
mod error;
mod imaging;
mod layout;
mod prediction;
mod tensor;
mod transform;

pub use adapter::{resolve_target_layer, LayerInfo, LayerKind, ModelAdapter, TargetCapture};
pub use descriptor::{ModelDescriptor, Normalization};
pub use error::{CoreError, ErrorClass, Result};
pub use imaging::{rgb_from_raw, validate_image};
pub use layout::{ChannelLayout, InputSize};
pub use prediction::{softmax, PredictionResult};
pub use tensor::{FeatureGrid, ImageTensor};
pub use transform::{FilterChain, Identity, ImageFilter};
