//! # derma_transforms
//!
//! Deterministic image filters applied before any model sees an image.
//!
//! This crate provides:
//! - Hair artifact removal (black-hat mask + Telea inpainting)
//! - Unsharp-mask sharpening
//! - Nearest-neighbour resize
//! - [`Preprocessor`], which chains them in a fixed, fail-soft order
//!
//! ## Example
//!
//! ```rust,ignore
//! use derma_transforms::{PreprocessConfig, Preprocessor};
//!
//! let pre = Preprocessor::new(&PreprocessConfig::default())?;
//! let ready = pre.preprocess(&image)?; // 224x224
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hair;
pub mod inpaint;
pub mod preprocess;
pub mod resize;
pub mod sharpen;

pub use hair::{HairRemoval, HairRemovalConfig};
pub use inpaint::inpaint_telea;
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use resize::NearestResize;
pub use sharpen::{SharpenConfig, UnsharpMask};
