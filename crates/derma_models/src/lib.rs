//! # derma_models
//!
//! The two network families used by the cascade and their model adapters.
//!
//! ## Networks
//! - [`MobileNet`]: MobileNetV2-style, channels-first, module-path layer names
//! - [`SequentialCnn`]: Keras-style sequential CNN, channels-last, Keras names
//!
//! ## Adapters
//! - [`ChannelFirstAdapter`]: gradients by graph replay from the captured
//!   activation
//! - [`ChannelLastAdapter`]: gradients from a [`GradientTape`] recorded during
//!   the forward pass
//!
//! Both implement [`derma_core::ModelAdapter`] and are generic over any
//! [`burn`] autodiff backend; [`backend::DefaultBackend`] is
//! `Autodiff<NdArray>`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use derma_models::{backend::DefaultBackend, channel_first_descriptor, ChannelFirstAdapter,
//!     MobileNetConfig, WeightSource};
//!
//! let adapter = ChannelFirstAdapter::<DefaultBackend>::from_config(
//!     channel_first_descriptor("melanoma", 2),
//!     &MobileNetConfig::new(2),
//!     &WeightSource::Checkpoint { path: "models/stage1".into() },
//!     Default::default(),
//! )?;
//! let prediction = adapter.predict(&image)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod backend;
pub mod checkpoint;
mod convert;
pub mod mobilenet;
pub mod sequential;
pub mod tape;

pub use adapter::{channel_first_descriptor, channel_last_descriptor, ChannelFirstAdapter, ChannelLastAdapter};
pub use checkpoint::{load_weights, save_weights, WeightSource};
pub use mobilenet::{InvertedResidualSpec, MobileNet, MobileNetConfig};
pub use sequential::{SequentialCnn, SequentialConfig};
pub use tape::{GradientTape, ReplayState};
