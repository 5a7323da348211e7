//! Backend re-exports.

pub use burn::tensor::backend::{AutodiffBackend, Backend};
pub use burn_autodiff::Autodiff;

#[cfg(feature = "backend-ndarray")]
pub use burn_ndarray::{NdArray, NdArrayDevice};

/// The backend used when none is chosen explicitly: CPU ndarray with autodiff.
#[cfg(feature = "backend-ndarray")]
pub type DefaultBackend = Autodiff<NdArray>;
