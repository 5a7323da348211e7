//! Gradient state carried from an activation capture to the gradient call.
//!
//! Two idioms are supported:
//! - [`GradientTape`]: the forward pass runs on the autodiff backend and the
//!   watched activation is a leaf of the recorded graph. Replaying the tape
//!   backward yields its gradient. A tape can be replayed once.
//! - [`ReplayState`]: the forward pass runs without gradient bookkeeping and
//!   only the activation is kept. The gradient call rebuilds the graph from it.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use derma_core::{CoreError, Result};
use parking_lot::Mutex;

/// A recorded forward pass with one watched activation.
#[derive(Debug)]
pub struct GradientTape<B: AutodiffBackend> {
    watched: Option<Tensor<B, 4>>,
    output: Mutex<Option<Tensor<B, 2>>>,
}

impl<B: AutodiffBackend> GradientTape<B> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self {
            watched: None,
            output: Mutex::new(None),
        }
    }

    /// Watch `activation`: it is detached, made a leaf that requires grad,
    /// stored, and returned so the forward pass continues from it.
    pub fn watch(&mut self, activation: Tensor<B, 4>) -> Tensor<B, 4> {
        let leaf = Tensor::from_inner(activation.inner()).require_grad();
        self.watched = Some(leaf.clone());
        leaf
    }

    /// Record the output the gradient will be taken of.
    pub fn record_output(&mut self, output: Tensor<B, 2>) {
        *self.output.get_mut() = Some(output);
    }

    /// The watched activation, without gradient tracking.
    pub fn watched(&self) -> Option<Tensor<B::InnerBackend, 4>> {
        self.watched.as_ref().map(|t| t.clone().inner())
    }

    /// Whether the tape can still be replayed.
    pub fn is_live(&self) -> bool {
        self.watched.is_some() && self.output.lock().is_some()
    }

    /// Gradient of `sum(output * weights)` w.r.t. the watched activation.
    ///
    /// Consumes the recorded output: a second call fails.
    pub fn gradient(&self, weights: Tensor<B, 2>) -> Result<Tensor<B::InnerBackend, 4>> {
        let watched = self
            .watched
            .as_ref()
            .ok_or_else(|| CoreError::InferenceFailure("gradient tape watched no activation".into()))?;
        let output = self
            .output
            .lock()
            .take()
            .ok_or_else(|| CoreError::InferenceFailure("gradient tape already replayed".into()))?;

        let grads = (output * weights).sum().backward();
        watched
            .grad(&grads)
            .ok_or_else(|| CoreError::InferenceFailure("watched activation received no gradient".into()))
    }
}

impl<B: AutodiffBackend> Default for GradientTape<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Activation kept for graph replay.
#[derive(Debug, Clone)]
pub struct ReplayState<B: AutodiffBackend> {
    /// The captured activation, on the inner backend.
    pub activation: Tensor<B::InnerBackend, 4>,
    /// Index of the layer that produced it.
    pub layer_index: usize,
}

impl<B: AutodiffBackend> ReplayState<B> {
    /// Wrap a captured activation.
    pub fn new(activation: Tensor<B::InnerBackend, 4>, layer_index: usize) -> Self {
        Self {
            activation,
            layer_index,
        }
    }

    /// A fresh autodiff leaf holding the activation.
    pub fn leaf(&self) -> Tensor<B, 4> {
        Tensor::from_inner(self.activation.clone()).require_grad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use burn::tensor::TensorData;

    type B = DefaultBackend;

    #[test]
    fn test_empty_tape() {
        let tape: GradientTape<B> = GradientTape::new();
        assert!(!tape.is_live());
        assert!(tape.watched().is_none());
    }

    #[test]
    fn test_tape_gradient_of_linear_output() {
        let device = Default::default();
        let x: Tensor<B, 4> = Tensor::from_data(TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]), &device);

        let mut tape = GradientTape::new();
        let leaf = tape.watch(x);
        // output = [3 * sum(x), sum(x)]
        let s = leaf.sum().reshape([1, 1]);
        let output = Tensor::cat(vec![s.clone() * 3.0, s], 1);
        tape.record_output(output);
        assert!(tape.is_live());

        let weights: Tensor<B, 2> = Tensor::from_data(TensorData::new(vec![1.0f32, 0.0], [1, 2]), &device);
        let grad = tape.gradient(weights.clone()).unwrap();
        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0; 4]);

        assert!(!tape.is_live());
        assert!(tape.gradient(weights).is_err());
    }

    #[test]
    fn test_replay_leaf_requires_grad() {
        let device = Default::default();
        let inner = Tensor::from_data(TensorData::new(vec![0.5f32; 4], [1, 1, 2, 2]), &device);
        let state = ReplayState::<B>::new(inner, 3);

        let leaf = state.leaf();
        let grads = (leaf.clone() * 2.0).sum().backward();
        let grad = leaf.grad(&grads).unwrap();
        assert_eq!(grad.into_data().to_vec::<f32>().unwrap(), vec![2.0; 4]);
        assert_eq!(state.layer_index, 3);
    }
}
