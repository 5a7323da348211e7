//! Classification outputs.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// The result of running one classifier on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Index of the most probable class.
    pub class_index: usize,
    /// Softmax probabilities, one per class.
    pub probabilities: Vec<f32>,
    /// `probabilities[class_index]`.
    pub confidence: f32,
}

impl PredictionResult {
    /// Build from a probability vector, picking the arg-max class.
    ///
    /// Ties resolve to the lowest index.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self> {
        let class_index = argmax(&probabilities)?;
        let confidence = probabilities[class_index];
        Ok(Self {
            class_index,
            probabilities,
            confidence,
        })
    }

    /// Apply softmax to raw logits and build the result.
    pub fn from_logits(logits: &[f32]) -> Result<Self> {
        Self::from_probabilities(softmax(logits)?)
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.probabilities.len()
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Result<Vec<f32>> {
    if logits.is_empty() {
        return Err(CoreError::InferenceFailure("model produced no logits".to_string()));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::InferenceFailure(format!("non-finite logits: {logits:?}")));
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

fn argmax(values: &[f32]) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return Err(CoreError::InferenceFailure("NaN probability".to_string()));
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| CoreError::InferenceFailure("empty probability vector".to_string()))
}
