//! Hooks notified as a request moves through the cascade.

use derma_core::PredictionResult;

use crate::controller::CascadeResult;

/// Observer of cascade progress.
///
/// Observers are shared across concurrent requests, so hooks take `&self`.
/// All hooks default to doing nothing.
pub trait CascadeObserver: Send + Sync {
    /// Stage 1 produced a prediction.
    fn on_stage1(&self, _prediction: &PredictionResult) {}

    /// Stage 2 produced a prediction.
    fn on_stage2(&self, _prediction: &PredictionResult) {}

    /// The request reached its final verdict.
    fn on_finalized(&self, _result: &CascadeResult) {}

    /// Observer name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Emits `tracing` events for every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CascadeObserver for TracingObserver {
    fn on_stage1(&self, prediction: &PredictionResult) {
        tracing::info!(
            "Stage 1 predicted class {} ({:.3})",
            prediction.class_index,
            prediction.confidence
        );
    }

    fn on_stage2(&self, prediction: &PredictionResult) {
        tracing::info!(
            "Stage 2 predicted class {} ({:.3})",
            prediction.class_index,
            prediction.confidence
        );
    }

    fn on_finalized(&self, result: &CascadeResult) {
        tracing::info!(
            "Diagnosis '{}' ({:.3}) from {:?}",
            result.final_class,
            result.confidence,
            result.model_used
        );
    }

    fn name(&self) -> &str {
        "TracingObserver"
    }
}

/// Ignores every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CascadeObserver for NoopObserver {
    fn name(&self) -> &str {
        "NoopObserver"
    }
}

/// Forwards every hook to several observers in order.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn CascadeObserver>>,
}

impl ObserverList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    #[must_use]
    pub fn with<O: CascadeObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Number of observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl CascadeObserver for ObserverList {
    fn on_stage1(&self, prediction: &PredictionResult) {
        self.observers.iter().for_each(|o| o.on_stage1(prediction));
    }

    fn on_stage2(&self, prediction: &PredictionResult) {
        self.observers.iter().for_each(|o| o.on_stage2(prediction));
    }

    fn on_finalized(&self, result: &CascadeResult) {
        self.observers.iter().for_each(|o| o.on_finalized(result));
    }

    fn name(&self) -> &str {
        "ObserverList"
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.observers.iter().map(|o| o.name()))
            .finish()
    }
}
