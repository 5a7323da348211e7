//! The two-stage cascade.
//!
//! ```text
//! Start -> Stage1Predicted -> Finalized          (terminal stage-1 class)
//!                          -> Stage2Predicted    (specialist class)
//! ```
//!
//! Attribution runs exactly once per request, against the adapter whose
//! prediction became the final verdict.

use derma_core::{ModelAdapter, PredictionResult, Result};
use derma_explain::{GradCam, Heatmap};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::observer::{CascadeObserver, TracingObserver};
use crate::routing::CascadeConfig;

/// Which stage produced the final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// The triage model.
    Stage1,
    /// The specialist model.
    Stage2,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage1 => f.write_str("Stage1"),
            Self::Stage2 => f.write_str("Stage2"),
        }
    }
}

/// Outcome of one cascade run.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeResult {
    /// Human readable diagnosis.
    pub final_class: String,
    /// Class index within the deciding model.
    pub class_index: usize,
    /// Probability of the final class.
    pub confidence: f32,
    /// Stage whose prediction is reported.
    pub model_used: Stage,
    /// Grad-CAM heatmap at the input image's size.
    pub heatmap: Heatmap,
}

/// Routes an image through a triage model and, when needed, a specialist.
pub struct CascadeController<S1, S2, O = TracingObserver> {
    stage1: S1,
    stage2: S2,
    config: CascadeConfig,
    gradcam: GradCam,
    observer: O,
}

impl<S1, S2> CascadeController<S1, S2, TracingObserver>
where
    S1: ModelAdapter,
    S2: ModelAdapter,
{
    /// Create a cascade that reports progress through `tracing`.
    ///
    /// # Errors
    ///
    /// Fails when `config` does not fit the class counts of the two models.
    pub fn new(stage1: S1, stage2: S2, config: CascadeConfig, gradcam: GradCam) -> Result<Self> {
        config.validate(stage1.descriptor().n_classes, stage2.descriptor().n_classes)?;
        Ok(Self {
            stage1,
            stage2,
            config,
            gradcam,
            observer: TracingObserver,
        })
    }
}

impl<S1, S2, O> CascadeController<S1, S2, O>
where
    S1: ModelAdapter,
    S2: ModelAdapter,
    O: CascadeObserver,
{
    /// Replace the observer.
    pub fn with_observer<O2: CascadeObserver>(self, observer: O2) -> CascadeController<S1, S2, O2> {
        CascadeController {
            stage1: self.stage1,
            stage2: self.stage2,
            config: self.config,
            gradcam: self.gradcam,
            observer,
        }
    }

    /// The triage adapter.
    pub fn stage1(&self) -> &S1 {
        &self.stage1
    }

    /// The specialist adapter.
    pub fn stage2(&self) -> &S2 {
        &self.stage2
    }

    /// Routing and labels.
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// The observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Classify an already preprocessed image and explain the verdict.
    pub fn run(&self, image: &RgbImage) -> Result<CascadeResult> {
        let first = self.stage1.predict(image)?;
        self.observer.on_stage1(&first);

        let result = if self.config.routing.needs_specialist(first.class_index) {
            let second = self.stage2.predict(image)?;
            self.observer.on_stage2(&second);
            let label = self.config.stage2_label(second.class_index)?.to_string();
            self.finalize(&self.stage2, &second, label, Stage::Stage2, image)?
        } else {
            let label = self.config.routing.terminal_label.clone();
            self.finalize(&self.stage1, &first, label, Stage::Stage1, image)?
        };

        self.observer.on_finalized(&result);
        Ok(result)
    }

    fn finalize<A: ModelAdapter>(
        &self,
        adapter: &A,
        prediction: &PredictionResult,
        final_class: String,
        model_used: Stage,
        image: &RgbImage,
    ) -> Result<CascadeResult> {
        let heatmap = self.gradcam.explain(adapter, image, prediction.class_index)?;
        Ok(CascadeResult {
            final_class,
            class_index: prediction.class_index,
            confidence: prediction.confidence,
            model_used,
            heatmap,
        })
    }
}

impl<S1: ModelAdapter, S2: ModelAdapter, O: CascadeObserver> std::fmt::Debug for CascadeController<S1, S2, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeController")
            .field("stage1", &self.stage1.descriptor().name)
            .field("stage2", &self.stage2.descriptor().name)
            .field("routing", &self.config.routing)
            .field("observer", &self.observer.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::routing::CascadeRouting;
    use derma_core::{
        ChannelLayout, CoreError, FeatureGrid, ImageTensor, InputSize, LayerInfo, LayerKind, ModelDescriptor,
        Normalization, TargetCapture,
    };
    use image::Rgb;
    use ndarray::Array3;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter returning fixed probabilities and counting every call.
    pub(crate) struct FixedAdapter {
        descriptor: ModelDescriptor,
        target: LayerInfo,
        logits: Vec<f32>,
        pub forwards: AtomicUsize,
        pub captures: AtomicUsize,
        pub gradients: AtomicUsize,
        pub explained_classes: Mutex<Vec<usize>>,
    }

    impl FixedAdapter {
        pub(crate) fn new(name: &str, probabilities: &[f32], layout: ChannelLayout) -> Self {
            let descriptor = ModelDescriptor::new(
                name,
                probabilities.len(),
                layout,
                Normalization::symmetric_unit(),
                "conv",
            )
            .with_input_size(InputSize::square(8));
            Self {
                descriptor,
                target: LayerInfo::new("conv", LayerKind::Conv, 0),
                logits: probabilities.iter().map(|p| p.ln()).collect(),
                forwards: AtomicUsize::new(0),
                captures: AtomicUsize::new(0),
                gradients: AtomicUsize::new(0),
                explained_classes: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn attributions(&self) -> usize {
            self.captures.load(Ordering::SeqCst)
        }

        pub(crate) fn predictions(&self) -> usize {
            self.forwards.load(Ordering::SeqCst)
        }
    }

    impl ModelAdapter for FixedAdapter {
        type Tape = ();

        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        fn target_layer(&self) -> &LayerInfo {
            &self.target
        }

        fn layers(&self) -> Vec<LayerInfo> {
            vec![self.target.clone()]
        }

        fn forward(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
            self.forwards.fetch_add(1, Ordering::SeqCst);
            Ok(self.logits.clone())
        }

        fn capture_target_activation(&self, _input: &ImageTensor) -> Result<TargetCapture<()>> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            let shape = self.descriptor.layout.grid_shape(2, 4, 4);
            let activation = Array3::from_shape_fn(shape, |(a, b, c)| (a + 2 * b + 3 * c) as f32);
            Ok(TargetCapture {
                activation: FeatureGrid::new(activation, self.descriptor.layout),
                logits: self.logits.clone(),
                tape: (),
            })
        }

        fn gradient_of_class(&self, capture: &TargetCapture<()>, target_class: usize) -> Result<FeatureGrid> {
            self.gradients.fetch_add(1, Ordering::SeqCst);
            self.explained_classes.lock().push(target_class);
            let grid = capture.activation.values().mapv(|_| 1.0);
            Ok(FeatureGrid::new(grid, capture.activation.layout()))
        }
    }

    pub(crate) fn gray_image(side: u32) -> RgbImage {
        RgbImage::from_pixel(side, side, Rgb([128, 128, 128]))
    }

    fn cascade(p1: &[f32], p2: &[f32]) -> CascadeController<FixedAdapter, FixedAdapter> {
        CascadeController::new(
            FixedAdapter::new("stage1", p1, ChannelLayout::ChannelsFirst),
            FixedAdapter::new("stage2", p2, ChannelLayout::ChannelsLast),
            CascadeConfig::default(),
            GradCam::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_terminal_stage1() {
        let cascade = cascade(&[0.2, 0.8], &[0.1, 0.1, 0.1, 0.1, 0.4, 0.1, 0.1]);
        let image = gray_image(224);
        let result = cascade.run(&image).unwrap();

        assert_eq!(result.final_class, "Melanoma");
        assert_eq!(result.model_used, Stage::Stage1);
        assert_eq!(result.class_index, 1);
        assert!((result.confidence - 0.8).abs() < 1e-5);
        assert_eq!((result.heatmap.width(), result.heatmap.height()), (224, 224));

        assert_eq!(cascade.stage2().predictions(), 0);
        assert_eq!(cascade.stage2().attributions(), 0);
        assert_eq!(cascade.stage1().attributions(), 1);
        assert_eq!(*cascade.stage1().explained_classes.lock(), vec![1]);
    }

    #[test]
    fn test_specialist_stage2() {
        let cascade = cascade(&[0.9, 0.1], &[0.05, 0.05, 0.05, 0.05, 0.6, 0.1, 0.1]);
        let result = cascade.run(&gray_image(224)).unwrap();

        assert_eq!(result.final_class, "Melanoma");
        assert_eq!(result.model_used, Stage::Stage2);
        assert_eq!(result.class_index, 4);
        assert!((result.confidence - 0.6).abs() < 1e-5);

        assert_eq!(cascade.stage1().predictions(), 1);
        assert_eq!(cascade.stage1().attributions(), 0);
        assert_eq!(cascade.stage2().predictions(), 1);
        assert_eq!(cascade.stage2().attributions(), 1);
        assert_eq!(*cascade.stage2().explained_classes.lock(), vec![4]);
    }

    #[test]
    fn test_stage2_other_label() {
        let cascade = cascade(&[0.7, 0.3], &[0.05, 0.7, 0.05, 0.05, 0.05, 0.05, 0.05]);
        let result = cascade.run(&gray_image(32)).unwrap();
        assert_eq!(result.final_class, "Basal Cell Carcinoma");
    }

    #[test]
    fn test_exactly_one_attribution_per_request() {
        for p1 in [[0.2, 0.8], [0.8, 0.2]] {
            let cascade = cascade(&p1, &[0.1, 0.1, 0.1, 0.1, 0.4, 0.1, 0.1]);
            for _ in 0..3 {
                cascade.run(&gray_image(16)).unwrap();
            }
            let total = cascade.stage1().attributions() + cascade.stage2().attributions();
            assert_eq!(total, 3);
        }
    }

    #[test]
    fn test_heatmap_bounded() {
        let cascade = cascade(&[0.2, 0.8], &[0.1, 0.1, 0.1, 0.1, 0.4, 0.1, 0.1]);
        let result = cascade.run(&gray_image(50)).unwrap();
        assert!(result.heatmap.is_unit_bounded());
    }

    #[test]
    fn test_custom_routing() {
        let config = CascadeConfig {
            routing: CascadeRouting {
                specialist_index: 1,
                terminal_label: "Benign".into(),
            },
            ..Default::default()
        };
        let cascade = CascadeController::new(
            FixedAdapter::new("stage1", &[0.2, 0.8], ChannelLayout::ChannelsFirst),
            FixedAdapter::new("stage2", &[0.1, 0.1, 0.1, 0.1, 0.4, 0.1, 0.1], ChannelLayout::ChannelsLast),
            config,
            GradCam::default(),
        )
        .unwrap();
        assert_eq!(cascade.run(&gray_image(16)).unwrap().model_used, Stage::Stage2);
    }

    #[test]
    fn test_label_table_must_fit_stage2() {
        let err = CascadeController::new(
            FixedAdapter::new("stage1", &[0.5, 0.5], ChannelLayout::ChannelsFirst),
            FixedAdapter::new("stage2", &[0.5, 0.5], ChannelLayout::ChannelsLast),
            CascadeConfig::default(),
            GradCam::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_observer_sees_each_stage() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);

        impl CascadeObserver for Recorder {
            fn on_stage1(&self, p: &PredictionResult) {
                self.0.lock().push(format!("stage1:{}", p.class_index));
            }
            fn on_stage2(&self, p: &PredictionResult) {
                self.0.lock().push(format!("stage2:{}", p.class_index));
            }
            fn on_finalized(&self, r: &CascadeResult) {
                self.0.lock().push(format!("final:{}", r.model_used));
            }
        }

        let cascade =
            cascade(&[0.9, 0.1], &[0.05, 0.05, 0.05, 0.05, 0.6, 0.1, 0.1]).with_observer(Recorder::default());
        cascade.run(&gray_image(16)).unwrap();
        assert_eq!(
            *cascade.observer().0.lock(),
            vec!["stage1:0", "stage2:4", "final:Stage2"]
        );
    }
}
