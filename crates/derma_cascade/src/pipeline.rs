//! Preprocess, classify, explain, composite.

use derma_core::{validate_image, ModelAdapter, Result};
use derma_explain::{Compositor, GradCam, Heatmap, Visualization};
use derma_models::backend::AutodiffBackend;
use derma_models::{ChannelFirstAdapter, ChannelLastAdapter};
use derma_transforms::Preprocessor;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::DermaConfig;
use crate::controller::{CascadeController, Stage};
use crate::observer::{CascadeObserver, TracingObserver};

/// Final output for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    /// Human readable diagnosis.
    pub final_class: String,
    /// Probability of the final class.
    pub confidence: f32,
    /// Stage whose prediction is reported.
    pub model_used: Stage,
    /// Attention heatmap at the preprocessed image's size.
    pub heatmap: Heatmap,
    /// The heatmap blended onto the preprocessed image.
    pub visualization: Visualization,
}

/// Wire form of a [`Diagnosis`]; the visualization is an encoded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    /// Human readable diagnosis.
    pub final_class: String,
    /// Probability of the final class.
    pub confidence: f32,
    /// `"Stage1"` or `"Stage2"`.
    pub model_used: Stage,
    /// Encoded overlay image.
    pub visualization: String,
    /// Caveat attached to the result, e.g. untrained weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DiagnosisResponse {
    /// Pair a diagnosis with its already encoded overlay.
    pub fn from_diagnosis(diagnosis: &Diagnosis, visualization: String) -> Self {
        Self {
            final_class: diagnosis.final_class.clone(),
            confidence: diagnosis.confidence,
            model_used: diagnosis.model_used,
            visualization,
            note: None,
        }
    }

    /// Attach a caveat.
    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// The complete request path.
pub struct DermaPipeline<S1, S2, O = TracingObserver> {
    preprocessor: Preprocessor,
    controller: CascadeController<S1, S2, O>,
    compositor: Compositor,
}

/// Pipeline over the two burn adapters on the default backend.
#[cfg(feature = "backend-ndarray")]
pub type DefaultPipeline = DermaPipeline<
    ChannelFirstAdapter<derma_models::backend::DefaultBackend>,
    ChannelLastAdapter<derma_models::backend::DefaultBackend>,
>;

impl<S1, S2, O> DermaPipeline<S1, S2, O>
where
    S1: ModelAdapter,
    S2: ModelAdapter,
    O: CascadeObserver,
{
    /// Assemble from parts.
    pub fn new(preprocessor: Preprocessor, controller: CascadeController<S1, S2, O>, compositor: Compositor) -> Self {
        Self {
            preprocessor,
            controller,
            compositor,
        }
    }

    /// The preprocessor.
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// The cascade.
    pub fn controller(&self) -> &CascadeController<S1, S2, O> {
        &self.controller
    }

    /// Diagnose a raw image.
    ///
    /// # Errors
    ///
    /// [`derma_core::CoreError::InvalidInput`] for an empty image; anything the
    /// cascade reports otherwise. Filter failures are absorbed.
    pub fn process(&self, image: &RgbImage) -> Result<Diagnosis> {
        validate_image(image)?;
        let prepared = self.preprocessor.preprocess(image)?;
        let result = self.controller.run(&prepared)?;
        let visualization = self.compositor.composite(&prepared, &result.heatmap);

        Ok(Diagnosis {
            final_class: result.final_class,
            confidence: result.confidence,
            model_used: result.model_used,
            heatmap: result.heatmap,
            visualization,
        })
    }
}

impl<B: AutodiffBackend> DermaPipeline<ChannelFirstAdapter<B>, ChannelLastAdapter<B>> {
    /// Build both adapters and every stage from a config.
    pub fn from_config(config: &DermaConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        let stage1 = ChannelFirstAdapter::from_config(
            config.stage1.descriptor.clone(),
            &config.stage1.architecture,
            &config.stage1.weights,
            device.clone(),
        )?;
        let stage2 = ChannelLastAdapter::from_config(
            config.stage2.descriptor.clone(),
            &config.stage2.architecture,
            &config.stage2.weights,
            device,
        )?;
        let controller = CascadeController::new(stage1, stage2, config.cascade.clone(), GradCam::new(config.gradcam))?;

        Ok(Self::new(
            Preprocessor::new(&config.preprocess)?,
            controller,
            Compositor::new(config.compositor),
        ))
    }
}

impl<S1: ModelAdapter, S2: ModelAdapter, O: CascadeObserver> std::fmt::Debug for DermaPipeline<S1, S2, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DermaPipeline")
            .field("preprocessor", &self.preprocessor)
            .field("controller", &self.controller)
            .field("compositor", &self.compositor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{gray_image, FixedAdapter};
    use crate::routing::CascadeConfig;
    use derma_core::{ChannelLayout, CoreError, FilterChain, InputSize};
    use image::Rgb;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn pipeline(p1: &[f32], target: u32) -> DermaPipeline<FixedAdapter, FixedAdapter> {
        let controller = CascadeController::new(
            FixedAdapter::new("stage1", p1, ChannelLayout::ChannelsFirst),
            FixedAdapter::new("stage2", &[0.05, 0.05, 0.05, 0.05, 0.6, 0.1, 0.1], ChannelLayout::ChannelsLast),
            CascadeConfig::default(),
            GradCam::default(),
        )
        .unwrap();
        DermaPipeline::new(
            Preprocessor::from_parts(FilterChain::new(), InputSize::square(target)),
            controller,
            Compositor::default(),
        )
    }

    #[test]
    fn test_process_terminal() {
        let diagnosis = pipeline(&[0.2, 0.8], 32).process(&gray_image(100)).unwrap();
        assert_eq!(diagnosis.final_class, "Melanoma");
        assert_eq!(diagnosis.model_used, Stage::Stage1);
        assert_eq!((diagnosis.visualization.height(), diagnosis.visualization.width()), (32, 32));
        assert!(diagnosis.visualization.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_process_full_preprocessing() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let image = RgbImage::from_fn(48, 40, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));
        let controller = CascadeController::new(
            FixedAdapter::new("stage1", &[0.9, 0.1], ChannelLayout::ChannelsFirst),
            FixedAdapter::new("stage2", &[0.05, 0.05, 0.05, 0.05, 0.6, 0.1, 0.1], ChannelLayout::ChannelsLast),
            CascadeConfig::default(),
            GradCam::default(),
        )
        .unwrap();
        let pipeline = DermaPipeline::new(Preprocessor::default(), controller, Compositor::default());

        let diagnosis = pipeline.process(&image).unwrap();
        assert_eq!(diagnosis.model_used, Stage::Stage2);
        assert_eq!((diagnosis.heatmap.height(), diagnosis.heatmap.width()), (224, 224));
        assert!(diagnosis.heatmap.is_unit_bounded());
    }

    #[test]
    fn test_empty_image_is_client_error() {
        let err = pipeline(&[0.2, 0.8], 16).process(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_response_json() {
        let diagnosis = pipeline(&[0.9, 0.1], 16).process(&gray_image(16)).unwrap();
        let response = DiagnosisResponse::from_diagnosis(&diagnosis, "abc".into());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["final_class"], "Melanoma");
        assert_eq!(value["model_used"], "Stage2");
        assert_eq!(value["visualization"], "abc");
        assert!(value.get("note").is_none());

        let noted = response.with_note(Some("untrained weights".into()));
        let value = serde_json::to_value(&noted).unwrap();
        assert_eq!(value["note"], "untrained weights");
        let back: DiagnosisResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, noted);
    }
}
