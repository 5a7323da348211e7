//! Integration tests for the full request path.
//!
//! These tests run the real burn networks at a small input size with seeded
//! weights.

use derma::models::backend::DefaultBackend;
use derma::models::{load_weights, save_weights, MobileNet};
use derma::prelude::*;
use image::{Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

type B = DefaultBackend;

const SIDE: u32 = 48;

/// Synthetic lesion: a dark blob on skin-coloured noise, crossed by a thin
/// dark line.
fn synthetic_lesion(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 4.0;
    RgbImage::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let noise: i16 = rng.gen_range(-12..=12);
        let base: [i16; 3] = if d < radius { [90, 55, 40] } else { [215, 170, 150] };
        if y == x / 2 {
            return Rgb([20, 15, 10]);
        }
        Rgb(base.map(|v| (v + noise).clamp(0, 255) as u8))
    })
}

fn small_config() -> DermaConfig {
    let mut config = DermaConfig::default();
    config.preprocess.target_size = InputSize::square(SIDE);
    config.stage1.descriptor.input_size = InputSize::square(SIDE);
    config.stage2.descriptor.input_size = InputSize::square(SIDE);
    config
}

fn stage1(config: &DermaConfig) -> ChannelFirstAdapter<B> {
    ChannelFirstAdapter::from_config(
        config.stage1.descriptor.clone(),
        &config.stage1.architecture,
        &config.stage1.weights,
        Default::default(),
    )
    .unwrap()
}

fn stage2(config: &DermaConfig) -> ChannelLastAdapter<B> {
    ChannelLastAdapter::from_config(
        config.stage2.descriptor.clone(),
        &config.stage2.architecture,
        &config.stage2.weights,
        Default::default(),
    )
    .unwrap()
}

#[test]
fn test_heatmaps_bounded_for_both_adapters() {
    let config = small_config();
    let cam = GradCam::default();
    let image = synthetic_lesion(SIDE, SIDE, 1);

    let first = stage1(&config);
    for class in 0..2 {
        let heatmap = cam.explain(&first, &image, class).unwrap();
        assert_eq!((heatmap.width(), heatmap.height()), (SIDE as usize, SIDE as usize));
        assert!(heatmap.is_unit_bounded());
    }

    let second = stage2(&config);
    for class in [0, 4, 6] {
        let heatmap = cam.explain(&second, &image, class).unwrap();
        assert_eq!((heatmap.width(), heatmap.height()), (SIDE as usize, SIDE as usize));
        assert!(heatmap.is_unit_bounded());
    }
}

#[test]
fn test_stage2_default_target_falls_back() {
    let config = small_config();
    assert_eq!(stage2(&config).target_layer().name, "conv2d_2");
    assert_eq!(stage1(&config).target_layer().name, "features");
}

#[test]
fn test_pipeline_end_to_end() {
    let config = small_config();
    let pipeline = DefaultPipeline::from_config(&config, Default::default()).unwrap();
    let image = synthetic_lesion(80, 64, 2);

    let diagnosis = pipeline.process(&image).unwrap();
    assert_eq!(
        (diagnosis.visualization.height(), diagnosis.visualization.width()),
        (SIDE as usize, SIDE as usize)
    );
    assert!(diagnosis.visualization.values().iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(diagnosis.heatmap.is_unit_bounded());
    assert!((0.0..=1.0).contains(&diagnosis.confidence));

    // The reported stage agrees with the routing rule applied to stage 1.
    let prepared = pipeline.preprocessor().preprocess(&image).unwrap();
    let triage = pipeline.controller().stage1().predict(&prepared).unwrap();
    let expected = if config.cascade.routing.needs_specialist(triage.class_index) {
        Stage::Stage2
    } else {
        Stage::Stage1
    };
    assert_eq!(diagnosis.model_used, expected);
    if expected == Stage::Stage1 {
        assert_eq!(diagnosis.final_class, "Melanoma");
        assert!((diagnosis.confidence - triage.confidence).abs() < 1e-5);
    } else {
        assert!(config.cascade.stage2_labels.contains(&diagnosis.final_class));
    }
}

#[test]
fn test_pipeline_is_repeatable() {
    let pipeline = DefaultPipeline::from_config(&small_config(), Default::default()).unwrap();
    let image = synthetic_lesion(SIDE, SIDE, 3);
    let a = pipeline.process(&image).unwrap();
    let b = pipeline.process(&image).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_invalid_input_is_client_error() {
    let pipeline = DefaultPipeline::from_config(&small_config(), Default::default()).unwrap();
    let err = pipeline.process(&RgbImage::new(0, 5)).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Client);
}

#[test]
fn test_checkpoint_weights_match() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stage1");
    let config = small_config();
    let device = Default::default();

    let model: MobileNet<B> = config.stage1.architecture.init(&device);
    save_weights(&model, &path).unwrap();
    let direct = ChannelFirstAdapter::new(config.stage1.descriptor.clone(), model, device.clone()).unwrap();

    let mut from_file = config.clone();
    from_file.stage1.weights = WeightSource::Checkpoint { path: path.clone() };
    let loaded = stage1(&from_file);

    let image = synthetic_lesion(SIDE, SIDE, 4);
    let a = direct.predict(&image).unwrap();
    let b = loaded.predict(&image).unwrap();
    for (x, y) in a.probabilities.iter().zip(&b.probabilities) {
        assert!((x - y).abs() < 1e-6);
    }

    let reloaded: MobileNet<B> = load_weights(config.stage1.architecture.init(&device), &path, &device).unwrap();
    assert_eq!(reloaded.n_classes(), 2);
}

#[test]
fn test_config_file_drives_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("derma.json");
    let mut config = small_config();
    config.compositor.alpha = 0.25;
    config.save(&path).unwrap();

    let loaded = DermaConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let pipeline = DefaultPipeline::from_config(&loaded, Default::default()).unwrap();
    assert_eq!(pipeline.preprocessor().target_size(), InputSize::square(SIDE));
}

#[test]
fn test_default_config_json_round_trip() {
    let json = DermaConfig::default().to_json().unwrap();
    assert_eq!(DermaConfig::from_json(&json).unwrap(), DermaConfig::default());
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["stage1"]["descriptor"]["layout"], serde_json::json!("channels_first"));
}
