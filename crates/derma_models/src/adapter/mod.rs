//! [`ModelAdapter`](derma_core::ModelAdapter) implementations.
//!
//! - [`ChannelFirstAdapter`]: NCHW, module-path layer names, graph replay
//! - [`ChannelLastAdapter`]: NHWC, Keras layer names, gradient tape

mod channel_first;
mod channel_last;

pub use channel_first::{channel_first_descriptor, ChannelFirstAdapter};
pub use channel_last::{channel_last_descriptor, ChannelLastAdapter};

use derma_core::{
    resolve_target_layer, ChannelLayout, CoreError, FeatureGrid, LayerInfo, ModelDescriptor, Result,
};

fn check_descriptor(descriptor: &ModelDescriptor, layout: ChannelLayout, n_classes: usize) -> Result<()> {
    descriptor.validate()?;
    if descriptor.layout != layout {
        return Err(CoreError::Config(format!(
            "model '{}' is {:?} but its descriptor says {:?}",
            descriptor.name, layout, descriptor.layout
        )));
    }
    if descriptor.n_classes != n_classes {
        return Err(CoreError::Config(format!(
            "model '{}' has {} outputs but its descriptor says {}",
            descriptor.name, n_classes, descriptor.n_classes
        )));
    }
    Ok(())
}

fn resolve_spatial_target(
    descriptor: &ModelDescriptor,
    layers: &[LayerInfo],
    is_spatial: impl Fn(&LayerInfo) -> bool,
) -> Result<LayerInfo> {
    let (target, _) = resolve_target_layer(
        layers,
        &descriptor.target_layer,
        &descriptor.name,
        descriptor.fallback_to_last_conv,
    )?;
    if !is_spatial(&target) {
        return Err(CoreError::Config(format!(
            "layer '{}' of '{}' has no spatial extent",
            target.name, descriptor.name
        )));
    }
    Ok(target)
}

fn check_logits(descriptor: &ModelDescriptor, logits: Vec<f32>) -> Result<Vec<f32>> {
    if logits.len() != descriptor.n_classes {
        return Err(CoreError::InferenceFailure(format!(
            "model '{}' produced {} logits, expected {}",
            descriptor.name,
            logits.len(),
            descriptor.n_classes
        )));
    }
    Ok(logits)
}

fn check_gradient(activation: &FeatureGrid, gradient: FeatureGrid) -> Result<FeatureGrid> {
    if !gradient.same_extent(activation) {
        return Err(CoreError::ShapeMismatch(format!(
            "gradient {:?} does not match activation {:?}",
            gradient.values().dim(),
            activation.values().dim()
        )));
    }
    Ok(gradient)
}
