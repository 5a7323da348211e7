//! Conversions between burn tensors and the backend-neutral core types.

use burn::prelude::*;
use burn::tensor::TensorData;
use derma_core::{ChannelLayout, CoreError, FeatureGrid, ImageTensor, Result};

/// Upload an image tensor, checking it was laid out for this backend.
pub(crate) fn image_to_tensor<B: Backend>(
    input: &ImageTensor,
    expected: ChannelLayout,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    if input.layout() != expected {
        return Err(CoreError::ShapeMismatch(format!(
            "expected a {expected:?} tensor, got {:?}",
            input.layout()
        )));
    }
    let data = TensorData::new(input.as_slice().to_vec(), input.dims());
    Ok(Tensor::from_data(data, device))
}

/// Download batch element 0 of a rank-4 tensor as a feature grid.
pub(crate) fn tensor_to_grid<B: Backend>(
    tensor: Tensor<B, 4>,
    layout: ChannelLayout,
) -> Result<FeatureGrid> {
    let [batch, a, b, c] = tensor.dims();
    if batch != 1 {
        return Err(CoreError::ShapeMismatch(format!("expected batch of one, got {batch}")));
    }
    let data = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CoreError::InferenceFailure(format!("reading activation: {e:?}")))?;
    FeatureGrid::from_vec(data, [a, b, c], layout)
}

/// Download `[1, n_classes]` logits.
pub(crate) fn logits_to_vec<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>> {
    logits
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CoreError::InferenceFailure(format!("reading logits: {e:?}")))
}

/// `[1, n_classes]` one-hot selector for `class`.
pub(crate) fn one_hot<B: Backend>(
    n_classes: usize,
    class: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    if class >= n_classes {
        return Err(CoreError::InferenceFailure(format!(
            "target class {class} out of range for {n_classes} classes"
        )));
    }
    let mut values = vec![0.0f32; n_classes];
    values[class] = 1.0;
    Ok(Tensor::from_data(TensorData::new(values, [1, n_classes]), device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray;

    #[test]
    fn test_grid_keeps_layout_order() {
        let device = Default::default();
        let input = ImageTensor::new(
            (0..24).map(|v| v as f32).collect(),
            [1, 2, 3, 4],
            ChannelLayout::ChannelsFirst,
        )
        .unwrap();
        let t = image_to_tensor::<B>(&input, ChannelLayout::ChannelsFirst, &device).unwrap();
        let grid = tensor_to_grid(t, ChannelLayout::ChannelsFirst).unwrap();

        assert_eq!(grid.channels(), 2);
        assert_eq!(grid.spatial(), (3, 4));
        assert_eq!(grid.to_vec(), input.as_slice().to_vec());
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let input = ImageTensor::new(vec![0.0; 12], [1, 2, 2, 3], ChannelLayout::ChannelsLast).unwrap();
        let err = image_to_tensor::<B>(&input, ChannelLayout::ChannelsFirst, &Default::default());
        assert!(matches!(err, Err(CoreError::ShapeMismatch(_))));
    }

    #[test]
    fn test_one_hot() {
        let t = one_hot::<B>(4, 2, &Default::default()).unwrap();
        assert_eq!(logits_to_vec(t).unwrap(), vec![0.0, 0.0, 1.0, 0.0]);
        assert!(one_hot::<B>(4, 4, &Default::default()).is_err());
    }
}
