//! Backend-neutral tensor types.
//!
//! Adapters own their backend tensors; what crosses component boundaries are
//! plain `f32` buffers tagged with a [`ChannelLayout`].

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, ArrayView2, Axis};

use crate::descriptor::ModelDescriptor;
use crate::error::{CoreError, Result};
use crate::imaging::validate_image;
use crate::layout::ChannelLayout;

/// A normalized image in tensor form, batch size one.
///
/// `dims` follows `layout`: `[1, C, H, W]` for channels-first and
/// `[1, H, W, C]` for channels-last.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    dims: [usize; 4],
    layout: ChannelLayout,
}

impl ImageTensor {
    /// Wrap a flat buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match `dims`.
    pub fn new(data: Vec<f32>, dims: [usize; 4], layout: ChannelLayout) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(CoreError::ShapeMismatch(format!(
                "tensor buffer has {} values, dims {:?} need {}",
                data.len(),
                dims,
                expected
            )));
        }
        if dims[0] != 1 {
            return Err(CoreError::ShapeMismatch(format!("batch size must be 1, got {}", dims[0])));
        }
        Ok(Self { data, dims, layout })
    }

    /// Convert a display-form image into the tensor form a model expects.
    ///
    /// Resizes (bilinear) to the descriptor's input size when needed, applies
    /// the descriptor's normalization and lays channels out in its order.
    pub fn from_image(image: &RgbImage, descriptor: &ModelDescriptor) -> Result<Self> {
        validate_image(image)?;
        let size = descriptor.input_size;
        let resized;
        let image = if image.width() != size.width || image.height() != size.height {
            resized = imageops::resize(image, size.width, size.height, FilterType::Triangle);
            &resized
        } else {
            image
        };

        let (h, w) = (size.height as usize, size.width as usize);
        let norm = &descriptor.normalization;
        let raw = image.as_raw();
        let mut data = vec![0.0f32; 3 * h * w];

        match descriptor.layout {
            ChannelLayout::ChannelsLast => {
                for (dst, (i, &px)) in data.iter_mut().zip(raw.iter().enumerate()) {
                    *dst = norm.apply(px, i % 3);
                }
            }
            ChannelLayout::ChannelsFirst => {
                let plane = h * w;
                for (p, rgb) in raw.chunks_exact(3).enumerate() {
                    for c in 0..3 {
                        data[c * plane + p] = norm.apply(rgb[c], c);
                    }
                }
            }
        }

        let dims = match descriptor.layout {
            ChannelLayout::ChannelsFirst => [1, 3, h, w],
            ChannelLayout::ChannelsLast => [1, h, w, 3],
        };
        Self::new(data, dims, descriptor.layout)
    }

    /// Flat values in `dims` order.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Tensor dimensions.
    #[must_use]
    pub const fn dims(&self) -> [usize; 4] {
        self.dims
    }

    /// Channel ordering.
    #[must_use]
    pub const fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// `(height, width)` of the image.
    #[must_use]
    pub const fn spatial(&self) -> (usize, usize) {
        match self.layout {
            ChannelLayout::ChannelsFirst => (self.dims[2], self.dims[3]),
            ChannelLayout::ChannelsLast => (self.dims[1], self.dims[2]),
        }
    }
}

/// An activation or gradient map at some layer, batch element zero.
///
/// Stored as `(C, H, W)` or `(H, W, C)` according to `layout`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGrid {
    values: Array3<f32>,
    layout: ChannelLayout,
}

impl FeatureGrid {
    /// Wrap an existing array.
    #[must_use]
    pub fn new(values: Array3<f32>, layout: ChannelLayout) -> Self {
        Self { values, layout }
    }

    /// Build from a flat buffer laid out per `layout`.
    pub fn from_vec(data: Vec<f32>, shape: [usize; 3], layout: ChannelLayout) -> Result<Self> {
        let values = Array3::from_shape_vec(shape, data)
            .map_err(|e| CoreError::ShapeMismatch(format!("feature grid {shape:?}: {e}")))?;
        Ok(Self { values, layout })
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.values.len_of(Axis(self.layout.channel_axis()))
    }

    /// `(height, width)`.
    #[must_use]
    pub fn spatial(&self) -> (usize, usize) {
        let dims = self.values.dim();
        let (_, h, w) = self.layout.split_shape([dims.0, dims.1, dims.2]);
        (h, w)
    }

    /// Channel ordering.
    #[must_use]
    pub const fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// The `(H, W)` plane of channel `c`.
    #[must_use]
    pub fn channel(&self, c: usize) -> ArrayView2<'_, f32> {
        self.values.index_axis(Axis(self.layout.channel_axis()), c)
    }

    /// Raw values.
    #[must_use]
    pub const fn values(&self) -> &Array3<f32> {
        &self.values
    }

    /// Flat values in logical (row-major) order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }

    /// Whether two grids describe the same `(C, H, W)` extent.
    #[must_use]
    pub fn same_extent(&self, other: &Self) -> bool {
        self.channels() == other.channels() && self.spatial() == other.spatial()
    }
}
