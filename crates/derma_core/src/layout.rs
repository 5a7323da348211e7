//! Tensor layout and input size metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Channel ordering of an image tensor.
///
/// Batch size is always one, so only the position of the channel axis matters:
/// - `ChannelsFirst`: `(N, C, H, W)`
/// - `ChannelsLast`: `(N, H, W, C)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// `NCHW`.
    ChannelsFirst,
    /// `NHWC`.
    ChannelsLast,
}

impl ChannelLayout {
    /// Axis of the channel dimension in a rank-3 `(C,H,W)` / `(H,W,C)` grid.
    #[must_use]
    pub const fn channel_axis(self) -> usize {
        match self {
            Self::ChannelsFirst => 0,
            Self::ChannelsLast => 2,
        }
    }

    /// Arrange `(channels, height, width)` into this layout's rank-3 shape.
    #[must_use]
    pub const fn grid_shape(self, channels: usize, height: usize, width: usize) -> [usize; 3] {
        match self {
            Self::ChannelsFirst => [channels, height, width],
            Self::ChannelsLast => [height, width, channels],
        }
    }

    /// Recover `(channels, height, width)` from a rank-3 shape in this layout.
    #[must_use]
    pub const fn split_shape(self, shape: [usize; 3]) -> (usize, usize, usize) {
        match self {
            Self::ChannelsFirst => (shape[0], shape[1], shape[2]),
            Self::ChannelsLast => (shape[2], shape[0], shape[1]),
        }
    }
}

/// Spatial size expected by a model or produced by a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl InputSize {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A square size.
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Number of pixels.
    #[must_use]
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Reject zero-sized dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::Config(format!(
                "input size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::square(224)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape_roundtrip() {
        for layout in [ChannelLayout::ChannelsFirst, ChannelLayout::ChannelsLast] {
            let shape = layout.grid_shape(8, 5, 7);
            assert_eq!(layout.split_shape(shape), (8, 5, 7));
        }
        assert_eq!(ChannelLayout::ChannelsLast.grid_shape(8, 5, 7), [5, 7, 8]);
    }

    #[test]
    fn test_layout_serde() {
        let json = serde_json::to_string(&ChannelLayout::ChannelsLast).unwrap();
        assert_eq!(json, "\"channels_last\"");
    }

    #[test]
    fn test_input_size() {
        assert_eq!(InputSize::default(), InputSize::new(224, 224));
        assert_eq!(InputSize::new(4, 3).area(), 12);
        assert!(InputSize::new(0, 3).validate().is_err());
    }
}
