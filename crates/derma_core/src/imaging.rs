//! Display-form image helpers.

use image::RgbImage;

use crate::error::{CoreError, Result};

/// Reject images the pipeline cannot process.
pub fn validate_image(image: &RgbImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CoreError::InvalidInput(format!(
            "image has zero extent ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Build an RGB image from an interleaved sample buffer.
///
/// `channels` is the sample count per pixel of `data`; anything other than 3
/// is rejected rather than guessed at.
pub fn rgb_from_raw(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Result<RgbImage> {
    if channels != 3 {
        return Err(CoreError::InvalidInput(format!(
            "expected 3 channels (RGB), got {channels}"
        )));
    }
    let expected = width as usize * height as usize * 3;
    if data.len() != expected {
        return Err(CoreError::InvalidInput(format!(
            "buffer holds {} samples, {}x{}x3 needs {}",
            data.len(),
            width,
            height,
            expected
        )));
    }
    let image = RgbImage::from_raw(width, height, data)
        .ok_or_else(|| CoreError::InvalidInput("buffer does not fit image".to_string()))?;
    validate_image(&image)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_rgb_from_raw() {
        let img = rgb_from_raw(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6]);
    }

    #[test]
    fn test_wrong_channel_count_is_client_error() {
        let err = rgb_from_raw(1, 1, 4, vec![0; 4]).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
    }

    #[test]
    fn test_truncated_buffer() {
        assert!(rgb_from_raw(2, 2, 3, vec![0; 5]).is_err());
    }

    #[test]
    fn test_empty_image() {
        assert!(validate_image(&RgbImage::new(0, 4)).is_err());
        assert!(rgb_from_raw(0, 0, 3, Vec::new()).is_err());
    }
}
