//! Classifier input tensors.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Single-channel image tensor, row-major.
///
/// Values are ink intensity in `[0, 1]`: 0.0 is pure background, 1.0 is full
/// ink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTensor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel values, `width * height` entries.
    pub data: Vec<f32>,
}

impl FeatureTensor {
    /// Build a tensor from opaque RGBA pixels.
    ///
    /// Pixels are reduced to luma and inverted so ink reads high.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidSize`] if the buffer does not hold
    /// `width * height` RGBA pixels.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> RenderResult<Self> {
        let image = image::RgbaImage::from_raw(width, height, rgba)
            .ok_or(RenderError::InvalidSize { width, height })?;
        let luma = image::DynamicImage::ImageRgba8(image).to_luma8();
        let data = luma
            .into_raw()
            .into_iter()
            .map(|v| 1.0 - f32::from(v) / 255.0)
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the tensor holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at a pixel, or `None` outside the tensor.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }

    /// Fraction of pixels with any ink.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ink_coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let inked = self.data.iter().filter(|&&v| v > 0.05).count();
        inked as f32 / self.data.len() as f32
    }

    /// Encode as an 8-bit grayscale PNG (ink dark on light).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Encode`] if PNG encoding fails.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_png(&self) -> RenderResult<Vec<u8>> {
        let pixels: Vec<u8> = self
            .data
            .iter()
            .map(|v| ((1.0 - v.clamp(0.0, 1.0)) * 255.0).round() as u8)
            .collect();
        let image = image::GrayImage::from_raw(self.width, self.height, pixels).ok_or(
            RenderError::InvalidSize {
                width: self.width,
                height: self.height,
            },
        )?;
        let mut buf = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {e}")))?;
        Ok(buf.into_inner())
    }
}
