use super::types::Matte;
use anyhow::{ensure, Result};
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let image = if image.dimensions() != (self.target_width, self.target_height) {
            // Triangle keeps full-HD frames affordable at the classifier rate
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        tensor
    }

    /// Quantise a matte to 0-255 and resize it to the sample resolution
    ///
    /// Returns: grayscale mask flattened in row-major order
    pub fn matte_to_mask(matte: &Matte, target_width: u32, target_height: u32) -> Result<Vec<u8>> {
        let _span = tracing::debug_span!("postprocess").entered();

        ensure!(
            matte.values.len() == matte.width as usize * matte.height as usize,
            "matte has {} values, expected {}x{}",
            matte.values.len(),
            matte.width,
            matte.height
        );
        ensure!(matte.width > 0 && matte.height > 0, "matte is empty");

        let quantised: Vec<u8> = matte
            .values
            .iter()
            .map(|v| (v * 255.0).clamp(0.0, 255.0) as u8)
            .collect();

        // If dimensions match, no resize needed
        if (matte.width, matte.height) == (target_width, target_height) {
            return Ok(quantised);
        }

        let gray = GrayImage::from_raw(matte.width, matte.height, quantised)
            .ok_or_else(|| anyhow::anyhow!("matte buffer size mismatch"))?;

        let resized = imageops::resize(
            &gray,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(resized.into_raw())
    }
}
