use anyhow::Result;
use image::RgbImage;

/// Foreground probability per pixel (0.0 background, 1.0 foreground),
/// row-major at whatever resolution the model outputs
#[derive(Debug, Clone, PartialEq)]
pub struct Matte {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl Matte {
    /// A matte filled with a single value
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }
}

/// Foreground/background classifier run by the segmentation worker.
///
/// Implementations are built and driven on the worker thread, so they only
/// need to be `Send`. Dropping the model releases it.
pub trait SegmentationModel: Send {
    /// Classify one full-resolution frame. Any error disables segmentation
    /// for the rest of the session.
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte>;

    /// Forget temporal state carried between frames
    fn reset_state(&mut self) {}

    /// Preferred input size as (width, height)
    fn input_size(&self) -> (u32, u32);
}
