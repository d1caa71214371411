use super::{CaptureError, CaptureSource};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Webcam frame producer.
///
/// `capture_frame` blocks until the device delivers the next frame, so this
/// must only be driven from a decode thread.
pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self, CaptureError> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(index, requested).map_err(|e| {
            CaptureError::Unavailable(format!("failed to open camera {device_index}: {e}"))
        })?;

        camera
            .open_stream()
            .map_err(|e| CaptureError::Unavailable(format!("failed to open camera stream: {e}")))?;

        // The driver may pick a different resolution than the one requested
        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Unavailable(format!("failed to capture frame: {e}")))?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let (width, height) = decoded.dimensions();
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CaptureError::Decode("frame buffer size mismatch".into()))?;

        Ok(Some(image))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}
