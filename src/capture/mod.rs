mod camera;
mod player;
mod sequence;

pub use camera::WebcamCapture;
pub use player::{MediaPlayer, PlayerOptions};
pub use sequence::ImageSequence;

use image::RgbImage;
use std::time::Duration;

/// Media error codes reported by a video source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

impl MediaErrorCode {
    /// User-facing description of the error
    pub fn message(&self) -> &'static str {
        match self {
            MediaErrorCode::Aborted => "video loading was aborted",
            MediaErrorCode::Network => "network error while loading video",
            MediaErrorCode::Decode => "video decoding failed",
            MediaErrorCode::SrcNotSupported => "video format not supported",
        }
    }
}

impl std::fmt::Display for MediaErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Playback events emitted by a video source, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    LoadStart,
    LoadedData { width: u32, height: u32 },
    CanPlay,
    Play,
    Pause,
    Ended,
    Error(MediaErrorCode),
}

/// The playable media collaborator consumed by the render loop.
///
/// Implementations decode off the render thread. Every method here must
/// return immediately.
pub trait VideoSource {
    /// Replace the current source. Progress and failures are reported
    /// through `poll_event`.
    fn set_source(&mut self, url: &str);

    /// True once at least one frame has been decoded and dimensions are known
    fn is_ready(&self) -> bool;

    /// True while playing (not paused and not ended)
    fn is_playing(&self) -> bool;

    /// Native frame dimensions, if known
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The newest decoded frame, if one arrived since the previous call
    fn current_frame(&mut self) -> Option<&RgbImage>;

    fn play(&mut self) -> Result<(), MediaErrorCode>;

    fn pause(&mut self);

    /// Next pending playback event
    fn poll_event(&mut self) -> Option<MediaEvent>;

    /// Stop decoding and release the underlying device or files
    fn close(&mut self) {}
}

/// Errors raised by a blocking capture source
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),
}

impl CaptureError {
    pub fn code(&self) -> MediaErrorCode {
        match self {
            CaptureError::Unsupported(_) => MediaErrorCode::SrcNotSupported,
            CaptureError::Unavailable(_) => MediaErrorCode::Network,
            CaptureError::Decode(_) => MediaErrorCode::Decode,
        }
    }

    /// Decode errors affect a single frame; everything else ends the stream
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::Decode(_))
    }
}

/// Trait for blocking frame producers.
///
/// A capture source lives on its own decode thread, driven by `MediaPlayer`.
pub trait CaptureSource {
    /// Capture a single frame. `Ok(None)` marks the end of the stream.
    fn capture_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Pacing between frames. `None` when `capture_frame` already blocks
    /// at the device frame rate.
    fn frame_interval(&self) -> Option<Duration> {
        None
    }
}

/// Parsed form of a source URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    Camera(u32),
    Path(std::path::PathBuf),
    Unsupported(String),
}

impl SourceUrl {
    /// `camera://<index>` selects a webcam, remote URLs are not supported,
    /// anything else is a file or directory path
    pub fn parse(url: &str) -> Self {
        if let Some(index) = url.strip_prefix("camera://") {
            return match index.parse() {
                Ok(index) => SourceUrl::Camera(index),
                Err(_) => SourceUrl::Unsupported(url.to_string()),
            };
        }
        if url.contains("://") || url.is_empty() {
            return SourceUrl::Unsupported(url.to_string());
        }
        SourceUrl::Path(url.into())
    }
}
