use super::{CaptureError, CaptureSource};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp", "tga"];

/// Plays a directory of still images (or a single image) as a video clip.
///
/// Files are ordered by name. Frames are decoded lazily, one per
/// `capture_frame` call, and paced at a fixed frame rate.
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    interval: Duration,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(path: P, fps: u32, looping: bool) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        tracing::info!("Opening image sequence at {}", path.display());

        let frames = list_frames(path)?;

        // Decode the first frame up front so the resolution is known
        let first = decode(&frames[0])?;
        let (width, height) = first.dimensions();

        tracing::info!(
            "Image sequence has {} frames at {}x{}, {} fps",
            frames.len(),
            width,
            height,
            fps
        );

        Ok(Self {
            frames,
            cursor: 0,
            looping,
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn list_frames(path: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    if !path.exists() {
        return Err(CaptureError::Unavailable(format!(
            "{} does not exist",
            path.display()
        )));
    }

    if path.is_file() {
        if !is_image(path) {
            return Err(CaptureError::Unsupported(path.display().to_string()));
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| CaptureError::Unavailable(format!("{}: {e}", path.display())))?;

    let mut frames: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    frames.sort();

    if frames.is_empty() {
        return Err(CaptureError::Unsupported(format!(
            "no image frames in {}",
            path.display()
        )));
    }

    Ok(frames)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn decode(path: &Path) -> Result<RgbImage, CaptureError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| CaptureError::Decode(format!("{}: {e}", path.display())))
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        if self.cursor == self.frames.len() {
            self.cursor = 0;
            if !self.looping {
                // Rewound, so a later play() starts from the beginning
                return Ok(None);
            }
        }

        let path = &self.frames[self.cursor];
        self.cursor += 1;
        decode(path).map(Some)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}
