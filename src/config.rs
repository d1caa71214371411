use std::time::Duration;

/// Errors raised while validating pipeline configuration
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("sample resolution must be non-zero, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },

    #[error("point size must be positive, got {0}")]
    InvalidPointSize(f32),

    #[error("source frame rate must be positive, got {0}")]
    InvalidFrameRate(u32),
}

/// Fixed downsample resolution of a session.
///
/// The particle count is `width * height` and stays constant for as long as
/// the session lives. Changing it means tearing the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleResolution {
    width: u32,
    height: u32,
}

impl SampleResolution {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of particles (and pixels) at this resolution
    pub fn count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for SampleResolution {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
        }
    }
}

impl std::fmt::Display for SampleResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Runtime configuration shared by the render loop and its collaborators
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub resolution: SampleResolution,
    /// Rasterized point diameter in pixels
    pub point_size: f32,
    /// Minimum spacing between two classifier requests
    pub segmentation_interval: Duration,
    /// Initial viewport in physical pixels
    pub viewport: (u32, u32),
}

impl PipelineConfig {
    pub fn new(
        resolution: SampleResolution,
        point_size: f32,
        segmentation_interval: Duration,
        viewport: (u32, u32),
    ) -> Result<Self, ConfigError> {
        if !(point_size > 0.0) {
            return Err(ConfigError::InvalidPointSize(point_size));
        }
        Ok(Self {
            resolution,
            point_size,
            segmentation_interval,
            viewport,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: SampleResolution::default(),
            point_size: 3.0,
            segmentation_interval: Duration::from_millis(100),
            viewport: (1280, 720),
        }
    }
}
