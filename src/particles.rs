use crate::config::SampleResolution;
use crate::sampler::SampledFrame;

/// Depth of particles classified as foreground
pub const FOREGROUND_DEPTH: f32 = 100.0;
/// Depth of background particles
pub const BACKGROUND_DEPTH: f32 = -150.0;
/// Segmentation values above this (0-255 scale) are foreground
pub const FOREGROUND_THRESHOLD: u8 = 128;

pub const MOTION_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
pub const STILL_COLOR: [f32; 3] = [0.0, 0.0, 0.0];
const INITIAL_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// The fixed-size point cloud: one particle per sampled pixel.
///
/// Positions sit on a grid centred at the origin. Only depth, color and
/// the foreground flag change after construction, and never the particle
/// count. Buffers are laid out for direct GPU upload.
pub struct ParticleField {
    resolution: SampleResolution,
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    foreground: Vec<f32>,
    dirty: bool,
}

impl ParticleField {
    pub fn new(resolution: SampleResolution) -> Self {
        let count = resolution.count();
        let half_w = resolution.width() as f32 / 2.0;
        let half_h = resolution.height() as f32 / 2.0;

        let mut positions = Vec::with_capacity(count);
        for y in 0..resolution.height() {
            for x in 0..resolution.width() {
                positions.push([x as f32 - half_w, half_h - y as f32, BACKGROUND_DEPTH]);
            }
        }

        tracing::info!("Created particle field: {} particles ({})", count, resolution);

        Self {
            resolution,
            positions,
            colors: vec![INITIAL_COLOR; count],
            foreground: vec![0.0; count],
            dirty: true,
        }
    }

    pub fn resolution(&self) -> SampleResolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn foreground(&self) -> &[f32] {
        &self.foreground
    }

    /// Recompute every particle from the current motion and segmentation
    /// state.
    ///
    /// The sampled frame is accepted for alignment but its colors are not
    /// reproduced: moving particles are red and still particles black.
    pub fn update(&mut self, frame: &SampledFrame, motion: &[u8], segmentation: Option<&[u8]>) {
        let _span = tracing::debug_span!("particle_update").entered();

        let count = self.len();
        debug_assert_eq!(frame.resolution(), self.resolution);
        debug_assert_eq!(motion.len(), count);
        debug_assert!(segmentation.map_or(true, |mask| mask.len() == count));

        for i in 0..count {
            let is_foreground = segmentation.map_or(false, |mask| mask[i] > FOREGROUND_THRESHOLD);
            self.foreground[i] = if is_foreground { 1.0 } else { 0.0 };

            self.colors[i] = if motion[i] == 1 {
                MOTION_COLOR
            } else {
                STILL_COLOR
            };

            self.positions[i][2] = if is_foreground {
                FOREGROUND_DEPTH
            } else {
                BACKGROUND_DEPTH
            };
        }

        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the upload flag, returning whether it was set
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
