use crate::config::{ConfigError, PipelineConfig};
use crate::motion::MotionDetector;
use crate::particles::ParticleField;
use crate::render::{GpuError, ParticleRenderer, RendererFactory};
use crate::sampler::PixelSampler;
use crate::scene::SceneHost;
use crate::segmentation::{ModelFactory, SegmentationClient};
use image::RgbImage;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to create renderer: {0}")]
    Renderer(#[from] GpuError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything that lives for exactly one (source, resolution) pairing.
///
/// Dropping a session cancels its classifier before the GPU resources go.
pub struct RenderSession<R: ParticleRenderer> {
    generation: u64,
    segmentation: SegmentationClient,
    sampler: PixelSampler,
    detector: MotionDetector,
    field: ParticleField,
    renderer: R,
}

impl<R: ParticleRenderer> RenderSession<R> {
    pub fn create<F>(
        factory: &mut F,
        config: &PipelineConfig,
        viewport: (u32, u32),
        model: Option<ModelFactory>,
        generation: u64,
    ) -> Result<Self, SessionError>
    where
        F: RendererFactory<Renderer = R>,
    {
        let resolution = config.resolution;
        let scene = SceneHost::new(viewport, config.point_size);
        let renderer = factory.create(resolution, scene)?;

        let field = ParticleField::new(resolution);
        let segmentation = SegmentationClient::spawn(
            model,
            resolution,
            config.segmentation_interval,
            generation,
        );

        tracing::info!(
            "Session {} started: {} particles ({})",
            generation,
            field.len(),
            resolution
        );

        Ok(Self {
            generation,
            segmentation,
            sampler: PixelSampler::new(resolution),
            detector: MotionDetector::new(resolution),
            field,
            renderer,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn segmentation(&self) -> &SegmentationClient {
        &self.segmentation
    }

    pub fn segmentation_mut(&mut self) -> &mut SegmentationClient {
        &mut self.segmentation
    }

    pub fn detector(&self) -> &MotionDetector {
        &self.detector
    }

    /// Downsample `frame` into the sample buffer
    pub fn sample(&mut self, frame: &RgbImage) -> bool {
        self.sampler.sample(frame)
    }

    /// Difference the freshly sampled frame against the previous one
    pub fn detect_motion(&mut self) -> usize {
        self.detector.detect(self.sampler.frame());
        self.detector.moving_count()
    }

    /// Issue a throttled classifier request for the frame sampled this tick
    pub fn request_segmentation(&mut self, frame: &RgbImage, now: Instant) -> bool {
        self.segmentation.request(frame, now)
    }

    /// Recompute particle attributes from the latest motion and segmentation
    pub fn update_field(&mut self) {
        self.field.update(
            self.sampler.frame(),
            self.detector.mask(),
            self.segmentation.mask(),
        );
    }

    /// Push attributes to the GPU if they changed since the last upload
    pub fn upload_if_dirty(&mut self) -> bool {
        if !self.field.take_dirty() {
            return false;
        }
        self.renderer.upload(&self.field);
        true
    }
}

impl<R: ParticleRenderer> Drop for RenderSession<R> {
    fn drop(&mut self) {
        tracing::info!("Tearing down session {}", self.generation);
        self.segmentation.dispose();
        self.detector.reset();
    }
}
