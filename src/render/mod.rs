mod gpu;
mod pipeline;
mod renderer;

pub use gpu::GpuContext;
pub use pipeline::PointPipeline;
pub use renderer::{GpuParticleRenderer, GpuRendererFactory};

use crate::config::SampleResolution;
use crate::particles::ParticleField;
use crate::scene::SceneHost;

/// Errors raised while bringing up the GPU
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoSuitableAdapter,

    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats for this adapter")]
    UnsupportedSurface,
}

/// Errors raised while drawing a frame
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("GPU ran out of memory")]
    OutOfMemory,
}

/// What happened to a draw request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented,
    /// The surface was lost, outdated or timed out; it has been
    /// reconfigured and the frame dropped
    Skipped,
}

/// Draws a particle field with the current scene camera
pub trait ParticleRenderer {
    /// Copy positions, colors and foreground flags to the GPU
    fn upload(&mut self, field: &ParticleField);

    fn draw(&mut self) -> Result<DrawOutcome, RenderError>;

    /// Adjust the camera and surface to a new viewport. Particle data is
    /// left untouched.
    fn resize(&mut self, width: u32, height: u32);

    fn scene(&self) -> &SceneHost;
}

/// Builds a renderer for one session.
///
/// Called on every (re)initialization, so the particle buffers always
/// match the sample resolution in force.
pub trait RendererFactory {
    type Renderer: ParticleRenderer;

    fn create(
        &mut self,
        resolution: SampleResolution,
        scene: SceneHost,
    ) -> Result<Self::Renderer, GpuError>;
}
