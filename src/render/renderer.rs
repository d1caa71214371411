use super::{
    DrawOutcome, GpuContext, GpuError, ParticleRenderer, PointPipeline, RenderError,
    RendererFactory,
};
use crate::config::SampleResolution;
use crate::particles::ParticleField;
use crate::scene::SceneHost;

/// wgpu renderer for one window surface
pub struct GpuParticleRenderer {
    scene: SceneHost,
    pipeline: PointPipeline,
    context: GpuContext,
}

impl GpuParticleRenderer {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        resolution: SampleResolution,
        scene: SceneHost,
    ) -> Result<Self, GpuError> {
        let context = GpuContext::new(target, scene.viewport())?;
        let pipeline = PointPipeline::new(
            &context.device,
            context.format(),
            context.size(),
            resolution.count(),
            &scene.uniforms(),
        );

        tracing::info!(
            "Renderer ready: {} particles ({}) at {}x{}",
            resolution.count(),
            resolution,
            scene.viewport().0,
            scene.viewport().1
        );

        Ok(Self {
            scene,
            pipeline,
            context,
        })
    }
}

impl ParticleRenderer for GpuParticleRenderer {
    fn upload(&mut self, field: &ParticleField) {
        self.pipeline.upload(&self.context.queue, field);
    }

    fn draw(&mut self) -> Result<DrawOutcome, RenderError> {
        let _span = tracing::debug_span!("draw").entered();

        let Some(frame) = self.context.acquire()? else {
            return Ok(DrawOutcome::Skipped);
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.pipeline
            .encode(&mut encoder, &view, SceneHost::CLEAR_COLOR);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(DrawOutcome::Presented)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.scene.resize(width, height);
        let (width, height) = self.scene.viewport();
        self.context.resize(width, height);
        self.pipeline.resize(&self.context.device, width, height);
        self.pipeline
            .write_scene(&self.context.queue, &self.scene.uniforms());
    }

    fn scene(&self) -> &SceneHost {
        &self.scene
    }
}

/// Creates a fresh renderer on a window for every session.
///
/// `W` is anything wgpu can build a surface from, typically `Arc<Window>`.
pub struct GpuRendererFactory<W> {
    target: W,
}

impl<W> GpuRendererFactory<W>
where
    W: Clone + Into<wgpu::SurfaceTarget<'static>>,
{
    pub fn new(target: W) -> Self {
        Self { target }
    }
}

impl<W> RendererFactory for GpuRendererFactory<W>
where
    W: Clone + Into<wgpu::SurfaceTarget<'static>>,
{
    type Renderer = GpuParticleRenderer;

    fn create(
        &mut self,
        resolution: SampleResolution,
        scene: SceneHost,
    ) -> Result<Self::Renderer, GpuError> {
        GpuParticleRenderer::new(self.target.clone(), resolution, scene)
    }
}
