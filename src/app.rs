use particle_mirror::capture::{MediaPlayer, PlayerOptions};
use particle_mirror::render::GpuRendererFactory;
use particle_mirror::segmentation::ModelFactory;
use particle_mirror::{PipelineConfig, PipelineEvent, RenderLoop};
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const TITLE: &str = "particle-mirror";

type Pipeline = RenderLoop<MediaPlayer, GpuRendererFactory<Arc<Window>>>;

/// winit shell: owns the window and drives the render loop from redraws
pub struct App {
    config: PipelineConfig,
    options: PlayerOptions,
    source: String,
    model: Option<ModelFactory>,
    pipeline: Option<Pipeline>,
    window: Option<Arc<Window>>,
    title: String,
    fatal: Option<String>,
}

impl App {
    pub fn new(
        config: PipelineConfig,
        options: PlayerOptions,
        source: String,
        model: Option<ModelFactory>,
    ) -> Self {
        Self {
            config,
            options,
            source,
            model,
            pipeline: None,
            window: None,
            title: TITLE.to_string(),
            fatal: None,
        }
    }

    /// Reason the loop stopped, if it was a failure
    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    fn exit_with(&mut self, event_loop: &ActiveEventLoop, reason: String) {
        tracing::error!("{}", reason);
        self.fatal = Some(reason);
        self.quit(event_loop);
    }

    fn quit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.shutdown();
        }
        self.pipeline = None;
        event_loop.exit();
    }

    fn handle_pipeline_events(&mut self, event_loop: &ActiveEventLoop) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };

        let mut fatal = None;
        for event in pipeline.drain_events() {
            match event {
                PipelineEvent::Fatal(reason) => fatal = Some(reason),
                PipelineEvent::SegmentationActive(active) => {
                    tracing::info!("Segmentation {}", if active { "active" } else { "inactive" });
                }
                PipelineEvent::Error(_)
                | PipelineEvent::LoadStart
                | PipelineEvent::Ready
                | PipelineEvent::Playing(_) => {}
            }
        }

        let title = format!("{TITLE} - {}", pipeline.status_message());
        if title != self.title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.title = title;
        }

        if let Some(reason) = fatal {
            self.exit_with(event_loop, reason);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = self.config.viewport;
        let attributes = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(width, height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.exit_with(event_loop, format!("Failed to create window: {e}"));
                return;
            }
        };

        let size = window.inner_size();
        let mut config = self.config.clone();
        config.viewport = (size.width, size.height);

        let mut pipeline = RenderLoop::new(
            config,
            MediaPlayer::new(self.options),
            GpuRendererFactory::new(Arc::clone(&window)),
            self.model.clone(),
        );
        let started = pipeline.set_source(&self.source);

        self.window = Some(Arc::clone(&window));
        self.pipeline = Some(pipeline);

        if let Err(e) = started {
            self.exit_with(event_loop, format!("Failed to start pipeline: {e}"));
            return;
        }

        tracing::info!("Press Space to play/pause, Escape to quit");
        window.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.quit(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key.as_ref() {
                Key::Named(NamedKey::Space) => {
                    if let Some(pipeline) = self.pipeline.as_mut() {
                        pipeline.toggle_play();
                    }
                }
                Key::Named(NamedKey::Escape) => self.quit(event_loop),
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.tick(Instant::now());
                }
                self.handle_pipeline_events(event_loop);

                if let (Some(window), Some(_)) = (&self.window, &self.pipeline) {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
