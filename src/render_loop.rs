use crate::capture::{MediaEvent, VideoSource};
use crate::config::{PipelineConfig, SampleResolution};
use crate::render::{DrawOutcome, ParticleRenderer, RendererFactory};
use crate::segmentation::ModelFactory;
use crate::session::{RenderSession, SessionError};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const TIMING_LOG_INTERVAL: u64 = 30;
const MOTION_LOG_INTERVAL: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Initializing,
    Running,
    TearingDown,
}

/// Notifications for the host UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    LoadStart,
    Ready,
    Error(String),
    Playing(bool),
    SegmentationActive(bool),
    /// The session could not be built or the GPU gave out; nothing renders
    /// until a new source is set
    Fatal(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub sampled_frames: u64,
    pub segmentation_requests: u64,
    pub segmentation_results: u64,
    /// Moving particles in the most recent update
    pub moving_particles: usize,
}

#[derive(Debug, Default)]
struct FrameTimings {
    sample: Duration,
    motion: Duration,
    update: Duration,
    draw: Duration,
    window_start: Option<Instant>,
}

#[derive(Debug, Default)]
struct MediaStatus {
    loading: bool,
    playing: bool,
    error: Option<String>,
}

/// Per-frame scheduler for the particle pipeline.
///
/// Each `tick` runs sample, motion, segmentation merge, field update,
/// upload and draw in that order, without ever blocking. Source and
/// resolution changes tear the whole session down and build a new one
/// (only a source change reattaches the video); window resizes only
/// reach the renderer.
pub struct RenderLoop<V: VideoSource, F: RendererFactory> {
    config: PipelineConfig,
    video: V,
    factory: F,
    model: Option<ModelFactory>,
    session: Option<RenderSession<F::Renderer>>,
    state: LoopState,
    generation: u64,
    source: Option<String>,
    viewport: (u32, u32),
    media: MediaStatus,
    segmentation_active: bool,
    events: VecDeque<PipelineEvent>,
    stats: LoopStats,
    timings: FrameTimings,
}

impl<V: VideoSource, F: RendererFactory> RenderLoop<V, F> {
    pub fn new(config: PipelineConfig, video: V, factory: F, model: Option<ModelFactory>) -> Self {
        let viewport = config.viewport;
        Self {
            config,
            video,
            factory,
            model,
            session: None,
            state: LoopState::Uninitialized,
            generation: 0,
            source: None,
            viewport,
            media: MediaStatus::default(),
            segmentation_active: false,
            events: VecDeque::new(),
            stats: LoopStats::default(),
            timings: FrameTimings::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&RenderSession<F::Renderer>> {
        self.session.as_ref()
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    pub fn is_playing(&self) -> bool {
        self.media.playing
    }

    pub fn is_loading(&self) -> bool {
        self.media.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.media.error.as_deref()
    }

    pub fn segmentation_active(&self) -> bool {
        self.segmentation_active
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// One-line status for the host: error text, else loading or playback state
    pub fn status_message(&self) -> String {
        if let Some(error) = &self.media.error {
            return error.clone();
        }
        let playback = if self.state != LoopState::Running {
            "stopped"
        } else if self.media.loading {
            "loading"
        } else if self.media.playing {
            "playing"
        } else {
            "paused"
        };
        if self.segmentation_active {
            format!("{playback} | segmentation on")
        } else {
            playback.to_string()
        }
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        self.events.drain(..).collect()
    }

    /// Build a session for `url` and attach the video to it
    pub fn set_source(&mut self, url: &str) -> Result<(), SessionError> {
        self.teardown();
        self.source = Some(url.to_string());
        self.initialize()
    }

    /// Change the sample grid. Rebuilds the session if one is running;
    /// the video keeps playing from where it is.
    pub fn set_sample_resolution(&mut self, width: u32, height: u32) -> Result<(), SessionError> {
        let resolution = SampleResolution::new(width, height)?;
        if resolution == self.config.resolution {
            return Ok(());
        }
        tracing::info!("Sample resolution changed to {}", resolution);
        self.config.resolution = resolution;

        if self.session.is_none() {
            return Ok(());
        }
        self.state = LoopState::TearingDown;
        self.session = None;
        self.set_segmentation_active(false);
        self.build_session()
    }

    /// Window resized: camera and viewport only, particles stay
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
        if let Some(session) = self.session.as_mut() {
            session.renderer_mut().resize(width, height);
        }
    }

    pub fn start(&mut self) {
        if let Err(code) = self.video.play() {
            self.report_media_error(code.message());
        }
    }

    pub fn stop(&mut self) {
        self.video.pause();
    }

    pub fn toggle_play(&mut self) {
        if self.video.is_playing() {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Release the session and the video source
    pub fn shutdown(&mut self) {
        tracing::info!("Shutting down render loop");
        self.teardown();
        self.video.close();
        self.media = MediaStatus::default();
    }

    /// Run one frame
    pub fn tick(&mut self, now: Instant) {
        self.drain_media_events();

        let Some(session) = self.session.as_mut() else {
            return;
        };

        let frame = if self.video.is_playing() && self.video.is_ready() {
            self.video.current_frame()
        } else {
            None
        };

        let started = Instant::now();
        let sampled = frame.is_some_and(|frame| session.sample(frame));
        let sampled_at = Instant::now();
        self.timings.sample += sampled_at - started;

        if sampled {
            self.stats.moving_particles = session.detect_motion();
            self.stats.sampled_frames += 1;
        }
        let motion_at = Instant::now();
        self.timings.motion += motion_at - sampled_at;

        if session.segmentation_mut().poll() {
            self.stats.segmentation_results += 1;
        }
        if let (true, Some(frame)) = (sampled, frame) {
            if session.request_segmentation(frame, now) {
                self.stats.segmentation_requests += 1;
            }
        }

        if sampled {
            session.update_field();
        }
        session.upload_if_dirty();
        let updated_at = Instant::now();
        self.timings.update += updated_at - motion_at;

        let drawn = session.renderer_mut().draw();
        self.timings.draw += updated_at.elapsed();

        let active = session.segmentation().is_active();
        self.set_segmentation_active(active);

        match drawn {
            Ok(DrawOutcome::Presented) => {}
            Ok(DrawOutcome::Skipped) => tracing::debug!("Frame skipped"),
            Err(e) => {
                self.fail(&e.to_string());
                return;
            }
        }

        self.stats.frames += 1;
        self.log_stats(now);
    }

    fn initialize(&mut self) -> Result<(), SessionError> {
        let Some(url) = self.source.clone() else {
            return Ok(());
        };
        self.build_session()?;
        self.video.set_source(&url);
        Ok(())
    }

    fn build_session(&mut self) -> Result<(), SessionError> {
        self.state = LoopState::Initializing;
        self.generation += 1;

        let created = RenderSession::create(
            &mut self.factory,
            &self.config,
            self.viewport,
            self.model.clone(),
            self.generation,
        );
        let session = match created {
            Ok(session) => session,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };

        self.session = Some(session);
        self.timings = FrameTimings::default();
        self.state = LoopState::Running;
        Ok(())
    }

    fn teardown(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.state = LoopState::TearingDown;

        // Anything still queued belongs to the old source
        self.video.pause();
        while self.video.poll_event().is_some() {}
        self.media.playing = false;

        self.session = None;
        self.set_segmentation_active(false);
        self.state = LoopState::Uninitialized;
    }

    fn fail(&mut self, reason: &str) {
        tracing::error!("Render loop stopped: {}", reason);
        self.teardown();
        self.state = LoopState::Uninitialized;
        self.events.push_back(PipelineEvent::Fatal(reason.to_string()));
    }

    fn drain_media_events(&mut self) {
        while let Some(event) = self.video.poll_event() {
            self.handle_media_event(event);
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LoadStart => {
                self.media.loading = true;
                self.media.error = None;
                self.events.push_back(PipelineEvent::LoadStart);
            }
            MediaEvent::LoadedData { width, height } => {
                tracing::info!("Video loaded: {}x{}", width, height);
            }
            MediaEvent::CanPlay => {
                self.media.loading = false;
                self.events.push_back(PipelineEvent::Ready);
            }
            MediaEvent::Play => {
                self.media.playing = true;
                self.events.push_back(PipelineEvent::Playing(true));
            }
            MediaEvent::Pause | MediaEvent::Ended => {
                self.media.playing = false;
                self.events.push_back(PipelineEvent::Playing(false));
            }
            MediaEvent::Error(code) => self.report_media_error(code.message()),
        }
    }

    fn report_media_error(&mut self, message: &str) {
        let status = format!("video error: {message}");
        tracing::warn!("{}", status);
        self.media.loading = false;
        self.media.error = Some(status.clone());
        self.events.push_back(PipelineEvent::Error(status));
    }

    fn set_segmentation_active(&mut self, active: bool) {
        if active != self.segmentation_active {
            self.segmentation_active = active;
            self.events.push_back(PipelineEvent::SegmentationActive(active));
        }
    }

    fn log_stats(&mut self, now: Instant) {
        let frames = self.stats.frames;

        if frames % MOTION_LOG_INTERVAL == 0 {
            let total = self.config.resolution.count();
            let moving = self.stats.moving_particles;
            tracing::debug!(
                "Motion: {}/{} particles moving ({:.1}%)",
                moving,
                total,
                moving as f64 * 100.0 / total as f64
            );
        }

        let window_start = *self.timings.window_start.get_or_insert(now);
        if frames % TIMING_LOG_INTERVAL != 0 {
            return;
        }

        let n = TIMING_LOG_INTERVAL as f64;
        let ms = |d: Duration| d.as_secs_f64() * 1000.0 / n;
        let elapsed = now.saturating_duration_since(window_start).as_secs_f64();
        let fps = if elapsed > 0.0 { n / elapsed } else { 0.0 };

        tracing::info!(
            "Frame {}: sample={:.2}ms, motion={:.2}ms, update={:.2}ms, draw={:.2}ms, fps={:.1}",
            frames,
            ms(self.timings.sample),
            ms(self.timings.motion),
            ms(self.timings.update),
            ms(self.timings.draw),
            fps
        );
        self.timings = FrameTimings {
            window_start: Some(now),
            ..FrameTimings::default()
        };
    }
}
