// Scripted collaborators for driving a RenderLoop without a camera or GPU.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use particle_mirror::capture::{MediaErrorCode, MediaEvent, VideoSource};
use particle_mirror::config::SampleResolution;
use particle_mirror::particles::ParticleField;
use particle_mirror::render::{
    DrawOutcome, GpuError, ParticleRenderer, RenderError, RendererFactory,
};
use particle_mirror::scene::SceneHost;
use particle_mirror::segmentation::{Matte, ModelFactory, SegmentationModel};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ===== Video =====

#[derive(Default)]
pub struct VideoScript {
    pub frames: VecDeque<RgbImage>,
    pub urls: Vec<String>,
    pub closed: bool,
}

/// A video source that plays whatever frames the test pushes.
///
/// URLs starting with `bad://` fail with `SrcNotSupported`.
pub struct ScriptedVideo {
    script: Rc<RefCell<VideoScript>>,
    current: Option<RgbImage>,
    events: VecDeque<MediaEvent>,
    ready: bool,
    playing: bool,
    dimensions: Option<(u32, u32)>,
}

impl ScriptedVideo {
    pub fn new() -> (Self, Rc<RefCell<VideoScript>>) {
        let script = Rc::new(RefCell::new(VideoScript::default()));
        let video = Self {
            script: Rc::clone(&script),
            current: None,
            events: VecDeque::new(),
            ready: false,
            playing: false,
            dimensions: None,
        };
        (video, script)
    }
}

impl VideoSource for ScriptedVideo {
    fn set_source(&mut self, url: &str) {
        self.script.borrow_mut().urls.push(url.to_string());
        self.current = None;
        self.events.push_back(MediaEvent::LoadStart);

        if url.starts_with("bad://") {
            self.ready = false;
            self.playing = false;
            self.events
                .push_back(MediaEvent::Error(MediaErrorCode::SrcNotSupported));
            return;
        }

        self.ready = true;
        self.playing = true;
        self.dimensions = Some((4, 4));
        self.events
            .push_back(MediaEvent::LoadedData { width: 4, height: 4 });
        self.events.push_back(MediaEvent::CanPlay);
        self.events.push_back(MediaEvent::Play);
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn current_frame(&mut self) -> Option<&RgbImage> {
        let next = self.script.borrow_mut().frames.pop_front()?;
        self.current = Some(next);
        self.current.as_ref()
    }

    fn play(&mut self) -> Result<(), MediaErrorCode> {
        if !self.ready {
            return Err(MediaErrorCode::SrcNotSupported);
        }
        if !self.playing {
            self.playing = true;
            self.events.push_back(MediaEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            self.events.push_back(MediaEvent::Pause);
        }
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }

    fn close(&mut self) {
        self.script.borrow_mut().closed = true;
        self.ready = false;
        self.playing = false;
    }
}

// ===== Renderer =====

#[derive(Default)]
pub struct RenderLog {
    pub created: usize,
    pub dropped: usize,
    pub uploads: usize,
    pub draws: usize,
    pub resizes: Vec<(u32, u32)>,
    pub last_colors: Vec<[f32; 3]>,
    pub last_depths: Vec<f32>,
    pub fail_create: bool,
    pub fail_draw: bool,
}

pub struct RecordingRenderer {
    log: Rc<RefCell<RenderLog>>,
    scene: SceneHost,
}

impl ParticleRenderer for RecordingRenderer {
    fn upload(&mut self, field: &ParticleField) {
        let mut log = self.log.borrow_mut();
        log.uploads += 1;
        log.last_colors = field.colors().to_vec();
        log.last_depths = field.positions().iter().map(|p| p[2]).collect();
    }

    fn draw(&mut self) -> Result<DrawOutcome, RenderError> {
        let mut log = self.log.borrow_mut();
        if log.fail_draw {
            return Err(RenderError::OutOfMemory);
        }
        log.draws += 1;
        Ok(DrawOutcome::Presented)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.scene.resize(width, height);
        self.log.borrow_mut().resizes.push((width, height));
    }

    fn scene(&self) -> &SceneHost {
        &self.scene
    }
}

impl Drop for RecordingRenderer {
    fn drop(&mut self) {
        self.log.borrow_mut().dropped += 1;
    }
}

pub struct RecordingFactory {
    log: Rc<RefCell<RenderLog>>,
}

impl RecordingFactory {
    pub fn new() -> (Self, Rc<RefCell<RenderLog>>) {
        let log = Rc::new(RefCell::new(RenderLog::default()));
        (
            Self {
                log: Rc::clone(&log),
            },
            log,
        )
    }
}

impl RendererFactory for RecordingFactory {
    type Renderer = RecordingRenderer;

    fn create(
        &mut self,
        _resolution: SampleResolution,
        scene: SceneHost,
    ) -> Result<RecordingRenderer, GpuError> {
        let mut log = self.log.borrow_mut();
        if log.fail_create {
            return Err(GpuError::NoSuitableAdapter);
        }
        log.created += 1;
        Ok(RecordingRenderer {
            log: Rc::clone(&self.log),
            scene,
        })
    }
}

// ===== Classifier =====

/// Gives every pixel the same foreground probability after an optional delay
pub struct ConstantModel {
    pub value: f32,
    pub delay: Duration,
}

impl SegmentationModel for ConstantModel {
    fn segment(&mut self, frame: &RgbImage) -> anyhow::Result<Matte> {
        std::thread::sleep(self.delay);
        let (w, h) = frame.dimensions();
        Ok(Matte::filled(w, h, self.value))
    }

    fn input_size(&self) -> (u32, u32) {
        (4, 4)
    }
}

pub fn foreground_factory(delay: Duration) -> ModelFactory {
    Arc::new(move || -> anyhow::Result<Box<dyn SegmentationModel>> {
        Ok(Box::new(ConstantModel { value: 1.0, delay }) as Box<dyn SegmentationModel>)
    })
}

pub fn failing_factory() -> ModelFactory {
    Arc::new(|| -> anyhow::Result<Box<dyn SegmentationModel>> {
        anyhow::bail!("model file missing")
    })
}

/// First model built is a slow all-foreground model, every later one an
/// instant all-background model
pub fn slow_foreground_then_background_factory(delay: Duration) -> ModelFactory {
    let built = Arc::new(AtomicUsize::new(0));
    Arc::new(move || -> anyhow::Result<Box<dyn SegmentationModel>> {
        let model = if built.fetch_add(1, Ordering::SeqCst) == 0 {
            ConstantModel { value: 1.0, delay }
        } else {
            ConstantModel {
                value: 0.0,
                delay: Duration::ZERO,
            }
        };
        Ok(Box::new(model) as Box<dyn SegmentationModel>)
    })
}

// ===== Frames =====

pub fn black_frame() -> RgbImage {
    RgbImage::new(4, 4)
}

pub fn frame_with_white_pixel(x: u32, y: u32) -> RgbImage {
    let mut frame = black_frame();
    frame.put_pixel(x, y, Rgb([255, 255, 255]));
    frame
}
