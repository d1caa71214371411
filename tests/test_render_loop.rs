// tests/test_render_loop.rs - end-to-end scenarios on a 4x4 grid, driven by
// scripted video, renderer and classifier fakes.

mod common;

use common::*;
use particle_mirror::render::ParticleRenderer;
use particle_mirror::particles::{BACKGROUND_DEPTH, FOREGROUND_DEPTH, MOTION_COLOR, STILL_COLOR};
use particle_mirror::segmentation::ModelFactory;
use particle_mirror::{LoopState, PipelineConfig, PipelineEvent, RenderLoop, SampleResolution};
use std::time::{Duration, Instant};

type TestLoop = RenderLoop<ScriptedVideo, RecordingFactory>;

fn config(interval: Duration) -> PipelineConfig {
    PipelineConfig::new(
        SampleResolution::new(4, 4).unwrap(),
        3.0,
        interval,
        (640, 480),
    )
    .unwrap()
}

struct Harness {
    pipeline: TestLoop,
    video: std::rc::Rc<std::cell::RefCell<VideoScript>>,
    render: std::rc::Rc<std::cell::RefCell<RenderLog>>,
}

impl Harness {
    fn new(model: Option<ModelFactory>, interval: Duration) -> Self {
        let (video, video_script) = ScriptedVideo::new();
        let (factory, render_log) = RecordingFactory::new();
        Self {
            pipeline: RenderLoop::new(config(interval), video, factory, model),
            video: video_script,
            render: render_log,
        }
    }

    fn push(&self, frame: image::RgbImage) {
        self.video.borrow_mut().frames.push_back(frame);
    }

    fn tick_with(&mut self, frame: image::RgbImage) {
        self.push(frame);
        self.pipeline.tick(Instant::now());
    }

    fn foreground(&self) -> Vec<f32> {
        self.pipeline
            .session()
            .map(|s| s.field().foreground().to_vec())
            .unwrap_or_default()
    }

    /// Tick with black frames until `done` holds or two seconds pass
    fn tick_until(&mut self, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            self.tick_with(black_frame());
            if done(self) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

// ===== Frame pipeline =====

#[test]
fn single_white_pixel_turns_one_particle_red() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    assert_eq!(h.pipeline.state(), LoopState::Running);

    h.tick_with(black_frame());
    {
        let log = h.render.borrow();
        assert_eq!(log.uploads, 1);
        assert_eq!(log.draws, 1);
        assert_eq!(log.last_colors.len(), 16);
        assert!(log.last_colors.iter().all(|c| *c == STILL_COLOR));
        assert!(log.last_depths.iter().all(|d| *d == BACKGROUND_DEPTH));
    }

    h.tick_with(frame_with_white_pixel(1, 2));
    let log = h.render.borrow();
    let red: Vec<usize> = log
        .last_colors
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == MOTION_COLOR)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(red, vec![2 * 4 + 1]);
    assert_eq!(h.pipeline.stats().moving_particles, 1);
    assert_eq!(h.pipeline.stats().sampled_frames, 2);
}

#[test]
fn draws_every_tick_but_uploads_only_new_frames() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();

    h.tick_with(black_frame());
    h.pipeline.tick(Instant::now());
    h.pipeline.tick(Instant::now());

    let log = h.render.borrow();
    assert_eq!(log.draws, 3);
    assert_eq!(log.uploads, 1);
    assert_eq!(h.pipeline.stats().frames, 3);
    assert_eq!(h.pipeline.stats().sampled_frames, 1);
}

#[test]
fn paused_video_is_not_sampled() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());

    h.pipeline.stop();
    h.tick_with(frame_with_white_pixel(0, 0));
    assert!(!h.pipeline.is_playing());
    assert_eq!(h.pipeline.stats().sampled_frames, 1);
    assert_eq!(h.render.borrow().draws, 2);

    // The held frame is picked up once playback resumes
    h.pipeline.toggle_play();
    h.pipeline.tick(Instant::now());
    assert!(h.pipeline.is_playing());
    assert_eq!(h.pipeline.stats().sampled_frames, 2);
    assert_eq!(h.pipeline.stats().moving_particles, 1);
}

// ===== Segmentation merge =====

#[test]
fn active_classifier_pushes_particles_forward() {
    let mut h = Harness::new(Some(foreground_factory(Duration::ZERO)), Duration::ZERO);
    h.pipeline.set_source("clip://a").unwrap();

    let merged = h.tick_until(|h| h.foreground().iter().all(|f| *f == 1.0));
    assert!(merged, "foreground never reached the field");
    assert!(h.pipeline.segmentation_active());
    assert!(h.render.borrow().last_depths.iter().all(|d| *d == FOREGROUND_DEPTH));

    let events = h.pipeline.drain_events();
    assert!(events.contains(&PipelineEvent::SegmentationActive(true)));
    let stats = h.pipeline.stats();
    assert!(stats.segmentation_requests >= 1);
    assert!(stats.segmentation_results >= 1);
}

#[test]
fn failed_classifier_never_sets_foreground() {
    let mut h = Harness::new(Some(failing_factory()), Duration::ZERO);
    h.pipeline.set_source("clip://a").unwrap();

    for _ in 0..20 {
        h.tick_with(black_frame());
        std::thread::sleep(Duration::from_millis(2));
        assert!(h.foreground().iter().all(|f| *f == 0.0));
    }

    assert!(!h.pipeline.segmentation_active());
    assert_eq!(h.pipeline.stats().segmentation_requests, 0);
    assert!(!h
        .pipeline
        .drain_events()
        .contains(&PipelineEvent::SegmentationActive(true)));
    // Rendering carries on regardless
    assert_eq!(h.render.borrow().draws, 20);
}

#[test]
fn late_result_from_torn_down_session_is_ignored() {
    let mut h = Harness::new(
        Some(slow_foreground_then_background_factory(Duration::from_millis(150))),
        Duration::ZERO,
    );
    h.pipeline.set_source("clip://a").unwrap();

    let issued = h.tick_until(|h| h.pipeline.stats().segmentation_requests == 1);
    assert!(issued);

    // Switch sources while the first classification is still running
    h.pipeline.set_source("clip://b").unwrap();
    assert_eq!(h.pipeline.generation(), 2);

    let answered = h.tick_until(|h| {
        h.pipeline
            .session()
            .is_some_and(|s| s.segmentation().completed() >= 1)
    });
    assert!(answered, "second session never classified a frame");

    // Give the first session's foreground mask time to finish
    std::thread::sleep(Duration::from_millis(300));
    for _ in 0..10 {
        h.tick_with(black_frame());
        assert!(h.foreground().iter().all(|f| *f == 0.0));
    }
    assert!(h.pipeline.segmentation_active());
    assert!(h.render.borrow().last_depths.iter().all(|d| *d == BACKGROUND_DEPTH));
}

// ===== Lifecycle =====

#[test]
fn resize_keeps_the_session() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());

    h.pipeline.resize(800, 600);
    h.tick_with(black_frame());

    let log = h.render.borrow();
    assert_eq!(log.created, 1);
    assert_eq!(log.dropped, 0);
    assert_eq!(log.resizes, vec![(800, 600)]);
    assert_eq!(h.pipeline.generation(), 1);
    let session = h.pipeline.session().unwrap();
    assert_eq!(session.field().len(), 16);
    assert_eq!(session.renderer().scene().viewport(), (800, 600));
}

#[test]
fn source_change_rebuilds_the_session() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());
    h.pipeline.set_source("clip://b").unwrap();

    assert_eq!(h.pipeline.generation(), 2);
    assert_eq!(h.pipeline.state(), LoopState::Running);
    assert_eq!(h.pipeline.session().unwrap().generation(), 2);
    assert_eq!(h.pipeline.source(), Some("clip://b"));

    let log = h.render.borrow();
    assert_eq!(log.created, 2);
    assert_eq!(log.dropped, 1);
    assert_eq!(h.video.borrow().urls, vec!["clip://a", "clip://b"]);
}

#[test]
fn new_session_starts_without_motion_history() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());
    h.pipeline.set_source("clip://b").unwrap();

    // Would be motion against the old session's frame
    h.tick_with(frame_with_white_pixel(3, 3));
    assert!(h.render.borrow().last_colors.iter().all(|c| *c == STILL_COLOR));
}

#[test]
fn resolution_change_recreates_the_field() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());
    h.pipeline.drain_events();
    h.pipeline.set_sample_resolution(2, 2).unwrap();

    assert_eq!(h.pipeline.generation(), 2);
    assert_eq!(h.pipeline.state(), LoopState::Running);
    assert_eq!(h.pipeline.session().unwrap().field().len(), 4);
    assert!(h.pipeline.set_sample_resolution(0, 2).is_err());
    assert_eq!(h.pipeline.session().unwrap().field().len(), 4);

    // The video is left playing, not reloaded
    assert_eq!(h.video.borrow().urls, vec!["clip://a"]);
    assert!(h.pipeline.is_playing());
    h.tick_with(black_frame());
    assert_eq!(h.pipeline.drain_events(), vec![]);
    let log = h.render.borrow();
    assert_eq!(log.created, 2);
    assert_eq!(log.dropped, 1);
    assert_eq!(log.last_colors.len(), 4);
    assert_eq!(h.pipeline.stats().sampled_frames, 2);
}

#[test]
fn renderer_failure_is_fatal() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.render.borrow_mut().fail_create = true;

    assert!(h.pipeline.set_source("clip://a").is_err());
    assert_eq!(h.pipeline.state(), LoopState::Uninitialized);
    assert!(h.pipeline.session().is_none());
    let events = h.pipeline.drain_events();
    assert!(matches!(events.last(), Some(PipelineEvent::Fatal(_))));

    // Nothing happens on later ticks
    h.tick_with(black_frame());
    assert_eq!(h.render.borrow().draws, 0);
}

#[test]
fn out_of_memory_during_draw_is_fatal() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.render.borrow_mut().fail_draw = true;

    h.tick_with(black_frame());
    assert_eq!(h.pipeline.state(), LoopState::Uninitialized);
    assert_eq!(h.render.borrow().dropped, 1);
    assert!(h
        .pipeline
        .drain_events()
        .iter()
        .any(|e| matches!(e, PipelineEvent::Fatal(_))));
}

#[test]
fn shutdown_releases_session_and_video() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.tick_with(black_frame());
    h.pipeline.shutdown();

    assert_eq!(h.pipeline.state(), LoopState::Uninitialized);
    assert!(h.pipeline.session().is_none());
    assert_eq!(h.render.borrow().dropped, 1);
    assert!(h.video.borrow().closed);
}

// ===== Media status =====

#[test]
fn media_events_drive_status() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("clip://a").unwrap();
    h.pipeline.tick(Instant::now());

    assert!(!h.pipeline.is_loading());
    assert!(h.pipeline.is_playing());
    assert_eq!(h.pipeline.status_message(), "playing");
    assert_eq!(
        h.pipeline.drain_events(),
        vec![
            PipelineEvent::LoadStart,
            PipelineEvent::Ready,
            PipelineEvent::Playing(true),
        ]
    );

    h.pipeline.toggle_play();
    h.pipeline.tick(Instant::now());
    assert_eq!(h.pipeline.status_message(), "paused");
    assert_eq!(h.pipeline.drain_events(), vec![PipelineEvent::Playing(false)]);
}

#[test]
fn media_error_keeps_the_session() {
    let mut h = Harness::new(None, Duration::from_millis(100));
    h.pipeline.set_source("bad://clip").unwrap();
    h.pipeline.tick(Instant::now());

    let expected = "video error: video format not supported";
    assert_eq!(h.pipeline.status_message(), expected);
    assert_eq!(h.pipeline.error(), Some(expected));
    assert!(!h.pipeline.is_loading());
    assert_eq!(h.pipeline.state(), LoopState::Running);
    assert!(h
        .pipeline
        .drain_events()
        .contains(&PipelineEvent::Error(expected.to_string())));

    // Retrying with a good source clears the error
    h.pipeline.set_source("clip://a").unwrap();
    h.pipeline.tick(Instant::now());
    assert_eq!(h.pipeline.error(), None);
    assert_eq!(h.pipeline.status_message(), "playing");
}
