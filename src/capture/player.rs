use super::{
    CaptureError, CaptureSource, ImageSequence, MediaErrorCode, MediaEvent, SourceUrl,
    VideoSource, WebcamCapture,
};
use crate::config::ConfigError;
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frames buffered between the decode thread and the render thread
const FEED_CAPACITY: usize = 2;
/// Longest the decode thread sleeps before re-checking for cancellation
const POLL_SLICE: Duration = Duration::from_millis(5);

/// Playback options for sources opened by a `MediaPlayer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerOptions {
    /// Frame rate for image sequences (cameras pace themselves)
    pub fps: u32,
    /// Restart image sequences when they end
    pub looping: bool,
    /// Start playing as soon as a source has opened
    pub autoplay: bool,
}

impl PlayerOptions {
    pub fn new(fps: u32, looping: bool) -> Result<Self, ConfigError> {
        if fps == 0 {
            return Err(ConfigError::InvalidFrameRate(fps));
        }
        Ok(Self {
            fps,
            looping,
            autoplay: true,
        })
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            fps: 30,
            looping: true,
            autoplay: true,
        }
    }
}

enum FeedMessage {
    Opened { width: u32, height: u32 },
    Frame(RgbImage),
    Ended,
    Error(MediaErrorCode),
}

type Opener = Box<dyn FnOnce() -> Result<Box<dyn CaptureSource>, CaptureError> + Send>;

/// A decode thread and the channel it feeds.
///
/// Dropping a feed cancels the thread without joining it. A retired
/// thread is joined by the next feed's thread before it opens its source,
/// so a camera is never opened twice.
struct Feed {
    rx: Option<Receiver<FeedMessage>>,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Feed {
    fn spawn(opener: Opener, previous: Option<JoinHandle<()>>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(FEED_CAPACITY);
        let cancel = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(true));

        let handle = {
            let cancel = Arc::clone(&cancel);
            let paused = Arc::clone(&paused);
            std::thread::Builder::new()
                .name("video-decode".into())
                .spawn(move || {
                    if let Some(previous) = previous {
                        if previous.join().is_err() {
                            tracing::warn!("Previous video decode thread panicked");
                        }
                    }
                    run_feed(opener, tx, cancel, paused)
                })?
        };

        Ok(Self {
            rx: Some(rx),
            cancel,
            paused,
            handle: Some(handle),
        })
    }

    fn try_recv(&self) -> Option<FeedMessage> {
        match self.rx.as_ref()?.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Release);
        // Unblocks a decode thread waiting on a full channel
        self.rx.take();
    }

    /// Cancel the thread and hand back its handle for the next feed to join
    fn retire(mut self) -> Option<JoinHandle<()>> {
        self.cancel();
        self.handle.take()
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run_feed(
    opener: Opener,
    tx: SyncSender<FeedMessage>,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
) {
    if cancel.load(Ordering::Acquire) {
        return;
    }
    let mut source = match opener() {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("Failed to open video source: {}", e);
            let _ = tx.send(FeedMessage::Error(e.code()));
            return;
        }
    };

    let (width, height) = source.resolution();
    if tx.send(FeedMessage::Opened { width, height }).is_err() {
        return;
    }

    while !cancel.load(Ordering::Acquire) {
        if paused.load(Ordering::Acquire) {
            std::thread::sleep(POLL_SLICE);
            continue;
        }

        let started = Instant::now();
        match source.capture_frame() {
            Ok(Some(frame)) => match tx.try_send(FeedMessage::Frame(frame)) {
                // A full channel means the render thread is behind; drop the frame
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => return,
            },
            Ok(None) => {
                paused.store(true, Ordering::Release);
                if tx.send(FeedMessage::Ended).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("Video source error: {}", e);
                if tx.send(FeedMessage::Error(e.code())).is_err() || e.is_fatal() {
                    return;
                }
            }
        }

        if let Some(interval) = source.frame_interval() {
            sleep_until(started + interval, &cancel);
        }
    }
}

/// Sleep in short slices, returning early once `cancel` is set
fn sleep_until(deadline: Instant, cancel: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || cancel.load(Ordering::Acquire) {
            return;
        }
        std::thread::sleep((deadline - now).min(POLL_SLICE));
    }
}

/// Video transport that decodes webcams and image sequences off-thread
/// and exposes them through `VideoSource`.
pub struct MediaPlayer {
    options: PlayerOptions,
    feed: Option<Feed>,
    /// Cancelled decode thread the next feed joins before opening
    retired: Option<JoinHandle<()>>,
    url: Option<String>,
    frame: Option<RgbImage>,
    fresh: bool,
    dimensions: Option<(u32, u32)>,
    ready: bool,
    playing: bool,
    events: VecDeque<MediaEvent>,
}

impl MediaPlayer {
    pub fn new(options: PlayerOptions) -> Self {
        Self {
            options,
            feed: None,
            retired: None,
            url: None,
            frame: None,
            fresh: false,
            dimensions: None,
            ready: false,
            playing: false,
            events: VecDeque::new(),
        }
    }

    /// URL of the current source
    pub fn source(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn opener(&self, url: &str) -> Result<Opener, CaptureError> {
        match SourceUrl::parse(url) {
            SourceUrl::Camera(index) => Ok(Box::new(move || {
                WebcamCapture::new(index).map(|c| Box::new(c) as Box<dyn CaptureSource>)
            })),
            SourceUrl::Path(path) => {
                let PlayerOptions { fps, looping, .. } = self.options;
                Ok(Box::new(move || {
                    ImageSequence::open(&path, fps, looping)
                        .map(|s| Box::new(s) as Box<dyn CaptureSource>)
                }))
            }
            SourceUrl::Unsupported(url) => Err(CaptureError::Unsupported(url)),
        }
    }

    fn reset(&mut self) {
        if let Some(feed) = self.feed.take() {
            self.retired = feed.retire();
        }
        self.frame = None;
        self.fresh = false;
        self.dimensions = None;
        self.ready = false;
        self.playing = false;
    }

    fn pump(&mut self) {
        while let Some(msg) = self.feed.as_ref().and_then(Feed::try_recv) {
            self.handle(msg);
        }
    }

    fn handle(&mut self, msg: FeedMessage) {
        match msg {
            FeedMessage::Opened { width, height } => {
                tracing::debug!("Video source opened at {}x{}", width, height);
                self.dimensions = Some((width, height));
                if self.options.autoplay {
                    let _ = self.play();
                }
            }
            FeedMessage::Frame(frame) => {
                if !self.ready {
                    let (width, height) = frame.dimensions();
                    self.ready = true;
                    self.dimensions = Some((width, height));
                    self.events.push_back(MediaEvent::LoadedData { width, height });
                    self.events.push_back(MediaEvent::CanPlay);
                }
                self.frame = Some(frame);
                self.fresh = true;
            }
            FeedMessage::Ended => {
                self.playing = false;
                self.events.push_back(MediaEvent::Ended);
            }
            FeedMessage::Error(code) => {
                if !self.ready {
                    self.playing = false;
                }
                self.events.push_back(MediaEvent::Error(code));
            }
        }
    }
}

impl Default for MediaPlayer {
    fn default() -> Self {
        Self::new(PlayerOptions::default())
    }
}

impl VideoSource for MediaPlayer {
    fn set_source(&mut self, url: &str) {
        tracing::info!("Loading video source {}", url);
        self.reset();
        self.url = Some(url.to_string());
        self.events.push_back(MediaEvent::LoadStart);

        match self.opener(url) {
            Ok(opener) => match Feed::spawn(opener, self.retired.take()) {
                Ok(feed) => self.feed = Some(feed),
                Err(e) => {
                    tracing::warn!("Failed to spawn decode thread: {}", e);
                    self.events.push_back(MediaEvent::Error(MediaErrorCode::Aborted));
                }
            },
            Err(e) => {
                tracing::warn!("Cannot open {}: {}", url, e);
                self.events.push_back(MediaEvent::Error(e.code()));
            }
        }
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
        self.pump();
        if !self.fresh {
            return None;
        }
        self.fresh = false;
        self.frame.as_ref()
    }

    fn play(&mut self) -> Result<(), MediaErrorCode> {
        let Some(feed) = &self.feed else {
            return Err(MediaErrorCode::SrcNotSupported);
        };
        feed.set_paused(false);
        if !self.playing {
            self.playing = true;
            self.events.push_back(MediaEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(feed) = &self.feed {
            feed.set_paused(true);
        }
        if self.playing {
            self.playing = false;
            self.events.push_back(MediaEvent::Pause);
        }
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.pump();
        self.events.pop_front()
    }

    fn close(&mut self) {
        self.reset();
        self.events.clear();
    }
}
