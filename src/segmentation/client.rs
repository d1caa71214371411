use super::preprocess::Preprocessor;
use super::types::SegmentationModel;
use crate::config::SampleResolution;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds a fresh classifier. Called on the worker thread once per session.
pub type ModelFactory =
    Arc<dyn Fn() -> anyhow::Result<Box<dyn SegmentationModel>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Classifier is being constructed on the worker
    Loading,
    /// Accepting requests
    Active,
    /// Unavailable for the rest of the session
    Disabled,
    /// Torn down with its session
    Disposed,
}

struct ClassifyRequest {
    generation: u64,
    frame: RgbImage,
}

enum WorkerMessage {
    Loaded { generation: u64 },
    LoadFailed { generation: u64, reason: String },
    Mask { generation: u64, mask: Vec<u8> },
    Failed { generation: u64, reason: String },
}

impl WorkerMessage {
    fn generation(&self) -> u64 {
        match self {
            WorkerMessage::Loaded { generation }
            | WorkerMessage::LoadFailed { generation, .. }
            | WorkerMessage::Mask { generation, .. }
            | WorkerMessage::Failed { generation, .. } => *generation,
        }
    }
}

/// Throttled, non-blocking front end to a foreground classifier.
///
/// The classifier lives on a worker thread. At most one request is in
/// flight, and a new one is only issued once the throttle interval has
/// passed since the previous issue. Results are tagged with the session
/// generation; anything from another generation is dropped.
///
/// Any classifier failure disables the client for good, after which
/// `mask` is always `None`.
pub struct SegmentationClient {
    generation: u64,
    resolution: SampleResolution,
    interval: Duration,
    state: ClientState,
    requests: Option<Sender<ClassifyRequest>>,
    results: Option<Receiver<WorkerMessage>>,
    cancel: Arc<AtomicBool>,
    in_flight: bool,
    last_issue: Option<Instant>,
    mask: Option<Vec<u8>>,
    issued: u64,
    completed: u64,
}

impl SegmentationClient {
    /// Start loading a classifier for the given session.
    ///
    /// Without a factory the client starts out disabled.
    pub fn spawn(
        factory: Option<ModelFactory>,
        resolution: SampleResolution,
        interval: Duration,
        generation: u64,
    ) -> Self {
        let mut client = Self::disabled(resolution, interval, generation);
        let Some(factory) = factory else {
            tracing::info!("No segmentation model configured, running motion-only");
            return client;
        };

        let (request_tx, request_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let cancel = Arc::clone(&client.cancel);

        let spawned = std::thread::Builder::new()
            .name(format!("segmentation-{generation}"))
            .spawn(move || {
                run_worker(factory, request_rx, result_tx, cancel, generation, resolution)
            });

        match spawned {
            Ok(_) => {
                client.state = ClientState::Loading;
                client.requests = Some(request_tx);
                client.results = Some(result_rx);
            }
            Err(e) => tracing::warn!("Failed to start segmentation worker: {}", e),
        }

        client
    }

    /// A client that never classifies anything
    pub fn disabled(resolution: SampleResolution, interval: Duration, generation: u64) -> Self {
        Self {
            generation,
            resolution,
            interval,
            state: ClientState::Disabled,
            requests: None,
            results: None,
            cancel: Arc::new(AtomicBool::new(false)),
            in_flight: false,
            last_issue: None,
            mask: None,
            issued: 0,
            completed: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ClientState::Active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Most recently completed mask, one byte per sampled pixel
    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Apply everything the worker has finished. Never blocks.
    ///
    /// Returns `true` when a new mask replaced the stored one.
    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        loop {
            let Some(results) = &self.results else {
                return updated;
            };
            match results.try_recv() {
                Ok(msg) => updated |= self.accept(msg),
                Err(TryRecvError::Empty) => return updated,
                Err(TryRecvError::Disconnected) => {
                    if matches!(self.state, ClientState::Loading | ClientState::Active) {
                        self.disable("segmentation worker exited");
                    }
                    self.results = None;
                    return updated;
                }
            }
        }
    }

    fn accept(&mut self, msg: WorkerMessage) -> bool {
        if msg.generation() != self.generation {
            tracing::debug!(
                "Dropping segmentation result from session {} (current {})",
                msg.generation(),
                self.generation
            );
            return false;
        }
        if matches!(self.state, ClientState::Disabled | ClientState::Disposed) {
            return false;
        }

        match msg {
            WorkerMessage::Loaded { .. } => {
                tracing::info!("Segmentation model ready");
                self.state = ClientState::Active;
                false
            }
            WorkerMessage::LoadFailed { reason, .. } => {
                self.disable(&format!("model failed to load: {reason}"));
                false
            }
            WorkerMessage::Mask { mask, .. } => {
                self.in_flight = false;
                self.completed += 1;
                if mask.len() != self.resolution.count() {
                    tracing::warn!(
                        "Ignoring segmentation mask of {} values, expected {}",
                        mask.len(),
                        self.resolution.count()
                    );
                    return false;
                }
                tracing::debug!("Segmentation mask updated");
                self.mask = Some(mask);
                true
            }
            WorkerMessage::Failed { reason, .. } => {
                self.disable(&format!("classifier error: {reason}"));
                false
            }
        }
    }

    /// True when a request issued at `now` would go out
    pub fn should_request(&self, now: Instant) -> bool {
        self.state == ClientState::Active
            && !self.in_flight
            && self
                .last_issue
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Issue a classification request for `frame` if the throttle allows it.
    ///
    /// Returns `true` when a request was sent.
    pub fn request(&mut self, frame: &RgbImage, now: Instant) -> bool {
        if !self.should_request(now) {
            return false;
        }
        let Some(requests) = &self.requests else {
            return false;
        };

        let request = ClassifyRequest {
            generation: self.generation,
            frame: frame.clone(),
        };
        if requests.send(request).is_err() {
            self.disable("segmentation worker stopped");
            return false;
        }

        self.in_flight = true;
        self.last_issue = Some(now);
        self.issued += 1;
        true
    }

    fn disable(&mut self, reason: &str) {
        tracing::warn!(
            "Segmentation disabled for this session ({}), continuing with motion only",
            reason
        );
        self.state = ClientState::Disabled;
        self.mask = None;
        self.in_flight = false;
        self.requests = None;
        self.cancel.store(true, Ordering::Release);
    }

    /// Cancel outstanding work and release the classifier.
    ///
    /// The worker is not joined: an inference already running finishes in
    /// the background and its result is discarded.
    pub fn dispose(&mut self) {
        if self.state == ClientState::Disposed {
            return;
        }
        tracing::debug!("Disposing segmentation client for session {}", self.generation);
        self.cancel.store(true, Ordering::Release);
        self.requests = None;
        self.results = None;
        self.mask = None;
        self.in_flight = false;
        self.state = ClientState::Disposed;
    }
}

impl Drop for SegmentationClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run_worker(
    factory: ModelFactory,
    requests: Receiver<ClassifyRequest>,
    results: Sender<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    generation: u64,
    resolution: SampleResolution,
) {
    let mut model = match factory() {
        Ok(model) => model,
        Err(e) => {
            let _ = results.send(WorkerMessage::LoadFailed {
                generation,
                reason: format!("{e:#}"),
            });
            return;
        }
    };

    let (input_width, input_height) = model.input_size();
    tracing::debug!("Segmentation model input is {}x{}", input_width, input_height);

    if cancel.load(Ordering::Acquire) || results.send(WorkerMessage::Loaded { generation }).is_err()
    {
        return;
    }

    let mut input_dims: Option<(u32, u32)> = None;
    while let Ok(request) = requests.recv() {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        // Recurrent state is shaped by the input, so it cannot carry over
        let dims = request.frame.dimensions();
        if input_dims.is_some_and(|previous| previous != dims) {
            model.reset_state();
        }
        input_dims = Some(dims);

        let outcome = model.segment(&request.frame).and_then(|matte| {
            Preprocessor::matte_to_mask(&matte, resolution.width(), resolution.height())
        });

        // The session may have been torn down while classifying
        if cancel.load(Ordering::Acquire) {
            break;
        }

        let (msg, fatal) = match outcome {
            Ok(mask) => (
                WorkerMessage::Mask {
                    generation: request.generation,
                    mask,
                },
                false,
            ),
            Err(e) => (
                WorkerMessage::Failed {
                    generation: request.generation,
                    reason: format!("{e:#}"),
                },
                true,
            ),
        };

        if results.send(msg).is_err() || fatal {
            break;
        }
    }

    tracing::debug!("Segmentation worker for session {} exiting", generation);
}
