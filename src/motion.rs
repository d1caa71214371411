use crate::config::SampleResolution;
use crate::sampler::SampledFrame;

/// Summed absolute RGB delta normalised by 765 must exceed this to count
/// as motion
pub const MOTION_THRESHOLD: f32 = 0.1;

/// Largest possible summed RGB delta (255 * 3)
const MAX_DELTA: u32 = 765;

/// Binary per-pixel motion between consecutive sampled frames.
///
/// Holds the only copy of the previous frame. The first frame after
/// construction or `reset` yields an all-zero mask.
pub struct MotionDetector {
    previous: Option<SampledFrame>,
    mask: Vec<u8>,
    moving: usize,
}

impl MotionDetector {
    pub fn new(resolution: SampleResolution) -> Self {
        Self {
            previous: None,
            mask: vec![0; resolution.count()],
            moving: 0,
        }
    }

    /// Compare `frame` against the previous frame, then retain a copy of it.
    ///
    /// Returns the motion mask: one byte per pixel, either 0 or 1.
    pub fn detect(&mut self, frame: &SampledFrame) -> &[u8] {
        let _span = tracing::debug_span!("motion").entered();
        debug_assert_eq!(frame.resolution().count(), self.mask.len());

        self.moving = 0;
        match &mut self.previous {
            Some(previous) => {
                let current = frame.as_bytes().chunks_exact(4);
                let before = previous.as_bytes().chunks_exact(4);
                for ((m, cur), prev) in self.mask.iter_mut().zip(current).zip(before) {
                    let moved = is_motion(channel_delta(cur, prev));
                    *m = moved as u8;
                    self.moving += moved as usize;
                }
                previous.copy_from(frame);
            }
            None => {
                self.mask.fill(0);
                self.previous = Some(frame.clone());
            }
        }

        &self.mask
    }

    /// Mask produced by the last `detect`
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Number of moving pixels in the last mask
    pub fn moving_count(&self) -> usize {
        self.moving
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget the previous frame
    pub fn reset(&mut self) {
        self.previous = None;
        self.mask.fill(0);
        self.moving = 0;
    }
}

fn channel_delta(a: &[u8], b: &[u8]) -> u32 {
    a[..3]
        .iter()
        .zip(&b[..3])
        .map(|(&x, &y)| x.abs_diff(y) as u32)
        .sum()
}

/// `delta / 765 > MOTION_THRESHOLD`
fn is_motion(delta: u32) -> bool {
    delta as f32 > MOTION_THRESHOLD * MAX_DELTA as f32
}
