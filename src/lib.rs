//! Real-time video to particle-field renderer.
//!
//! Each video frame is downsampled onto a fixed grid, differenced against
//! the previous frame for motion and merged with a throttled foreground
//! mask. The result drives one GPU point per grid cell.

pub mod capture;
pub mod config;
pub mod motion;
pub mod particles;
pub mod render;
pub mod render_loop;
pub mod sampler;
pub mod scene;
pub mod segmentation;
pub mod session;

pub use config::{ConfigError, PipelineConfig, SampleResolution};
pub use render_loop::{LoopState, LoopStats, PipelineEvent, RenderLoop};
pub use session::{RenderSession, SessionError};
