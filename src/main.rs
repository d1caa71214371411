mod app;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use particle_mirror::capture::PlayerOptions;
use particle_mirror::segmentation;
use particle_mirror::{PipelineConfig, SampleResolution};
use std::time::Duration;
use winit::event_loop::EventLoop;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video source: camera://<index>, an image file, or a directory of frames
    #[arg(short, long, default_value = "camera://0")]
    source: String,

    /// Sample grid width (one particle per cell)
    #[arg(long, default_value_t = 320)]
    sample_width: u32,

    /// Sample grid height
    #[arg(long, default_value_t = 180)]
    sample_height: u32,

    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    window_width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    window_height: u32,

    /// Point diameter in pixels
    #[arg(long, default_value_t = 3.0)]
    point_size: f32,

    /// Path to segmentation model (ONNX file)
    /// If not provided, particles are never pushed to the foreground
    #[arg(long)]
    model: Option<String>,

    /// Minimum milliseconds between two segmentation requests
    #[arg(long, default_value_t = 100)]
    segmentation_interval_ms: u64,

    /// Playback rate for image sequences
    #[arg(long, default_value_t = 30)]
    source_fps: u32,

    /// Stop at the end of an image sequence instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let resolution = SampleResolution::new(args.sample_width, args.sample_height)
        .context("Invalid sample resolution")?;
    let config = PipelineConfig::new(
        resolution,
        args.point_size,
        Duration::from_millis(args.segmentation_interval_ms),
        (args.window_width, args.window_height),
    )
    .context("Invalid pipeline configuration")?;
    let options =
        PlayerOptions::new(args.source_fps, !args.no_loop).context("Invalid playback options")?;

    tracing::info!("particle-mirror starting");
    tracing::info!("Source: {}", args.source);
    tracing::info!("Sample grid: {} ({} particles)", resolution, resolution.count());
    tracing::info!("Window: {}x{}", args.window_width, args.window_height);

    let model = match &args.model {
        Some(path) => {
            tracing::info!("Segmentation model: {}", path);
            Some(segmentation::default_model_factory(path))
        }
        None => {
            tracing::info!("Running motion-only (no segmentation model)");
            None
        }
    };

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config, options, args.source, model);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    if let Some(reason) = app.fatal() {
        anyhow::bail!("Render loop failed: {reason}");
    }

    tracing::info!("particle-mirror stopped");
    Ok(())
}
