//! vibration_probe - one-shot inspection of a single window.
//!
//! Reads the first `--capacity` frames from a source, builds their edge maps
//! and runs both window reductions side by side. Writes the intermediate
//! frames as PNGs so thresholds and colour bounds can be tuned by eye.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use vibration_kernel::{
    output::save_png, ColorBounds, CpuBackend, FileSource, FrameBuffer, FrameSource,
    ImageBackend, SourceGuard,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source: `stub://...`, an image directory or a video file.
    #[arg(long, default_value = "stub://probe")]
    source: String,
    /// Frames to collect into the window.
    #[arg(long, default_value_t = 10)]
    capacity: usize,
    /// Auto-threshold sigma for edge detection.
    #[arg(long, default_value_t = 0.05)]
    sigma: f64,
    /// Minimum neighbour count for a vibrating pixel.
    #[arg(long, default_value_t = 8)]
    neighbours: u32,
    /// Neighbourhood reach.
    #[arg(long, default_value_t = 2)]
    window_size: u32,
    /// Output directory for PNGs.
    #[arg(long, default_value = "probe_out")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    std::fs::create_dir_all(&args.out)?;

    let mut backend = CpuBackend::new();
    let mut window = FrameBuffer::new(args.capacity)?;
    let mut source = SourceGuard::new(FileSource::open(&args.source)?);

    while !window.is_full() {
        let Some(frame) = source.source_mut().read()? else {
            break;
        };
        let gray = backend.grayscale(&frame)?;
        let edges = backend.edge_detect_auto(&gray, 3, args.sigma, true)?;
        save_png(
            &edges,
            &args.out.join(format!("edges_{:03}.png", window.len())),
        )?;
        window.append(edges);
    }
    source.release();

    if window.len() < 2 {
        return Err(anyhow!(
            "source {} yielded {} frames; need at least 2",
            args.source,
            window.len()
        ));
    }

    let history = window.snapshot();
    let bounds = ColorBounds::default();
    for (label, reduced) in [
        ("difference", backend.difference(&history)?),
        ("difference_reduce", backend.difference_reduce(&history)?),
    ] {
        let level = backend.median(&reduced)?;
        let vibration = backend.vibration(&reduced, bounds, args.neighbours, args.window_size)?;
        save_png(&reduced, &args.out.join(format!("{label}.png")))?;
        save_png(&vibration, &args.out.join(format!("{label}_vibration.png")))?;
        println!("{label}: frames={} level={:.3}", history.len(), level);
    }
    log::info!("probe output written to {}", args.out.display());
    Ok(())
}
