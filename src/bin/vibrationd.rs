//! vibrationd - vibration detection daemon
//!
//! This daemon:
//! 1. Opens the configured frame source (synthetic, image directory or video file)
//! 2. Turns every admitted frame into an edge map and keeps the last N in a window
//! 3. Aggregates the full window into a difference frame and classifies it
//! 4. Emits the vibration map to a PNG directory, or logs it
//! 5. Releases the source on stream end, fatal error or Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use vibration_kernel::{
    config::VibrationdConfig, AggregationStage, CpuBackend, FileSource, ImageDirSink, LogSink,
    OutputSink, PipelineController, Reduction, StopHandle,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source: `stub://...`, an image directory or a video file.
    #[arg(long)]
    source: Option<String>,
    /// Edge maps kept in the sliding window.
    #[arg(long)]
    capacity: Option<usize>,
    /// Process every frame instead of every other frame.
    #[arg(long)]
    no_subsample: bool,
    /// Delay between iterations in milliseconds.
    #[arg(long)]
    pacing_ms: Option<u64>,
    /// Window reduction: `difference` or `difference_reduce`.
    #[arg(long)]
    reduction: Option<Reduction>,
    /// Write vibration maps as PNGs into this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = VibrationdConfig::load()?;
    apply_args(&mut cfg, args);
    cfg.validate()?;

    let sink: Box<dyn OutputSink> = match &cfg.output_dir {
        Some(dir) => {
            log::info!("writing vibration maps to {}", dir.display());
            Box::new(ImageDirSink::new(dir)?)
        }
        None => Box::new(LogSink::new()),
    };

    let stage = AggregationStage::new(CpuBackend::new(), cfg.stage.clone())?;
    let stop = StopHandle::new();
    let ctrlc_stop = stop.clone();
    ctrlc::set_handler(move || ctrlc_stop.stop())
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let controller = PipelineController::<FileSource, _, _>::open(
        &cfg.source,
        stage,
        sink,
        cfg.pipeline.clone(),
    )?
    .with_stop_handle(stop);

    log::info!("vibrationd running. source={}", cfg.source);
    let summary = controller.run();
    log::info!(
        "source {} delivered {} frames",
        summary.source.path,
        summary.source.frames_captured
    );
    let stats = summary.into_result()?;
    log::info!(
        "vibrationd finished: {} aggregations from {} processed frames",
        stats.aggregations,
        stats.frames_processed
    );
    Ok(())
}

fn apply_args(cfg: &mut VibrationdConfig, args: Args) {
    if let Some(source) = args.source {
        cfg.source = source;
    }
    if let Some(capacity) = args.capacity {
        cfg.stage.capacity = capacity;
    }
    if args.no_subsample {
        cfg.pipeline.subsample = false;
    }
    if let Some(pacing_ms) = args.pacing_ms {
        cfg.pipeline.pacing = std::time::Duration::from_millis(pacing_ms);
    }
    if let Some(reduction) = args.reduction {
        cfg.stage.reduction = reduction;
    }
    if let Some(dir) = args.out_dir {
        cfg.output_dir = Some(dir);
    }
}
