//! Vibration Kernel
//!
//! Detects vibrating regions in a video stream by comparing recent edge maps.
//!
//! # Architecture
//!
//! Frames flow through a fixed chain:
//!
//! 1. **Ingest**: a `FrameSource` yields frames until the stream ends.
//! 2. **Subsample**: optionally only every other frame is processed.
//! 3. **Preprocess**: grayscale, then an edge map (auto-threshold Canny by default).
//! 4. **Window**: edge maps enter a bounded `FrameBuffer`; the oldest is evicted.
//! 5. **Aggregate**: once the window is full, every append reduces the window to
//!    one difference frame.
//! 6. **Classify**: the difference frame becomes a 4-channel vibration map,
//!    coloured by neighbour density against `ColorBounds`.
//! 7. **Emit**: the vibration map goes to an `OutputSink`.
//!
//! `PipelineController` drives the chain. Per-frame processing failures are
//! logged and skipped; anything else closes the source.
//!
//! # Module Structure
//!
//! - `frame`: `Frame`, `ColorBounds`, the bounded `FrameBuffer`
//! - `imgproc`: the `ImageBackend` operation set and its CPU implementation
//! - `ingest`: frame sources (synthetic, image directories, video files)
//! - `stage`: preprocessing, windowing and aggregation
//! - `pipeline`: the capture loop state machine
//! - `output`: sinks for classified frames
//! - `config`: daemon configuration (file + environment)

pub mod config;
pub mod error;
pub mod frame;
pub mod imgproc;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod stage;

pub use error::{classify, BufferError, ProcessError, Severity};
pub use frame::{ColorBounds, Frame, FrameBuffer, DEFAULT_WINDOW_FRAMES};
pub use imgproc::{CpuBackend, ImageBackend, VIBRATION_PALETTE};
pub use ingest::{FileSource, FrameSource, ImageDirSource, SourceGuard, SourceStats};
pub use output::{ImageDirSink, LogSink, OutputSink};
pub use pipeline::{
    CaptureStatus, CloseReason, PipelineConfig, PipelineController, PipelineState, RunStats,
    RunSummary, Step, StopHandle, Transition, DEFAULT_PACING, VIBRATION_LABEL,
};
pub use stage::{AggregationStage, EdgeDetection, Reduction, StageConfig, VibrationOutput};
