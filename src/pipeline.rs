//! Capture loop.
//!
//! `PipelineController` owns one open source and one aggregation stage and
//! runs the read / subsample / process / emit cycle as an explicit state
//! machine:
//!
//! - `Opened`: each iteration either continues (frame skipped, buffered,
//!   aggregated, or dropped after a recoverable error) or closes.
//! - `Closed`: terminal. Reached on stream end, fatal error or stop signal,
//!   and only after the source has been released.
//!
//! The source sits in a `SourceGuard`, so release also happens if the
//! controller is dropped without running to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::error::{classify, Severity};
use crate::frame::Frame;
use crate::imgproc::ImageBackend;
use crate::ingest::{FrameSource, SourceGuard, SourceStats};
use crate::output::OutputSink;
use crate::stage::AggregationStage;

/// Label attached to emitted classification frames.
pub const VIBRATION_LABEL: &str = "vibration";

/// Default inter-frame pacing delay.
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Process only even-indexed frames.
    pub subsample: bool,
    /// Delay after every iteration, including the one that closes the source.
    pub pacing: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subsample: true,
            pacing: DEFAULT_PACING,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStatus {
    Opened,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineState {
    frame_counter: u64,
    status: CaptureStatus,
}

impl PipelineState {
    fn opened() -> Self {
        Self {
            frame_counter: 0,
            status: CaptureStatus::Opened,
        }
    }

    /// Stream positions consumed so far, failed reads included.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }
}

/// Cooperative stop signal, checked once per iteration.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What an iteration did while the source stayed open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Dropped by subsampling.
    Skipped,
    /// Edge map added, window not yet full.
    Buffered,
    /// Window aggregated and the vibration frame emitted.
    Aggregated,
    /// A recoverable error dropped the frame.
    Recovered,
}

#[derive(Debug)]
pub enum CloseReason {
    StreamEnd,
    Stopped,
    Fatal(anyhow::Error),
}

/// Outcome of a single iteration.
#[derive(Debug)]
pub enum Transition {
    Continue(Step),
    Close(CloseReason),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub frames_processed: u64,
    pub aggregations: u64,
    pub recovered_errors: u64,
}

#[derive(Debug)]
pub struct RunSummary {
    pub stats: RunStats,
    pub source: SourceStats,
    pub close_reason: CloseReason,
}

impl RunSummary {
    /// `Err` with the fatal error if the run did not end cleanly.
    pub fn into_result(self) -> Result<RunStats> {
        match self.close_reason {
            CloseReason::Fatal(err) => Err(err),
            CloseReason::StreamEnd | CloseReason::Stopped => Ok(self.stats),
        }
    }
}

pub struct PipelineController<S: FrameSource, B: ImageBackend, O: OutputSink> {
    source: SourceGuard<S>,
    stage: AggregationStage<B>,
    sink: O,
    config: PipelineConfig,
    state: PipelineState,
    stats: RunStats,
    stop: StopHandle,
}

impl<S: FrameSource, B: ImageBackend, O: OutputSink> PipelineController<S, B, O> {
    /// Open `path` and build a controller in the `Opened` state.
    pub fn open(
        path: &str,
        stage: AggregationStage<B>,
        sink: O,
        config: PipelineConfig,
    ) -> Result<Self> {
        let source = S::open(path)?;
        Self::new(source, stage, sink, config)
    }

    /// Take ownership of an already open source.
    pub fn new(
        source: S,
        stage: AggregationStage<B>,
        sink: O,
        config: PipelineConfig,
    ) -> Result<Self> {
        let mut source = SourceGuard::new(source);
        if !source.source().is_open() {
            source.release();
            return Err(anyhow!("frame source is not open"));
        }
        log::info!(
            "pipeline opened: source={} backend={} window={} subsample={} pacing={:?}",
            source.source().stats().path,
            stage.backend().name(),
            stage.config().capacity,
            config.subsample,
            config.pacing
        );
        Ok(Self {
            source,
            stage,
            sink,
            config,
            state: PipelineState::opened(),
            stats: RunStats::default(),
            stop: StopHandle::new(),
        })
    }

    /// Share an existing stop signal (e.g. one wired to Ctrl-C).
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn stage(&self) -> &AggregationStage<B> {
        &self.stage
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// Run one iteration. Pacing is left to the caller.
    ///
    /// Once closed, further calls keep returning `Close(Stopped)` without
    /// touching the source.
    pub fn step(&mut self) -> Transition {
        if self.state.status == CaptureStatus::Closed {
            return Transition::Close(CloseReason::Stopped);
        }
        if self.stop.is_stopped() {
            log::info!("stop requested after {} frames", self.state.frame_counter);
            return self.close(CloseReason::Stopped);
        }

        let Some(read) = self.source.source_mut().read().transpose() else {
            log::info!("stream ended after {} frames", self.state.frame_counter);
            return self.close(CloseReason::StreamEnd);
        };

        // A failed read still occupies a stream position.
        let index = self.state.frame_counter;
        self.state.frame_counter += 1;
        let frame = match read {
            Ok(frame) => frame,
            Err(err) => return self.handle_error(err),
        };
        self.stats.frames_read += 1;

        if self.config.subsample && index % 2 != 0 {
            self.stats.frames_skipped += 1;
            return Transition::Continue(Step::Skipped);
        }

        match self.process(&frame) {
            Ok(step) => Transition::Continue(step),
            Err(err) => self.handle_error(err.context(format!("frame {index}"))),
        }
    }

    /// Run until the source closes. Sleeps `pacing` after every iteration,
    /// the closing one included.
    pub fn run(mut self) -> RunSummary {
        loop {
            let transition = self.step();
            if !self.config.pacing.is_zero() {
                std::thread::sleep(self.config.pacing);
            }
            match transition {
                Transition::Continue(_) => {}
                Transition::Close(close_reason) => {
                    log::info!(
                        "pipeline closed ({}): read={} processed={} skipped={} aggregations={} recovered={}",
                        describe(&close_reason),
                        self.stats.frames_read,
                        self.stats.frames_processed,
                        self.stats.frames_skipped,
                        self.stats.aggregations,
                        self.stats.recovered_errors
                    );
                    return RunSummary {
                        stats: self.stats.clone(),
                        source: self.source.source().stats(),
                        close_reason,
                    };
                }
            }
        }
    }

    fn process(&mut self, frame: &Frame) -> Result<Step> {
        self.stats.frames_processed += 1;
        match self.stage.process(frame)? {
            None => Ok(Step::Buffered),
            Some(output) => {
                self.stats.aggregations += 1;
                self.sink.emit(VIBRATION_LABEL, &output.vibration)?;
                Ok(Step::Aggregated)
            }
        }
    }

    fn handle_error(&mut self, err: anyhow::Error) -> Transition {
        match classify(&err) {
            Severity::Recoverable => {
                self.stats.recovered_errors += 1;
                log::warn!("frame dropped: {:#}", err);
                Transition::Continue(Step::Recovered)
            }
            Severity::Fatal => {
                log::error!("fatal pipeline error, closing source: {:#}", err);
                self.close(CloseReason::Fatal(err))
            }
        }
    }

    fn close(&mut self, reason: CloseReason) -> Transition {
        self.source.release();
        self.state.status = CaptureStatus::Closed;
        Transition::Close(reason)
    }
}

fn describe(reason: &CloseReason) -> &'static str {
    match reason {
        CloseReason::StreamEnd => "stream end",
        CloseReason::Stopped => "stopped",
        CloseReason::Fatal(_) => "fatal error",
    }
}
