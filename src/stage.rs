//! Aggregation stage: edge maps in, vibration maps out.
//!
//! Each admitted frame is reduced to an edge map and appended to the sliding
//! window. Once the window is full, every further append aggregates the whole
//! window into one difference frame and classifies it. The window is never
//! cleared by aggregation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::frame::{ColorBounds, Frame, FrameBuffer, DEFAULT_WINDOW_FRAMES};
use crate::imgproc::ImageBackend;

/// How a grayscale frame becomes an edge map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EdgeDetection {
    /// Canny with thresholds derived from `sigma`.
    Auto {
        kernel_size: u32,
        sigma: f64,
        l2_gradient: bool,
    },
    /// Canny with fixed hysteresis thresholds.
    Fixed {
        low: f64,
        high: f64,
        kernel_size: u32,
        l2_gradient: bool,
    },
    /// Plain binary threshold instead of Canny.
    Threshold { low: f64, high: f64 },
}

impl Default for EdgeDetection {
    fn default() -> Self {
        Self::Auto {
            kernel_size: 3,
            sigma: 0.05,
            l2_gradient: true,
        }
    }
}

/// Which window reduction feeds classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Pairwise accumulation across the window.
    Difference,
    /// Left fold across the window.
    #[default]
    DifferenceReduce,
}

impl std::str::FromStr for Reduction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "difference" => Ok(Self::Difference),
            "difference_reduce" => Ok(Self::DifferenceReduce),
            other => Err(anyhow::anyhow!(
                "unknown reduction '{}' (expected difference or difference_reduce)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StageConfig {
    /// Window capacity; aggregation needs this many edge maps.
    pub capacity: usize,
    pub edges: EdgeDetection,
    pub reduction: Reduction,
    pub bounds: ColorBounds,
    /// Minimum non-zero neighbours for a pixel to count as vibrating.
    pub neighbours: u32,
    /// Neighbourhood reach around each pixel.
    pub window_size: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WINDOW_FRAMES,
            edges: EdgeDetection::default(),
            reduction: Reduction::default(),
            bounds: ColorBounds::default(),
            neighbours: 8,
            window_size: 2,
        }
    }
}

/// Result of one aggregation.
#[derive(Clone, Debug)]
pub struct VibrationOutput {
    /// Reduced window, single channel.
    pub difference: Frame,
    /// 4-channel classification of `difference`.
    pub vibration: Frame,
    /// Backend's central intensity of `difference`.
    pub difference_level: f64,
    /// 1-based count of aggregations so far.
    pub sequence: u64,
}

pub struct AggregationStage<B: ImageBackend> {
    backend: B,
    window: FrameBuffer<Frame>,
    config: StageConfig,
    aggregations: u64,
}

impl<B: ImageBackend> AggregationStage<B> {
    pub fn new(backend: B, config: StageConfig) -> Result<Self> {
        let window = FrameBuffer::new(config.capacity).context("create frame window")?;
        Ok(Self {
            backend,
            window,
            config,
            aggregations: 0,
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn window(&self) -> &FrameBuffer<Frame> {
        &self.window
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn aggregations(&self) -> u64 {
        self.aggregations
    }

    /// Change the window capacity. Drops all buffered edge maps.
    pub fn resize_window(&mut self, capacity: usize) -> Result<()> {
        self.window.set_capacity(capacity)?;
        self.config.capacity = capacity;
        log::info!("frame window resized to {} (history cleared)", capacity);
        Ok(())
    }

    /// Admit one frame. Returns an output once the window is full.
    pub fn process(&mut self, frame: &Frame) -> Result<Option<VibrationOutput>> {
        let edges = self.preprocess(frame)?;
        self.window.append(edges);
        if self.window.len() < self.window.capacity() {
            return Ok(None);
        }
        self.classify().map(Some)
    }

    fn preprocess(&mut self, frame: &Frame) -> Result<Frame> {
        let gray = self.backend.grayscale(frame)?;
        match self.config.edges {
            EdgeDetection::Auto {
                kernel_size,
                sigma,
                l2_gradient,
            } => self
                .backend
                .edge_detect_auto(&gray, kernel_size, sigma, l2_gradient),
            EdgeDetection::Fixed {
                low,
                high,
                kernel_size,
                l2_gradient,
            } => self
                .backend
                .edge_detect(&gray, low, high, kernel_size, l2_gradient),
            EdgeDetection::Threshold { low, high } => self.backend.threshold(&gray, low, high),
        }
    }

    fn classify(&mut self) -> Result<VibrationOutput> {
        let history = self.window.snapshot();
        let difference = match self.config.reduction {
            Reduction::Difference => self.backend.difference(&history)?,
            Reduction::DifferenceReduce => self.backend.difference_reduce(&history)?,
        };
        let vibration = self.backend.vibration(
            &difference,
            self.config.bounds,
            self.config.neighbours,
            self.config.window_size,
        )?;
        let difference_level = self.backend.median(&difference)?;
        self.aggregations += 1;
        log::debug!(
            "aggregation #{}: window={} reduction={:?} level={:.3}",
            self.aggregations,
            history.len(),
            self.config.reduction,
            difference_level
        );
        Ok(VibrationOutput {
            difference,
            vibration,
            difference_level,
            sequence: self.aggregations,
        })
    }
}
