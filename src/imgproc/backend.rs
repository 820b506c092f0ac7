use anyhow::Result;

use crate::frame::{ColorBounds, Frame};

/// Image-processing backend trait.
///
/// The capture pipeline never touches pixels itself; every pixel-level step
/// goes through one of these operations. Implementations report rejected
/// input (wrong channel count, mismatched shapes, bad parameters) as a
/// `ProcessError` inside the returned `anyhow::Error`, so the pipeline can
/// drop the frame and continue. Any other error is treated as fatal.
pub trait ImageBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Convert a multi-channel frame to a single-channel intensity frame.
    fn grayscale(&mut self, frame: &Frame) -> Result<Frame>;

    /// Canny edge detection with explicit hysteresis thresholds.
    fn edge_detect(
        &mut self,
        frame: &Frame,
        low: f64,
        high: f64,
        kernel_size: u32,
        l2_gradient: bool,
    ) -> Result<Frame>;

    /// Canny edge detection with thresholds derived from `sigma` and the
    /// frame's intensity statistics.
    fn edge_detect_auto(
        &mut self,
        frame: &Frame,
        kernel_size: u32,
        sigma: f64,
        l2_gradient: bool,
    ) -> Result<Frame>;

    /// Binary threshold: samples above `low` become `high`, the rest zero.
    fn threshold(&mut self, frame: &Frame, low: f64, high: f64) -> Result<Frame>;

    /// Accumulate absolute differences of consecutive pairs.
    fn difference(&mut self, frames: &[Frame]) -> Result<Frame>;

    /// Fold absolute differences left to right. Not interchangeable with
    /// `difference`.
    fn difference_reduce(&mut self, frames: &[Frame]) -> Result<Frame>;

    /// Central intensity statistic of a single-channel frame.
    fn median(&mut self, frame: &Frame) -> Result<f64>;

    /// Classify a difference frame into a 4-channel vibration map.
    fn vibration(
        &mut self,
        frame: &Frame,
        bounds: ColorBounds,
        neighbours: u32,
        window_size: u32,
    ) -> Result<Frame>;
}

impl<B: ImageBackend + ?Sized> ImageBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn grayscale(&mut self, frame: &Frame) -> Result<Frame> {
        (**self).grayscale(frame)
    }

    fn edge_detect(
        &mut self,
        frame: &Frame,
        low: f64,
        high: f64,
        kernel_size: u32,
        l2_gradient: bool,
    ) -> Result<Frame> {
        (**self).edge_detect(frame, low, high, kernel_size, l2_gradient)
    }

    fn edge_detect_auto(
        &mut self,
        frame: &Frame,
        kernel_size: u32,
        sigma: f64,
        l2_gradient: bool,
    ) -> Result<Frame> {
        (**self).edge_detect_auto(frame, kernel_size, sigma, l2_gradient)
    }

    fn threshold(&mut self, frame: &Frame, low: f64, high: f64) -> Result<Frame> {
        (**self).threshold(frame, low, high)
    }

    fn difference(&mut self, frames: &[Frame]) -> Result<Frame> {
        (**self).difference(frames)
    }

    fn difference_reduce(&mut self, frames: &[Frame]) -> Result<Frame> {
        (**self).difference_reduce(frames)
    }

    fn median(&mut self, frame: &Frame) -> Result<f64> {
        (**self).median(frame)
    }

    fn vibration(
        &mut self,
        frame: &Frame,
        bounds: ColorBounds,
        neighbours: u32,
        window_size: u32,
    ) -> Result<Frame> {
        (**self).vibration(frame, bounds, neighbours, window_size)
    }
}
