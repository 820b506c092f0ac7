use anyhow::Result;
use image::{GrayImage, RgbImage, RgbaImage};

use crate::error::ProcessError;
use crate::frame::{ColorBounds, Frame};

use super::backend::ImageBackend;

/// RGBA colour per bound channel (ch1..ch4).
pub const VIBRATION_PALETTE: [[u8; 4]; 4] = [
    [0, 255, 0, 255],
    [255, 255, 0, 255],
    [255, 128, 0, 255],
    [255, 0, 0, 255],
];

/// CPU backend built on `image` and `imageproc`.
///
/// Canny runs with imageproc's fixed 3x3 Sobel aperture and L2 gradient
/// magnitude, so only `kernel_size == 3` is accepted. The `median` statistic
/// is the arithmetic mean intensity.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ImageBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn grayscale(&mut self, frame: &Frame) -> Result<Frame> {
        let (width, height, channels) = frame.shape();
        let gray = match channels {
            1 => return Ok(frame.clone()),
            3 => {
                let rgb = RgbImage::from_raw(width, height, frame.pixels().to_vec())
                    .ok_or_else(|| ProcessError::invalid_frame("RGB buffer too small"))?;
                image::imageops::grayscale(&rgb)
            }
            4 => {
                let rgba = RgbaImage::from_raw(width, height, frame.pixels().to_vec())
                    .ok_or_else(|| ProcessError::invalid_frame("RGBA buffer too small"))?;
                image::imageops::grayscale(&rgba)
            }
            actual => {
                return Err(ProcessError::ChannelMismatch {
                    op: "grayscale",
                    expected: 3,
                    actual,
                }
                .into())
            }
        };
        Ok(Frame::new(gray.into_raw(), width, height, 1)?)
    }

    fn edge_detect(
        &mut self,
        frame: &Frame,
        low: f64,
        high: f64,
        kernel_size: u32,
        l2_gradient: bool,
    ) -> Result<Frame> {
        frame.require_channels("edge_detect", 1)?;
        if kernel_size != 3 {
            return Err(ProcessError::invalid_parameter(
                "edge_detect",
                format!("unsupported Sobel aperture {kernel_size} (cpu backend supports 3)"),
            )
            .into());
        }
        if !low.is_finite() || !high.is_finite() || low < 0.0 || low > high {
            return Err(ProcessError::invalid_parameter(
                "edge_detect",
                format!("thresholds must satisfy 0 <= low <= high (low={low}, high={high})"),
            )
            .into());
        }
        if !l2_gradient {
            log::trace!("cpu backend: L1 gradient requested, using L2 magnitude");
        }
        let gray = to_gray_image(frame)?;
        let edges = imageproc::edges::canny(&gray, low as f32, high as f32);
        Ok(Frame::new(edges.into_raw(), frame.width(), frame.height(), 1)?)
    }

    fn edge_detect_auto(
        &mut self,
        frame: &Frame,
        kernel_size: u32,
        sigma: f64,
        l2_gradient: bool,
    ) -> Result<Frame> {
        frame.require_channels("edge_detect_auto", 1)?;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(ProcessError::invalid_parameter(
                "edge_detect_auto",
                format!("sigma must be finite and non-negative (got {sigma})"),
            )
            .into());
        }
        let (low, high) = auto_thresholds(self.median(frame)?, sigma);
        self.edge_detect(frame, low, high, kernel_size, l2_gradient)
    }

    fn threshold(&mut self, frame: &Frame, low: f64, high: f64) -> Result<Frame> {
        frame.require_channels("threshold", 1)?;
        let on = high.round().clamp(0.0, 255.0) as u8;
        let data = frame
            .pixels()
            .iter()
            .map(|&p| if p as f64 > low { on } else { 0 })
            .collect();
        Ok(Frame::new(data, frame.width(), frame.height(), 1)?)
    }

    fn difference(&mut self, frames: &[Frame]) -> Result<Frame> {
        let first = check_sequence("difference", frames)?;
        let mut acc = vec![0u8; first.pixels().len()];
        for pair in frames.windows(2) {
            for ((out, &a), &b) in acc
                .iter_mut()
                .zip(pair[0].pixels())
                .zip(pair[1].pixels())
            {
                *out = out.saturating_add(a.abs_diff(b));
            }
        }
        Ok(Frame::new(acc, first.width(), first.height(), first.channels())?)
    }

    fn difference_reduce(&mut self, frames: &[Frame]) -> Result<Frame> {
        let first = check_sequence("difference_reduce", frames)?;
        let mut acc = first.pixels().to_vec();
        for next in &frames[1..] {
            for (out, &b) in acc.iter_mut().zip(next.pixels()) {
                *out = out.abs_diff(b);
            }
        }
        Ok(Frame::new(acc, first.width(), first.height(), first.channels())?)
    }

    fn median(&mut self, frame: &Frame) -> Result<f64> {
        frame.require_channels("median", 1)?;
        let pixels = frame.pixels();
        if pixels.is_empty() {
            return Ok(0.0);
        }
        let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
        Ok(sum as f64 / pixels.len() as f64)
    }

    fn vibration(
        &mut self,
        frame: &Frame,
        bounds: ColorBounds,
        neighbours: u32,
        window_size: u32,
    ) -> Result<Frame> {
        frame.require_channels("vibration", 1)?;
        if window_size == 0 {
            return Err(ProcessError::invalid_parameter(
                "vibration",
                "window size must be at least 1",
            )
            .into());
        }
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let pixels = frame.pixels();
        let integral = nonzero_integral(pixels, w, h);
        let reach = window_size as usize;

        let mut out = vec![0u8; w * h * 4];
        for y in 0..h {
            for x in 0..w {
                if pixels[y * w + x] == 0 {
                    continue;
                }
                let x0 = x.saturating_sub(reach);
                let y0 = y.saturating_sub(reach);
                let x1 = (x + reach + 1).min(w);
                let y1 = (y + reach + 1).min(h);
                let count = window_sum(&integral, w, x0, y0, x1, y1) - 1;
                if count < neighbours {
                    continue;
                }
                let channel = bounds.channel_for(count.min(i32::MAX as u32) as i32);
                let offset = (y * w + x) * 4;
                out[offset..offset + 4].copy_from_slice(&VIBRATION_PALETTE[channel]);
            }
        }
        Ok(Frame::new(out, frame.width(), frame.height(), 4)?)
    }
}

/// Hysteresis thresholds around a central intensity.
pub(crate) fn auto_thresholds(center: f64, sigma: f64) -> (f64, f64) {
    let low = ((1.0 - sigma) * center).max(0.0);
    let high = ((1.0 + sigma) * center).min(255.0);
    (low.min(high), high)
}

fn to_gray_image(frame: &Frame) -> Result<GrayImage> {
    GrayImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .ok_or_else(|| ProcessError::invalid_frame("grayscale buffer too small").into())
}

fn check_sequence<'a>(op: &'static str, frames: &'a [Frame]) -> Result<&'a Frame> {
    let first = frames
        .first()
        .ok_or(ProcessError::EmptySequence { op })?;
    if let Some(other) = frames.iter().find(|f| f.shape() != first.shape()) {
        return Err(ProcessError::ShapeMismatch {
            op,
            expected: first.shape(),
            actual: other.shape(),
        }
        .into());
    }
    Ok(first)
}

/// Summed-area table of non-zero samples, `(w + 1) * (h + 1)` entries.
fn nonzero_integral(pixels: &[u8], w: usize, h: usize) -> Vec<u32> {
    let stride = w + 1;
    let mut table = vec![0u32; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0u32;
        for x in 0..w {
            row += u32::from(pixels[y * w + x] != 0);
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
        }
    }
    table
}

fn window_sum(table: &[u32], w: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u32 {
    let stride = w + 1;
    table[y1 * stride + x1] + table[y0 * stride + x0]
        - table[y0 * stride + x1]
        - table[y1 * stride + x0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame::new(data, width, height, 1).unwrap()
    }

    #[test]
    fn grayscale_reduces_rgb_to_one_channel() {
        let mut backend = CpuBackend::new();
        let rgb = Frame::filled(8, 4, 3, 200);
        let out = backend.grayscale(&rgb).unwrap();
        assert_eq!(out.shape(), (8, 4, 1));
        assert!(out.pixels().iter().all(|&p| p == 200));
    }

    #[test]
    fn grayscale_rejects_two_channel_input() {
        let mut backend = CpuBackend::new();
        let err = backend.grayscale(&Frame::filled(2, 2, 2, 0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::ChannelMismatch { actual: 2, .. })
        ));
    }

    #[test]
    fn edge_detection_requires_single_channel() {
        let mut backend = CpuBackend::new();
        let rgb = Frame::filled(16, 16, 3, 10);
        let err = backend.edge_detect_auto(&rgb, 3, 0.05, true).unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
        let err = backend.threshold(&rgb, 100.0, 200.0).unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
    }

    #[test]
    fn edge_detection_rejects_other_apertures() {
        let mut backend = CpuBackend::new();
        let frame = Frame::filled(16, 16, 1, 10);
        let err = backend.edge_detect(&frame, 10.0, 20.0, 5, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn edge_detection_finds_a_vertical_step() {
        let mut backend = CpuBackend::new();
        let (w, h) = (32u32, 32u32);
        let data = (0..h)
            .flat_map(|_| (0..w).map(|x| if x < w / 2 { 0 } else { 255 }))
            .collect();
        let frame = gray(w, h, data);
        let edges = backend.edge_detect(&frame, 50.0, 100.0, 3, true).unwrap();
        assert_eq!(edges.shape(), (w, h, 1));
        assert!(edges.pixels().iter().any(|&p| p > 0));
        let flat = backend
            .edge_detect(&Frame::filled(w, h, 1, 90), 50.0, 100.0, 3, true)
            .unwrap();
        assert!(flat.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn auto_thresholds_bracket_the_center() {
        assert_eq!(auto_thresholds(100.0, 0.5), (50.0, 150.0));
        assert_eq!(auto_thresholds(200.0, 0.5), (100.0, 255.0));
        assert_eq!(auto_thresholds(0.0, 0.05), (0.0, 0.0));
    }

    #[test]
    fn threshold_is_binary() {
        let mut backend = CpuBackend::new();
        let frame = gray(4, 1, vec![10, 100, 101, 250]);
        let out = backend.threshold(&frame, 100.0, 200.0).unwrap();
        assert_eq!(out.pixels(), &[0, 0, 200, 200]);
    }

    #[test]
    fn median_is_mean_intensity() {
        let mut backend = CpuBackend::new();
        let frame = gray(4, 1, vec![0, 10, 20, 30]);
        assert_eq!(backend.median(&frame).unwrap(), 15.0);
    }

    #[test]
    fn difference_and_difference_reduce_disagree() {
        let mut backend = CpuBackend::new();
        let frames = vec![
            gray(2, 1, vec![0, 40]),
            gray(2, 1, vec![100, 40]),
            gray(2, 1, vec![100, 90]),
        ];
        let summed = backend.difference(&frames).unwrap();
        let folded = backend.difference_reduce(&frames).unwrap();
        assert_eq!(summed.pixels(), &[100, 50]);
        assert_eq!(folded.pixels(), &[0, 90]);
        assert_ne!(summed, folded);
    }

    #[test]
    fn difference_rejects_empty_and_mixed_shapes() {
        let mut backend = CpuBackend::new();
        let err = backend.difference(&[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::EmptySequence { .. })
        ));
        let frames = vec![Frame::filled(2, 2, 1, 0), Frame::filled(3, 2, 1, 0)];
        let err = backend.difference_reduce(&frames).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn vibration_colors_dense_pixels_and_drops_isolated_ones() {
        let mut backend = CpuBackend::new();
        let (w, h) = (9u32, 9u32);
        let mut data = vec![0u8; 81];
        // 3x3 lit block in the top-left corner, one isolated pixel bottom-right.
        for y in 0..3 {
            for x in 0..3 {
                data[y * 9 + x] = 255;
            }
        }
        data[8 * 9 + 8] = 255;
        let frame = gray(w, h, data);
        let bounds = ColorBounds::new(8, 9, 10, 11);
        let out = backend.vibration(&frame, bounds, 8, 2).unwrap();
        assert_eq!(out.shape(), (w, h, 4));

        let px = |x: usize, y: usize| &out.pixels()[(y * 9 + x) * 4..(y * 9 + x) * 4 + 4];
        // Every pixel of the block sees the other 8 inside a 5x5 window.
        assert_eq!(px(1, 1), &VIBRATION_PALETTE[0]);
        assert_eq!(px(0, 0), &VIBRATION_PALETTE[0]);
        assert_eq!(px(8, 8), &[0, 0, 0, 0]);
        assert_eq!(px(5, 5), &[0, 0, 0, 0]);
    }

    #[test]
    fn vibration_rejects_zero_window() {
        let mut backend = CpuBackend::new();
        let err = backend
            .vibration(&Frame::filled(4, 4, 1, 1), ColorBounds::default(), 8, 0)
            .unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
    }
}
