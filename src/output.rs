//! Output sinks for classified frames.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage, RgbaImage};

use crate::frame::Frame;

/// Receives labelled frames from the capture loop.
pub trait OutputSink {
    fn emit(&mut self, label: &str, frame: &Frame) -> Result<()>;
}

impl<O: OutputSink + ?Sized> OutputSink for Box<O> {
    fn emit(&mut self, label: &str, frame: &Frame) -> Result<()> {
        (**self).emit(label, frame)
    }
}

/// Logs a one-line summary per frame.
#[derive(Debug, Default)]
pub struct LogSink {
    emitted: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl OutputSink for LogSink {
    fn emit(&mut self, label: &str, frame: &Frame) -> Result<()> {
        self.emitted += 1;
        let (width, height, channels) = frame.shape();
        log::info!(
            "{} #{}: {}x{}x{} lit={}",
            label,
            self.emitted,
            width,
            height,
            channels,
            lit_pixels(frame)
        );
        Ok(())
    }
}

/// Writes each frame as `<label>_<seq>.png` under a directory.
#[derive(Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
    written: u64,
}

impl ImageDirSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for ImageDirSink {
    fn emit(&mut self, label: &str, frame: &Frame) -> Result<()> {
        let path = self.dir.join(format!("{}_{:06}.png", label, self.written));
        save_png(frame, &path)?;
        self.written += 1;
        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Encode a 1-, 3- or 4-channel frame as PNG.
pub fn save_png(frame: &Frame, path: &Path) -> Result<()> {
    let (width, height, channels) = frame.shape();
    let data = frame.pixels().to_vec();
    let too_small = || anyhow!("frame buffer too small for {}x{}x{}", width, height, channels);
    let saved = match channels {
        1 => GrayImage::from_raw(width, height, data)
            .ok_or_else(too_small)?
            .save(path),
        3 => RgbImage::from_raw(width, height, data)
            .ok_or_else(too_small)?
            .save(path),
        4 => RgbaImage::from_raw(width, height, data)
            .ok_or_else(too_small)?
            .save(path),
        other => return Err(anyhow!("cannot encode {}-channel frame as PNG", other)),
    };
    saved.with_context(|| format!("failed to write {}", path.display()))
}

/// Pixels with any non-zero sample.
pub fn lit_pixels(frame: &Frame) -> usize {
    frame
        .pixels()
        .chunks(frame.channels() as usize)
        .filter(|px| px.iter().any(|&s| s != 0))
        .count()
}
