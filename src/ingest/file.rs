//! Local frame source.
//!
//! `FileSource` picks a backend from the path:
//! - `stub://name?frames=N&width=W&height=H&channels=C`: synthetic moving pattern
//! - an existing directory: still images in file-name order
//! - anything else: a video file decoded with FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Remote URLs are rejected; this source only reads local data.

use anyhow::{anyhow, Result};

use super::dir::ImageDirSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";

/// Local frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Directory(ImageDirSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FrameSource for FileSource {
    fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): {}",
                path
            ));
        }
        let backend = if path.starts_with(STUB_SCHEME) {
            FileBackend::Synthetic(SyntheticFileSource::new(SyntheticConfig::parse(path)?))
        } else if std::path::Path::new(path).is_dir() {
            FileBackend::Directory(ImageDirSource::open(path)?)
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegFileSource::new(path)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "video file ingestion requires the ingest-file-ffmpeg feature: {}",
                    path
                ));
            }
        };
        Ok(Self { backend })
    }

    fn is_open(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_open(),
            FileBackend::Directory(source) => source.is_open(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_open(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.read(),
            FileBackend::Directory(source) => source.read(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.release(),
            FileBackend::Directory(source) => source.release(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.release(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Directory(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SyntheticConfig {
    pub path: String,
    /// Stream length; `None` streams until released.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl SyntheticConfig {
    pub(crate) fn parse(path: &str) -> Result<Self> {
        let mut cfg = Self {
            path: path.to_string(),
            frames: None,
            width: 640,
            height: 360,
            channels: 3,
        };
        let rest = path.strip_prefix(STUB_SCHEME).unwrap_or(path);
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(cfg);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}' in {}", pair, path))?;
            let bad = |_| anyhow!("invalid value for '{}' in {}", key, path);
            match key {
                "frames" => cfg.frames = Some(value.parse().map_err(bad)?),
                "width" => cfg.width = value.parse().map_err(bad)?,
                "height" => cfg.height = value.parse().map_err(bad)?,
                "channels" => cfg.channels = value.parse().map_err(bad)?,
                other => return Err(anyhow!("unknown stub parameter '{}' in {}", other, path)),
            }
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero: {}", path));
        }
        if !matches!(cfg.channels, 1 | 3 | 4) {
            return Err(anyhow!("stub channels must be 1, 3 or 4: {}", path));
        }
        Ok(cfg)
    }
}

struct SyntheticFileSource {
    config: SyntheticConfig,
    frame_count: u64,
    open: bool,
}

impl SyntheticFileSource {
    fn new(config: SyntheticConfig) -> Self {
        log::info!("FileSource: opened {} (synthetic)", config.path);
        Self {
            config,
            frame_count: 0,
            open: true,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("read from released source {}", self.config.path));
        }
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let pixels = self.generate_synthetic_pixels();
        self.frame_count += 1;
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.config.channels,
        )?))
    }

    /// Horizontal gradient with a bright square that moves each frame.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let w = self.config.width as u64;
        let h = self.config.height as u64;
        let channels = self.config.channels as usize;
        let side = (w.min(h) / 4).max(1);
        let step = 8 * self.frame_count;
        let left = step % w;
        let top = (step / 2) % h;

        let mut pixels = vec![0u8; (w * h) as usize * channels];
        for y in 0..h {
            for x in 0..w {
                let inside = x >= left && x < left + side && y >= top && y < top + side;
                let value = if inside { 250 } else { (x * 96 / w) as u8 };
                let offset = ((y * w + x) as usize) * channels;
                pixels[offset..offset + channels].fill(value);
            }
        }
        pixels
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_parameters_are_parsed() {
        let cfg =
            SyntheticConfig::parse("stub://bench?frames=19&width=64&height=36&channels=1").unwrap();
        assert_eq!(cfg.frames, Some(19));
        assert_eq!((cfg.width, cfg.height, cfg.channels), (64, 36, 1));

        let defaults = SyntheticConfig::parse("stub://synthetic").unwrap();
        assert_eq!(defaults.frames, None);
        assert_eq!((defaults.width, defaults.height, defaults.channels), (640, 360, 3));
    }

    #[test]
    fn stub_rejects_bad_parameters() {
        assert!(SyntheticConfig::parse("stub://x?frames=many").is_err());
        assert!(SyntheticConfig::parse("stub://x?channels=2").is_err());
        assert!(SyntheticConfig::parse("stub://x?depth=8").is_err());
        assert!(SyntheticConfig::parse("stub://x?width=0").is_err());
    }

    #[test]
    fn remote_urls_are_rejected() {
        assert!(FileSource::open("rtsp://camera/stream").is_err());
        assert!(FileSource::open("  ").is_err());
    }

    #[test]
    fn synthetic_stream_ends_after_frame_limit() {
        let mut source = FileSource::open("stub://short?frames=3&width=16&height=8").unwrap();
        assert!(source.is_open());
        for _ in 0..3 {
            let frame = source.read().unwrap().expect("frame");
            assert_eq!(frame.shape(), (16, 8, 3));
        }
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 3);
        source.release();
        source.release();
        assert!(!source.is_open());
    }

    #[test]
    fn synthetic_frames_change_over_time() {
        let mut source = FileSource::open("stub://motion?width=32&height=32&channels=1").unwrap();
        let first = source.read().unwrap().unwrap();
        let second = source.read().unwrap().unwrap();
        assert_ne!(first, second);
    }
}
