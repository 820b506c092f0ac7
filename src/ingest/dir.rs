use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::error::ProcessError;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Still images from a directory, decoded to RGB in natural file-name order
/// (`frame_2.png` before `frame_10.png`).
///
/// A file that fails to decode is reported as a `ProcessError`, so the
/// capture loop skips it and moves on to the next one.
pub struct ImageDirSource {
    path: String,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    open: bool,
}

impl ImageDirSource {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn open(path: &str) -> Result<Self> {
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("failed to open frame directory {}", path))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", path))?;
            let file = entry.path();
            if file.is_file() && has_image_extension(&file) {
                files.push(file);
            }
        }
        files.sort_by_key(|file| natural_key(file));
        log::info!("ImageDirSource: opened {} ({} images)", path, files.len());
        Ok(Self {
            path: path.to_string(),
            files,
            cursor: 0,
            frame_count: 0,
            open: true,
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("read from released source {}", self.path));
        }
        let Some(file) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let decoded = image::open(file).map_err(|e| {
            ProcessError::decode(format!("{}: {}", file.display(), e))
        })?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        self.frame_count += 1;
        Ok(Some(Frame::new(rgb.into_raw(), width, height, 3)?))
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.path.clone(),
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sort key: name with its last digit run compared numerically.
fn natural_key(path: &Path) -> (String, u64, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(stem.len());
    let number = stem[digits_start..].parse().unwrap_or(0);
    (stem[..digits_start].to_string(), number, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn natural_order_compares_trailing_numbers() {
        let mut names = vec!["frame_10.png", "frame_2.png", "frame_1.png", "alpha.png"];
        names.sort_by_key(|n| natural_key(Path::new(n)));
        assert_eq!(
            names,
            vec!["alpha.png", "frame_1.png", "frame_2.png", "frame_10.png"]
        );
    }

    #[test]
    fn reads_images_in_order_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for (index, shade) in [(2u8, 20u8), (10, 100), (1, 10)] {
            let img = RgbImage::from_pixel(6, 4, Rgb([shade, shade, shade]));
            img.save(dir.path().join(format!("frame_{index}.png"))).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"not a frame").unwrap();

        let mut source = ImageDirSource::open(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(source.len(), 3);
        let shades: Vec<u8> = std::iter::from_fn(|| source.read().unwrap())
            .map(|frame| {
                assert_eq!(frame.shape(), (6, 4, 3));
                frame.pixels()[0]
            })
            .collect();
        assert_eq!(shades, vec![10, 20, 100]);
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn undecodable_image_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"definitely not png").unwrap();
        let mut source = ImageDirSource::open(dir.path().to_str().unwrap()).unwrap();
        let err = source.read().unwrap_err();
        assert!(err.downcast_ref::<ProcessError>().is_some());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        assert!(ImageDirSource::open("/nonexistent/vibration/frames").is_err());
    }
}
