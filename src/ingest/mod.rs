//! Frame sources.
//!
//! This module provides the sources the capture loop reads from:
//! - Synthetic `stub://` streams (testing, demos)
//! - Directories of still images, read in file-name order
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source follows the same lifecycle: `open` succeeds or fails with an
//! I/O condition, `read` yields frames until it reports stream end with
//! `Ok(None)`, and `release` frees the underlying handle. `release` is
//! idempotent. `SourceGuard` makes sure it runs exactly once per open,
//! whichever way the capture loop exits.

mod dir;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;

pub use dir::ImageDirSource;
pub use file::FileSource;

/// A video stream the capture loop can pull frames from.
pub trait FrameSource {
    /// Open the resource at `path`.
    fn open(path: &str) -> Result<Self>
    where
        Self: Sized;

    fn is_open(&self) -> bool;

    /// Next frame, or `Ok(None)` once the stream has ended.
    ///
    /// A `ProcessError` in the returned error means only this frame is lost;
    /// any other error means the source is unusable.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Free the underlying handle. Safe to call more than once.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub path: String,
}

/// Scoped ownership of an open source.
///
/// Releases the source on the first call to `release` or on drop, never twice.
pub struct SourceGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> SourceGuard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the source. Returns `true` if this call did the release.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.source.release();
        self.released = true;
        let stats = self.source.stats();
        log::info!(
            "source released: {} ({} frames captured)",
            stats.path,
            stats.frames_captured
        );
        true
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}
