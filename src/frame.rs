//! Frames, colour bounds and the sliding window.
//!
//! - `Frame`: opaque 8-bit pixel buffer with a fixed shape.
//! - `ColorBounds`: four per-channel thresholds used by vibration classification.
//! - `FrameBuffer`: bounded FIFO window of processed frames.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, ProcessError};

/// Default window capacity.
pub const DEFAULT_WINDOW_FRAMES: usize = 10;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Row-major, channel-interleaved 8-bit frame.
///
/// The sample count always equals `width * height * channels`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, ProcessError> {
        if channels == 0 {
            return Err(ProcessError::invalid_frame("channel count must be non-zero"));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(channels as usize))
            .ok_or_else(|| ProcessError::invalid_frame("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(ProcessError::invalid_frame(format!(
                "sample count mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let len = width as usize * height as usize * channels.max(1) as usize;
        Self {
            data: vec![value; len],
            width,
            height,
            channels: channels.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// `(width, height, channels)`.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Fails with `ChannelMismatch` unless the frame has `expected` channels.
    pub fn require_channels(&self, op: &'static str, expected: u8) -> Result<(), ProcessError> {
        if self.channels != expected {
            return Err(ProcessError::ChannelMismatch {
                op,
                expected,
                actual: self.channels,
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// ColorBounds
// ----------------------------------------------------------------------------

/// Per-channel thresholds for colouring vibrating pixels.
///
/// A pixel whose neighbour count is `n` takes the colour of the first channel
/// whose bound is `>= n`; counts above every bound take channel 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBounds {
    ch1: i32,
    ch2: i32,
    ch3: i32,
    ch4: i32,
}

impl ColorBounds {
    pub const fn new(ch1: i32, ch2: i32, ch3: i32, ch4: i32) -> Self {
        Self { ch1, ch2, ch3, ch4 }
    }

    pub fn ch1(&self) -> i32 {
        self.ch1
    }

    pub fn ch2(&self) -> i32 {
        self.ch2
    }

    pub fn ch3(&self) -> i32 {
        self.ch3
    }

    pub fn ch4(&self) -> i32 {
        self.ch4
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.ch1, self.ch2, self.ch3, self.ch4]
    }

    /// Zero-based channel index for a neighbour count.
    pub fn channel_for(&self, count: i32) -> usize {
        self.as_array()
            .iter()
            .position(|&bound| bound >= count)
            .unwrap_or(3)
    }
}

impl Default for ColorBounds {
    fn default() -> Self {
        Self::new(8, 9, 10, 11)
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer: sliding window
// ----------------------------------------------------------------------------

/// Bounded, ordered window with FIFO eviction.
///
/// Holds at most `capacity` items, oldest first. Appending to a full window
/// evicts from the front; it never fails. Only single-item append is
/// supported, and the window exposes no other insertion or reordering:
///
/// ```compile_fail
/// let mut window = vibration_kernel::FrameBuffer::new(3).unwrap();
/// window.insert(0, 1u8);
/// ```
///
/// ```compile_fail
/// let mut window = vibration_kernel::FrameBuffer::new(3).unwrap();
/// window.append(1u8);
/// window.retain(|v| *v > 0);
/// ```
#[derive(Clone, Debug)]
pub struct FrameBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> FrameBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Push `item` as the newest element, evicting the oldest as needed.
    pub fn append(&mut self, item: T) {
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn get(&self, index: usize) -> Result<&T, BufferError> {
        self.items.get(index).ok_or(BufferError::OutOfRange {
            index,
            len: self.items.len(),
        })
    }

    /// Most recently appended element.
    pub fn get_last(&self) -> Result<&T, BufferError> {
        self.items.back().ok_or(BufferError::OutOfRange {
            index: 0,
            len: 0,
        })
    }

    /// Remove the oldest element. `None` on an empty window is not an error.
    pub fn pop_first(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn pop_last(&mut self) -> Result<T, BufferError> {
        self.items.pop_back().ok_or(BufferError::OutOfRange {
            index: 0,
            len: 0,
        })
    }

    /// Remove the second-newest element.
    pub fn pop_pre_last(&mut self) -> Result<T, BufferError> {
        let len = self.items.len();
        if len < 2 {
            return Err(BufferError::OutOfRange {
                index: len.saturating_sub(2),
                len,
            });
        }
        self.items.remove(len - 2).ok_or(BufferError::OutOfRange {
            index: len - 2,
            len,
        })
    }

    /// Read-only iteration, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    /// Change capacity. Discards everything currently held.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        self.items.clear();
        self.items.reserve(capacity);
        self.capacity = capacity;
        Ok(())
    }
}

impl<T: Clone> FrameBuffer<T> {
    /// Independent copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
