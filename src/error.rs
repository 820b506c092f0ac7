//! Typed failure conditions.
//!
//! Everything crosses module boundaries as `anyhow::Error`. The two enums here
//! are the conditions the capture loop has to tell apart:
//!
//! - `BufferError`: window contract violations. Programming errors, always surfaced.
//! - `ProcessError`: an image operation or source rejected one frame. The loop
//!   drops the frame and keeps going.
//!
//! Anything else reaching the loop is fatal.

/// Window (frame buffer) contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("index {index} out of range for buffer of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// A collaborator rejected its input for this frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("{op}: expected {expected}-channel frame, got {actual} channels")]
    ChannelMismatch {
        op: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("{op}: frame shape {actual:?} does not match {expected:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: (u32, u32, u8),
        actual: (u32, u32, u8),
    },

    #[error("{op}: frame sequence is empty")]
    EmptySequence { op: &'static str },

    #[error("{op}: {message}")]
    InvalidParameter { op: &'static str, message: String },

    #[error("invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("failed to decode frame: {message}")]
    Decode { message: String },
}

impl ProcessError {
    pub fn invalid_parameter(op: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            op,
            message: message.into(),
        }
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// How the capture loop treats an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Drop the current frame, stay open.
    Recoverable,
    /// Close the source and stop.
    Fatal,
}

/// Classify an error by walking its source chain.
///
/// Context layers added with `anyhow::Context` do not hide a `ProcessError`.
pub fn classify(err: &anyhow::Error) -> Severity {
    if err.chain().any(|cause| cause.is::<ProcessError>()) {
        Severity::Recoverable
    } else {
        Severity::Fatal
    }
}
