//! Image-processing collaborators.
//!
//! The pipeline consumes pixel operations only through `ImageBackend`.
//! `CpuBackend` is the in-process implementation.

mod backend;
mod cpu;

pub use backend::ImageBackend;
pub use cpu::{CpuBackend, VIBRATION_PALETTE};
