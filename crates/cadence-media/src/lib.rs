//! # cadence-media
//!
//! Audio toolchain used by the processing pipeline. Every operation runs an
//! external program (`ffprobe`, `ffmpeg`, or the Python analyzer script) as a
//! child process bounded by a deadline, then parses what it printed.

pub mod error;
pub mod executor;
pub mod parse;
pub mod toolkit;

pub use error::ToolError;
pub use executor::{ToolCommand, ToolOutput};
pub use toolkit::FfmpegToolkit;
