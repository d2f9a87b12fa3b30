//! Core engine-facing contracts.
//!
//! This module defines the interface between the window runtime and the
//! application: the frame driver that runs the per-tick GPU cycle, and the
//! callbacks the application implements to take part in it.

mod callbacks;
mod driver;

pub use callbacks::{FrameCallbacks, FrameRecorder};
pub use driver::{FrameDriver, FrameEvents, FrameOutcome, FrameState};
