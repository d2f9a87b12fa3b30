//! Ember engine crate.
//!
//! A minimal explicit-API rendering harness: device creation with driver
//! fallback, a swap chain with per-buffer render-target views, one command
//! list, one fence, and a frame driver that clears, transitions, presents and
//! waits every tick.

pub mod barrier;
pub mod command;
pub mod core;
pub mod device;
pub mod hal;
pub mod surface;
pub mod sync;
pub mod time;
pub mod window;

pub mod coords;
pub mod logging;
pub mod paint;

pub use crate::core::{FrameCallbacks, FrameDriver, FrameEvents, FrameOutcome, FrameRecorder};
pub use crate::device::{RenderConfig, RenderError};
