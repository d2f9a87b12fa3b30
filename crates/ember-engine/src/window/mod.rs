//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and forwards resize and redraw
//! events to the frame driver.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
