//! Frame timing.
//!
//! The frame driver ticks one `FrameClock` per rendered frame and hands the
//! resulting `FrameTime` to `FrameCallbacks::on_frame_move`.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
