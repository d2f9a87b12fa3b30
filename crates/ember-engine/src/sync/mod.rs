//! CPU/GPU frame synchronization.

mod fence;

pub use fence::FrameSynchronizer;
