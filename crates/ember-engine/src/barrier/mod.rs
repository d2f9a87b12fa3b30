//! Resource usage-state tracking and transition barriers.

mod tracker;

pub use tracker::{BarrierError, BarrierTracker};
