use thiserror::Error;

use super::{DriverType, ResourceId, ResourceState};

/// Driver-level failure reported by a [`Backend`](super::Backend).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{driver} driver unavailable: {reason}")]
    DriverUnavailable { driver: DriverType, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown or destroyed {kind} handle {raw}")]
    InvalidHandle { kind: &'static str, raw: u64 },

    #[error("invalid call: {0}")]
    InvalidState(String),

    #[error("{outstanding} back buffer reference(s) still held")]
    ResourcesInUse { outstanding: usize },

    #[error("command allocator still referenced by {in_flight} executing list(s)")]
    AllocatorInUse { in_flight: usize },

    #[error("barrier on {resource} claims {claimed} but resource is {actual}")]
    BarrierMismatch {
        resource: ResourceId,
        claimed: ResourceState,
        actual: ResourceState,
    },

    #[error("surface error: {0}")]
    Surface(String),

    /// Transient: no image could be acquired this tick.
    #[error("no presentable image available: {0}")]
    FrameUnavailable(String),

    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("out of memory")]
    OutOfMemory,
}

impl BackendError {
    pub(crate) fn handle(kind: &'static str, raw: u64) -> Self {
        BackendError::InvalidHandle { kind, raw }
    }

    /// Returns `true` for failures that only affect the current tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::FrameUnavailable(_))
    }
}
