use thiserror::Error;

use crate::barrier::BarrierError;
use crate::command::CommandError;
use crate::hal::{BackendError, DriverType};

/// Coarse failure class, used to pick a recovery policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Startup cannot continue; no retry.
    Creation,
    /// The surface keeps its last good size and rendering pauses.
    Resize,
    /// Steady-state recording/submission failed; unrecoverable.
    Frame,
}

/// One rejected option of the driver fallback list.
#[derive(Debug)]
pub struct DriverAttempt {
    pub driver: DriverType,
    pub error: BackendError,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid render configuration: {0}")]
    Config(String),

    #[error("no device could be created ({} driver option(s) tried)", .attempts.len())]
    NoDevice { attempts: Vec<DriverAttempt> },

    #[error("failed to create {what}")]
    Creation {
        what: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("frame callbacks failed to initialize")]
    Callbacks(#[source] anyhow::Error),

    #[error("resize to {width}x{height} failed")]
    Resize {
        width: u32,
        height: u32,
        #[source]
        source: BackendError,
    },

    #[error("{stage} failed")]
    Frame {
        stage: &'static str,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error("renderer is shut down")]
    ShutDown,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Config(_)
            | RenderError::NoDevice { .. }
            | RenderError::Creation { .. }
            | RenderError::Callbacks(_) => ErrorKind::Creation,
            RenderError::Resize { .. } => ErrorKind::Resize,
            RenderError::Frame { .. }
            | RenderError::Command(_)
            | RenderError::Barrier(_)
            | RenderError::ShutDown => ErrorKind::Frame,
        }
    }

    pub(crate) fn creation(what: &'static str) -> impl FnOnce(BackendError) -> RenderError {
        move |source| RenderError::Creation { what, source }
    }

    pub(crate) fn frame(stage: &'static str) -> impl FnOnce(BackendError) -> RenderError {
        move |source| RenderError::Frame { stage, source }
    }
}
