//! Device creation and renderer configuration.
//!
//! This module is responsible for:
//! - creating the logical device with a hardware-first fallback policy
//! - creating the command queue the swap chain binds to
//! - the renderer configuration and the error taxonomy

mod config;
mod context;
mod error;

pub use config::RenderConfig;
pub use context::DeviceContext;
pub use error::{DriverAttempt, ErrorKind, RenderError};
