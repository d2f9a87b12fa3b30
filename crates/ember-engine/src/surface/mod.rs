//! Swap chain and back-buffer views.
//!
//! This module is responsible for:
//! - creating the swap chain bound to the command queue
//! - building render-target (and optional depth-stencil) views
//! - recreating both in a fixed order on resize

mod descriptor;
mod presentation;

pub use presentation::{BackBuffer, PresentationSurface};
