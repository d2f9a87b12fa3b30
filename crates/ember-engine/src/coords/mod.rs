//! Geometry types shared by the frame driver and the backends.
//!
//! All extents are physical pixels with a top-left origin.

mod viewport;

pub use viewport::Viewport;
