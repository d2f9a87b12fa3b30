//! Color model for clears.

pub mod color;

pub use color::Color;
