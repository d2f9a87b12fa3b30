//! Command recording and submission.

mod pipeline;

pub use pipeline::{CommandError, CommandPipeline};
