//! Pipeline updates.
//!
//! [`ExecutionEngine`] runs the two passes of an update (information, then
//! requested regions) and executes every stale node upstream of the target.

pub mod engine;
pub mod progress;

pub use engine::{ExecutionEngine, ExecutionOptions, ExecutionStats, StaleReason, UpdateReport};
pub use progress::{
    channel_observer, ProgressAccumulator, ProgressCallback, ProgressReporter, ProgressTracker,
    ProgressUpdate,
};
