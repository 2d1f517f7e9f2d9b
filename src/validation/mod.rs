//! Checks run before an update touches any buffer.

pub mod pipeline;
pub mod stages;

pub use pipeline::ValidationPipeline;
pub use stages::{ConstraintValidation, StructuralValidation, ValidationStage};
