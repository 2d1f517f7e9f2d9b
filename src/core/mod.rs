//! Core types and traits for the regionflow pipeline.
//!
//! This module contains the foundational pieces every filter builds on:
//! - Regions and the image data object
//! - Pixel kinds and the numeric trait registry
//! - Port definitions and parameter constraints
//! - The filter node trait and the contexts its hooks receive
//! - Error types

pub mod chunked;
pub mod context;
pub mod error;
pub mod image;
pub mod node;
pub mod numeric;
pub mod pixel;
pub mod port;
pub mod region;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use chunked::{MemoryBudget, WorkUnitSplitter, DEFAULT_MEMORY_LIMIT};
pub use context::{ExecutionContext, InformationContext, ParameterAccess, RegionContext};
pub use error::{
    ExecutionError, FlowError, GraphError, NodeId, PixelError, RegionError, ValidationError,
};
pub use image::{DataHandle, DataKind, DataObject, Image, ImageInfo};
pub use node::{Category, FilterNode, NodeMetadata};
pub use numeric::{NumericTraits, PixelKind, PixelValue, ScalarKind, ScalarPixel, TraitRecord};
pub use pixel::{Rgb, Rgba};
pub use port::{Constraint, ParameterDefinition, PortDefinition, PortDirection};
pub use region::ImageRegion;
pub use time::TimeStamp;
pub use types::{PortType, Value};
