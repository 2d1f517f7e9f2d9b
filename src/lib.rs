//! # Regionflow - Demand-driven image pipelines
//!
//! Regionflow connects image filters into a pipeline graph and brings a
//! node's outputs up to date on request. An update only recomputes stale
//! nodes, and only the part of each image that downstream consumers ask for.
//!
//! ## Features
//!
//! - **Region streaming**: every image carries a largest possible, a buffered
//!   and a requested region; filters compute only what is requested
//! - **Two-pass updates**: output information flows downstream, requested
//!   regions flow upstream, then stale nodes execute in order
//! - **Multi-threaded filters**: output buffers are split into disjoint work
//!   units that run on rayon's pool
//! - **Numeric traits**: one static trait for every scalar pixel type and for
//!   structured pixels, mirrored by a runtime registry
//! - **Composite filters**: internal pipelines whose progress folds into the
//!   composite's own
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use regionflow::prelude::*;
//! use std::sync::Arc;
//!
//! let mut graph = PipelineGraph::new();
//!
//! let reader = graph.add(ImageFileReader::<u8>::new());
//! graph.set_parameter(reader, "path", "cells.png")?;
//!
//! let opening = graph.add(BinaryShapeOpening::<u8>::new());
//! graph.set_parameter(opening, "lambda", 50.0)?;
//! graph.connect(reader, "output", opening, "input")?;
//!
//! let writer = graph.add(ImageFileWriter::<u8>::new());
//! graph.set_parameter(writer, "path", "opened.png")?;
//! graph.connect(opening, "output", writer, "input")?;
//!
//! let report = graph.update(writer)?;
//! println!("{} executed, {} skipped", report.executed.len(), report.skipped.len());
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, pixels, numeric traits, images, the filter trait
//! - [`graph`]: pipeline graph structure and topology
//! - [`validation`]: checks run before an update
//! - [`execution`]: the update engine and progress reporting
//! - [`filters`]: sources, readers, writers and the label-map filters

#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;
pub mod validation;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use regionflow::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::image::{DataHandle, DataKind, DataObject, Image, ImageInfo};
    pub use crate::core::numeric::{
        trait_record, NumericTraits, PixelKind, PixelValue, ScalarKind, ScalarPixel, ScalarValue,
        TraitRecord,
    };
    pub use crate::core::pixel::{Rgb, Rgba};
    pub use crate::core::region::{resolve_requested_region, ImageRegion};
    pub use crate::core::time::TimeStamp;
    pub use crate::core::types::{PortType, Value};

    // Node traits and types
    pub use crate::core::context::{
        ExecutionContext, InformationContext, ParameterAccess, RegionContext,
    };
    pub use crate::core::node::{Category, FilterNode, NodeMetadata};
    pub use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};

    // Errors
    pub use crate::core::error::{
        ExecutionError, ExecutionResult, FlowError, FlowResult, GraphError, NodeId, PixelError,
        RegionError, ValidationError,
    };

    // Graph
    pub use crate::graph::{Connection, Endpoint, PipelineGraph, PipelineNode, TopologyAnalyzer};

    // Validation
    pub use crate::validation::ValidationPipeline;

    // Execution
    pub use crate::execution::{
        channel_observer, ExecutionEngine, ExecutionOptions, ExecutionStats, ProgressAccumulator,
        ProgressCallback, ProgressUpdate, StaleReason, UpdateReport,
    };

    // Filters
    pub use crate::filters::labelmap::{LabelObject, Run, ShapeAttributes};
    pub use crate::filters::{
        BinaryImageToLabelMap, BinaryShapeOpening, FilePixel, ImageFileReader, ImageFileWriter,
        ImageSource, LabelMap, LabelMapToBinary, ShapeAttribute, ShapeLabelMapValuator,
        ShapeOpeningLabelMap, ShiftScale, Shrink,
    };
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "regionflow");
    }

    #[test]
    fn test_basic_pipeline() {
        let mut graph = PipelineGraph::new();
        let shift = graph.add(ShiftScale::<u8>::new());
        let shrink = graph.add(Shrink::<u8>::new());
        graph
            .set_input(shift, "input", Arc::new(Image::filled(&[4, 4], 1u8)))
            .unwrap();
        graph.connect(shift, "output", shrink, "input").unwrap();
        graph.set_parameter(shift, "shift", 4.0).unwrap();

        let report = graph.update(shrink).unwrap();
        assert_eq!(report.executed.len(), 3);
        let out = graph.output_image::<u8>(shrink, "output").unwrap();
        assert_eq!(out.buffer(), &[5, 5, 5, 5]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = PipelineGraph::new();
        let a = graph.add(ShiftScale::<u8>::new());
        let b = graph.add(ShiftScale::<u8>::new());
        graph.connect(a, "output", b, "input").unwrap();
        assert!(matches!(
            graph.connect(b, "output", a, "input"),
            Err(GraphError::PipelineCycle { .. })
        ));
    }
}
