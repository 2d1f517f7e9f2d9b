//! Pipeline graphs.
//!
//! A pipeline graph is a directed acyclic graph where nodes are filters and
//! edges carry data objects from an output port to an input port.

pub mod connection;
pub mod structure;
pub mod topology;

pub use connection::{Connection, Endpoint};
pub use structure::{PipelineGraph, PipelineNode};
pub use topology::TopologyAnalyzer;
