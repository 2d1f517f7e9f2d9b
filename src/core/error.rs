//! Error types for regionflow.
//!
//! Uses thiserror for structured errors with context. Errors are split by the
//! phase that raises them:
//! - Graph construction (`GraphError`)
//! - Region planning (`RegionError`)
//! - Pixel trait operations (`PixelError`)
//! - Node execution (`ExecutionError`)
//! - Pre-update validation (`ValidationError`)

use crate::core::region::ImageRegion;
use crate::core::types::PortType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a connection in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Any error an update or a graph edit can return.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Pixel error: {0}")]
    Pixel(#[from] PixelError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image file error: {0}")]
    ImageFile(#[from] image::ImageError),
}

/// Errors related to graph structure and wiring.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("Port '{port}' not found on node {node_id}")]
    PortNotFound { node_id: NodeId, port: String },

    #[error("Pipeline cycle detected involving nodes: {nodes:?}")]
    PipelineCycle { nodes: Vec<NodeId> },

    #[error("Cannot connect {from_type} to {to_type}")]
    TypeMismatch { from_type: PortType, to_type: PortType },

    #[error("Port '{port}' on node {node_id} is already connected")]
    PortAlreadyConnected { node_id: NodeId, port: String },

    #[error("Node {node_id} has no parameter '{parameter}'")]
    UnknownParameter { node_id: NodeId, parameter: String },

    #[error("Node {0} is not an image source")]
    NotASource(NodeId),
}

/// Errors from region arithmetic and requested-region planning.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionError {
    #[error("Requested region {requested} lies outside the largest possible region {largest}")]
    InvalidRequestedRegion {
        requested: ImageRegion,
        largest: ImageRegion,
    },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index {index:?} is outside region {region}")]
    IndexOutOfBounds { index: Vec<i64>, region: ImageRegion },
}

/// Errors from pixel trait operations.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PixelError {
    #[error("Cannot set the length of a fixed-size pixel to {got}; its length is always {expected}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("Expected a {expected} pixel, found {found}")]
    KindMismatch { expected: String, found: String },
}

/// Errors from the validation phase.
///
/// Validation errors are caught before the propagation passes begin, so no
/// buffer is touched when they fire.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Missing required input '{port}' on node {node_id}")]
    MissingRequiredInput { node_id: NodeId, port: String },

    #[error("Constraint violation on node {node_id}, parameter '{parameter}': {error}")]
    ConstraintViolation {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("Pipeline cycle detected")]
    CycleDetected,

    #[error("{0}")]
    Other(String),
}

/// Errors raised by filter hooks and node execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Node {node_id} execution failed: {error}")]
    NodeExecution { node_id: NodeId, error: String },

    #[error("Missing input '{port}' for node {node_id}")]
    MissingInput { node_id: NodeId, port: String },

    #[error("Missing parameter '{parameter}' for node {node_id}")]
    MissingParameter { node_id: NodeId, parameter: String },

    #[error("Invalid parameter '{parameter}' for node {node_id}: {error}")]
    InvalidParameter {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("Output '{port}' was not set by node {node_id}")]
    OutputNotSet { node_id: NodeId, port: String },

    #[error("Downcast to {expected} failed: data object is {found}")]
    DowncastFailure { expected: String, found: String },

    #[error("Cannot allocate {bytes} bytes (limit {limit} bytes)")]
    AllocationFailure { bytes: usize, limit: usize },

    #[error("Output '{port}' of node {node_id} buffers {buffered}, which does not cover the requested {requested}")]
    OutputRegionMismatch {
        node_id: NodeId,
        port: String,
        buffered: ImageRegion,
        requested: ImageRegion,
    },

    #[error("Node {node_id} aborted; its output is invalid")]
    Aborted { node_id: NodeId },

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Pixel(#[from] PixelError),

    #[error("Internal pipeline failed: {0}")]
    Pipeline(Box<FlowError>),
}

impl ValidationError {
    /// A cycle makes every later check meaningless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationError::CycleDetected)
    }
}

impl ExecutionError {
    /// The node that raised this error, if known.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ExecutionError::NodeExecution { node_id, .. }
            | ExecutionError::MissingInput { node_id, .. }
            | ExecutionError::MissingParameter { node_id, .. }
            | ExecutionError::InvalidParameter { node_id, .. }
            | ExecutionError::OutputNotSet { node_id, .. }
            | ExecutionError::OutputRegionMismatch { node_id, .. }
            | ExecutionError::Aborted { node_id } => Some(*node_id),
            _ => None,
        }
    }
}

impl From<FlowError> for ExecutionError {
    fn from(error: FlowError) -> Self {
        match error {
            FlowError::Execution(inner) => inner,
            FlowError::Region(inner) => ExecutionError::Region(inner),
            FlowError::Pixel(inner) => ExecutionError::Pixel(inner),
            other => ExecutionError::Pipeline(Box::new(other)),
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
pub type GraphResult<T> = Result<T, GraphError>;
/// Result of a filter hook.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Outcome of validating the nodes of one update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub duration_ms: u64,
}

/// Something suspicious that does not prevent an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub message: String,
    pub node_id: Option<NodeId>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The warnings, or the first error.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ValidationError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}
