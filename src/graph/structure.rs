//! Pipeline graph structure and node management.
//!
//! The PipelineGraph owns every node, its parameters and its cached output
//! data objects. Consumers never hold their producers' outputs between
//! updates: they receive shared handles for the duration of one execution.

use crate::core::error::{
    ConnectionId, ExecutionError, FlowError, FlowResult, GraphError, GraphResult, NodeId,
};
use crate::core::image::{downcast_ref, DataHandle, DataObject, Image, ImageInfo};
use crate::core::node::{FilterNode, NodeMetadata};
use crate::core::numeric::NumericTraits;
use crate::core::region::ImageRegion;
use crate::core::time::TimeStamp;
use crate::core::types::Value;
use crate::execution::engine::{ExecutionEngine, ExecutionOptions, UpdateReport};
use crate::execution::progress::ProgressCallback;
use crate::filters::source::ImageSource;
use crate::graph::connection::{Connection, Endpoint};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// A filter instance in the graph, with its pipeline bookkeeping.
#[derive(Clone)]
pub struct PipelineNode {
    pub id: NodeId,
    /// The filter implementation
    pub filter: Box<dyn FilterNode>,
    /// Metadata captured when the filter was added
    pub(crate) metadata: NodeMetadata,
    /// Current parameter values, defaults filled in
    pub(crate) parameters: HashMap<String, Value>,
    /// Optional display name override
    pub label: Option<String>,
    pub(crate) work_units: Option<usize>,
    pub(crate) observers: Vec<ProgressCallback>,
    /// Bumped on every parameter, wiring or work-unit change
    pub(crate) modified_time: TimeStamp,
    /// When the node last executed successfully
    pub(crate) last_update: Option<TimeStamp>,
    pub(crate) outputs: HashMap<String, DataHandle>,
    pub(crate) output_infos: HashMap<String, ImageInfo>,
    /// Caller's narrowed request, used when this node is the update target
    pub(crate) requested_override: Option<ImageRegion>,
}

impl std::fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineNode")
            .field("id", &self.id)
            .field("filter", &self.metadata.id)
            .field("parameters", &self.parameters)
            .field("label", &self.label)
            .field("modified_time", &self.modified_time)
            .field("last_update", &self.last_update)
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PipelineNode {
    pub fn new(filter: Box<dyn FilterNode>) -> Self {
        let metadata = filter.metadata();
        let parameters = metadata.default_parameters();
        Self {
            id: NodeId::new(),
            filter,
            metadata,
            parameters,
            label: None,
            work_units: None,
            observers: Vec::new(),
            modified_time: TimeStamp::now(),
            last_update: None,
            outputs: HashMap::new(),
            output_infos: HashMap::new(),
            requested_override: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label or filter name.
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.metadata.name.clone())
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }

    pub fn get_parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn work_units(&self) -> Option<usize> {
        self.work_units
    }

    pub fn modified_time(&self) -> TimeStamp {
        self.modified_time
    }

    pub fn last_update(&self) -> Option<TimeStamp> {
        self.last_update
    }

    /// Cached output data object on `port`, if the node has run.
    pub fn output(&self, port: &str) -> Option<&DataHandle> {
        self.outputs.get(port)
    }

    /// Output metadata from the last information pass.
    pub fn output_info(&self, port: &str) -> Option<&ImageInfo> {
        self.output_infos.get(port)
    }

    pub fn requested_region_override(&self) -> Option<&ImageRegion> {
        self.requested_override.as_ref()
    }

    /// Mark the node as changed so the next update re-executes it.
    pub fn touch(&mut self) {
        self.modified_time = TimeStamp::now();
    }

    /// Drop cached outputs and forget the last execution.
    pub(crate) fn invalidate(&mut self) {
        self.outputs.clear();
        self.last_update = None;
    }
}

/// The pipeline graph.
///
/// Uses IndexMap to maintain insertion order for consistent iteration.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: IndexMap<NodeId, PipelineNode>,
    connections: Vec<Connection>,
    /// Source nodes created by `set_input`, keyed by the input they feed
    input_sources: HashMap<Endpoint, NodeId>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a prepared node and return its ID.
    pub fn add_node(&mut self, node: PipelineNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a boxed filter and return the node ID.
    pub fn add_filter(&mut self, filter: Box<dyn FilterNode>) -> NodeId {
        self.add_node(PipelineNode::new(filter))
    }

    /// Add a filter by value.
    pub fn add<F: FilterNode + 'static>(&mut self, filter: F) -> NodeId {
        self.add_filter(Box::new(filter))
    }

    /// Add a source node publishing `data` unchanged.
    pub fn add_source(&mut self, data: DataHandle) -> NodeId {
        self.add(ImageSource::new(data))
    }

    /// Swap the data published by a source node and mark it modified.
    pub fn set_source_data(&mut self, source: NodeId, data: DataHandle) -> GraphResult<()> {
        let node = self.get_node_mut(source)?;
        if node.metadata.id != ImageSource::ID {
            return Err(GraphError::NotASource(source));
        }
        let filter = ImageSource::new(data);
        node.metadata = filter.metadata();
        node.filter = Box::new(filter);
        node.touch();
        Ok(())
    }

    /// Remove a node and every connection touching it.
    ///
    /// Consumers that lose an input are marked modified.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<PipelineNode> {
        let consumers: Vec<NodeId> = self
            .connections_from(id)
            .map(|c| c.to.node_id)
            .collect();
        self.connections.retain(|conn| !conn.involves(id));
        self.input_sources.retain(|to, source| *source != id && to.node_id != id);
        for consumer in consumers {
            if let Some(node) = self.nodes.get_mut(&consumer) {
                node.touch();
            }
        }
        self.nodes
            .shift_remove(&id)
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub fn get_node(&self, id: NodeId) -> GraphResult<&PipelineNode> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut PipelineNode> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // Node settings
    // ========================================================================

    /// Set a parameter. The node is only marked modified if the value changed.
    pub fn set_parameter(
        &mut self,
        node_id: NodeId,
        name: &str,
        value: impl Into<Value>,
    ) -> GraphResult<()> {
        let value = value.into();
        let node = self.get_node_mut(node_id)?;
        if node.metadata.get_parameter(name).is_none() {
            return Err(GraphError::UnknownParameter {
                node_id,
                parameter: name.to_string(),
            });
        }
        if node.parameters.get(name) != Some(&value) {
            log::debug!("Node {} parameter '{}' = {}", node_id, name, value);
            node.parameters.insert(name.to_string(), value);
            node.touch();
        }
        Ok(())
    }

    pub fn get_parameter(&self, node_id: NodeId, name: &str) -> GraphResult<&Value> {
        self.get_node(node_id)?
            .get_parameter(name)
            .ok_or_else(|| GraphError::UnknownParameter {
                node_id,
                parameter: name.to_string(),
            })
    }

    /// Override the number of work units used by one node.
    pub fn set_number_of_work_units(&mut self, node_id: NodeId, work_units: usize) -> GraphResult<()> {
        let node = self.get_node_mut(node_id)?;
        let work_units = Some(work_units.max(1));
        if node.work_units != work_units {
            node.work_units = work_units;
            node.touch();
        }
        Ok(())
    }

    /// Narrow what an update of this node will produce.
    pub fn set_output_requested_region(
        &mut self,
        node_id: NodeId,
        region: ImageRegion,
    ) -> GraphResult<()> {
        self.get_node_mut(node_id)?.requested_override = Some(region);
        Ok(())
    }

    /// Go back to requesting the largest possible region.
    pub fn clear_output_requested_region(&mut self, node_id: NodeId) -> GraphResult<()> {
        self.get_node_mut(node_id)?.requested_override = None;
        Ok(())
    }

    /// Subscribe to the node's progress events.
    pub fn add_observer(&mut self, node_id: NodeId, observer: ProgressCallback) -> GraphResult<()> {
        self.get_node_mut(node_id)?.observers.push(observer);
        Ok(())
    }

    /// Mark a node modified.
    pub fn touch(&mut self, node_id: NodeId) -> GraphResult<()> {
        self.get_node_mut(node_id)?.touch();
        Ok(())
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Connect an output port to an input port.
    ///
    /// Rejects unknown ports, incompatible types, an input that is already
    /// fed, and any edge that would close a cycle.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: impl Into<String>,
        to_node: NodeId,
        to_port: impl Into<String>,
    ) -> GraphResult<ConnectionId> {
        let from_port = from_port.into();
        let to_port = to_port.into();

        let from_def = self
            .get_node(from_node)?
            .metadata
            .get_output(&from_port)
            .cloned()
            .ok_or_else(|| GraphError::PortNotFound {
                node_id: from_node,
                port: from_port.clone(),
            })?;
        let to_def = self
            .get_node(to_node)?
            .metadata
            .get_input(&to_port)
            .cloned()
            .ok_or_else(|| GraphError::PortNotFound {
                node_id: to_node,
                port: to_port.clone(),
            })?;

        if !from_def.port_type.compatible_with(&to_def.port_type) {
            return Err(GraphError::TypeMismatch {
                from_type: from_def.port_type,
                to_type: to_def.port_type,
            });
        }

        if self.input_connection(to_node, &to_port).is_some() {
            return Err(GraphError::PortAlreadyConnected {
                node_id: to_node,
                port: to_port,
            });
        }

        // The new edge closes a cycle if from_node is already downstream of to_node
        if self.is_reachable(to_node, from_node) {
            let mut nodes = vec![to_node];
            nodes.extend(self.path_between(to_node, from_node));
            return Err(GraphError::PipelineCycle { nodes });
        }

        let connection = Connection::new(
            Endpoint::new(from_node, from_port),
            Endpoint::new(to_node, to_port),
        );
        log::debug!("Connected {}", connection);
        let id = connection.id;
        self.connections.push(connection);
        self.get_node_mut(to_node)?.touch();
        Ok(id)
    }

    /// Remove a connection by ID.
    pub fn disconnect(&mut self, id: ConnectionId) -> GraphResult<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        let connection = self.connections.remove(pos);
        if let Some(node) = self.nodes.get_mut(&connection.to.node_id) {
            node.touch();
        }
        Ok(connection)
    }

    /// Remove whatever feeds an input port.
    pub fn disconnect_input(&mut self, node_id: NodeId, port: &str) -> GraphResult<()> {
        if let Some(id) = self.input_connection(node_id, port).map(|c| c.id) {
            self.disconnect(id)?;
        }
        Ok(())
    }

    /// Feed `data` into an input port.
    ///
    /// A source node is created and wired to the port, replacing whatever fed
    /// it before. Returns the source node's ID.
    pub fn set_input(&mut self, node_id: NodeId, port: &str, data: DataHandle) -> GraphResult<NodeId> {
        self.get_node(node_id)?;
        let endpoint = Endpoint::new(node_id, port);
        if let Some(previous) = self.input_sources.remove(&endpoint) {
            self.remove_node(previous)?;
        }
        self.disconnect_input(node_id, port)?;

        let source = self.add_source(data);
        if let Err(e) = self.connect(source, ImageSource::OUTPUT, node_id, port) {
            self.nodes.shift_remove(&source);
            return Err(e);
        }
        self.input_sources.insert(endpoint, source);
        Ok(source)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn get_connection(&self, id: ConnectionId) -> GraphResult<&Connection> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))
    }

    pub fn connections_from(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from.node_id == node_id)
    }

    pub fn connections_to(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to.node_id == node_id)
    }

    /// The connection feeding an input port.
    pub fn input_connection(&self, node_id: NodeId, port: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.to.is(node_id, port))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ========================================================================
    // Outputs and updates
    // ========================================================================

    /// Cached output of a node, shared.
    pub fn output(&self, node_id: NodeId, port: &str) -> FlowResult<DataHandle> {
        self.get_node(node_id)?
            .output(port)
            .cloned()
            .ok_or_else(|| {
                FlowError::Execution(ExecutionError::OutputNotSet {
                    node_id,
                    port: port.to_string(),
                })
            })
    }

    /// Cached output as a concrete data object. The clone shares storage.
    pub fn output_object<O: DataObject + Clone>(&self, node_id: NodeId, port: &str) -> FlowResult<O> {
        let handle = self.output(node_id, port)?;
        Ok(downcast_ref::<O>(handle.as_ref())?.clone())
    }

    pub fn output_image<T: NumericTraits>(&self, node_id: NodeId, port: &str) -> FlowResult<Image<T>> {
        self.output_object::<Image<T>>(node_id, port)
    }

    /// Bring a node's outputs up to date with default options.
    pub fn update(&mut self, node_id: NodeId) -> FlowResult<UpdateReport> {
        self.update_with(node_id, ExecutionOptions::default())
    }

    pub fn update_with(&mut self, node_id: NodeId, options: ExecutionOptions) -> FlowResult<UpdateReport> {
        ExecutionEngine::new().update(self, node_id, options)
    }

    /// Drop any narrowed request, then update the whole output.
    pub fn update_largest_possible_region(&mut self, node_id: NodeId) -> FlowResult<UpdateReport> {
        self.clear_output_requested_region(node_id)?;
        self.update(node_id)
    }

    // ========================================================================
    // Graph Analysis
    // ========================================================================

    /// Check if `target` is reachable from `start` following connections.
    pub fn is_reachable(&self, start: NodeId, target: NodeId) -> bool {
        if start == target {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                for conn in self.connections_from(current) {
                    queue.push_back(conn.to.node_id);
                }
            }
        }

        false
    }

    /// Nodes on one downstream path from `start` to `target`, excluding `start`.
    fn path_between(&self, start: NodeId, target: NodeId) -> Vec<NodeId> {
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                break;
            }
            for conn in self.connections_from(current) {
                let next = conn.to.node_id;
                if next != start && !parent.contains_key(&next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        let mut path = Vec::new();
        let mut current = target;
        while current != start {
            path.push(current);
            match parent.get(&current) {
                Some(&p) => current = p,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// All nodes the given node depends on.
    pub fn get_upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.connections_to(node_id).map(|c| c.from.node_id).collect();

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                queue.extend(self.connections_to(current).map(|c| c.from.node_id));
            }
        }

        result
    }

    /// All nodes depending on the given node.
    pub fn get_downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.connections_from(node_id).map(|c| c.to.node_id).collect();

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                queue.extend(self.connections_from(current).map(|c| c.to.node_id));
            }
        }

        result
    }

    /// Nodes with no incoming connections.
    pub fn get_source_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.connections_to(id).next().is_none())
            .collect()
    }

    /// Nodes with no outgoing connections.
    pub fn get_sink_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.connections_from(id).next().is_none())
            .collect()
    }
}
