//! Execution engine implementation.
//!
//! `update` brings one node's outputs up to date:
//!
//! 1. validate the upstream closure of the node,
//! 2. propagate output information downstream,
//! 3. propagate requested regions upstream,
//! 4. execute stale nodes in dependency order, skipping the rest.
//!
//! Errors in steps 1 to 3 leave every buffer untouched.

use crate::core::chunked::{MemoryBudget, DEFAULT_MEMORY_LIMIT};
use crate::core::context::{ExecutionContext, InformationContext, RegionContext};
use crate::core::error::{ExecutionError, ExecutionResult, FlowError, FlowResult, NodeId};
use crate::core::image::{DataObject, ImageInfo};
use crate::core::node::NodeMetadata;
use crate::core::region::{resolve_requested_region, ImageRegion};
use crate::core::time::TimeStamp;
use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::graph::structure::PipelineGraph;
use crate::graph::topology::TopologyAnalyzer;
use crate::validation::ValidationPipeline;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Execution options.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Work units per node unless the node overrides it.
    pub work_units: usize,
    /// Memory limit in bytes for buffers allocated during the update.
    pub memory_limit: usize,
    /// Whether to validate the graph before planning.
    pub validate: bool,
    /// Polled between work units; raising it aborts the running node.
    pub abort: Arc<AtomicBool>,
    /// Receives every node's progress events.
    pub progress_callback: Option<ProgressCallback>,
    /// Budget shared with an enclosing update.
    budget: Option<Arc<MemoryBudget>>,
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("work_units", &self.work_units)
            .field("memory_limit", &self.memory_limit)
            .field("validate", &self.validate)
            .field("abort", &self.abort.load(Ordering::Relaxed))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            work_units: rayon::current_num_threads(),
            memory_limit: DEFAULT_MEMORY_LIMIT,
            validate: true,
            abort: Arc::new(AtomicBool::new(false)),
            progress_callback: None,
            budget: None,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default number of work units per node.
    pub fn with_work_units(mut self, work_units: usize) -> Self {
        self.work_units = work_units.max(1);
        self
    }

    /// Set memory limit in bytes.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set memory limit in megabytes.
    pub fn with_memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit = mb * 1024 * 1024;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Charge allocations to an existing budget instead of a fresh one.
    pub fn with_shared_budget(mut self, budget: Arc<MemoryBudget>) -> Self {
        self.memory_limit = budget.limit();
        self.budget = Some(budget);
        self
    }
}

/// Why a node has to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NeverExecuted,
    /// Parameters, wiring, work units or source data changed.
    Modified,
    UpstreamNewer { upstream: NodeId },
    OutputMissing { port: String },
    RegionNotBuffered { port: String },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NeverExecuted => write!(f, "never executed"),
            StaleReason::Modified => write!(f, "modified since last execution"),
            StaleReason::UpstreamNewer { upstream } => {
                write!(f, "output of {} is newer", upstream)
            }
            StaleReason::OutputMissing { port } => write!(f, "output '{}' missing", port),
            StaleReason::RegionNotBuffered { port } => {
                write!(f, "output '{}' does not buffer the requested region", port)
            }
        }
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_duration_ms: u64,
    pub nodes_executed: usize,
    pub nodes_skipped: usize,
    /// Bytes of fresh buffers allocated (reused buffers are free).
    pub bytes_allocated: usize,
}

/// What an update did.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Executed nodes, in execution order.
    pub executed: Vec<NodeId>,
    /// Up-to-date nodes that were skipped.
    pub skipped: Vec<NodeId>,
    pub stats: ExecutionStats,
}

impl UpdateReport {
    pub fn was_executed(&self, node_id: NodeId) -> bool {
        self.executed.contains(&node_id)
    }
}

/// Plan computed by the two propagation passes.
struct UpdatePlan {
    order: Vec<NodeId>,
    infos: HashMap<NodeId, HashMap<String, ImageInfo>>,
    /// Region each output must buffer.
    output_requests: HashMap<NodeId, HashMap<String, ImageRegion>>,
    /// Region each consumer asked of each input.
    input_requests: HashMap<NodeId, HashMap<String, ImageRegion>>,
}

/// The execution engine.
pub struct ExecutionEngine {
    validator: ValidationPipeline,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            validator: ValidationPipeline::default(),
        }
    }

    pub fn with_validator(validator: ValidationPipeline) -> Self {
        Self { validator }
    }

    /// Bring the outputs of `terminal` up to date.
    pub fn update(
        &self,
        graph: &mut PipelineGraph,
        terminal: NodeId,
        options: ExecutionOptions,
    ) -> FlowResult<UpdateReport> {
        let start_time = Instant::now();
        let order = TopologyAnalyzer::new(graph).upstream_order(terminal)?;
        log::info!("Updating {} ({} nodes upstream)", terminal, order.len());

        if options.validate {
            self.validator.validate(graph, &order).into_result()?;
        }

        let infos = Self::propagate_information(graph, &order)?;
        let plan = Self::propagate_requested_regions(graph, order, terminal, infos)?;
        for (id, infos) in &plan.infos {
            graph.get_node_mut(*id)?.output_infos = infos.clone();
        }

        let budget = options
            .budget
            .clone()
            .unwrap_or_else(|| Arc::new(MemoryBudget::new(options.memory_limit)));
        // A shared budget already carries the enclosing update's buffers
        let baseline = budget.current_usage();
        let tracker = ProgressTracker::new(plan.order.len(), options.progress_callback.clone());
        let mut report = UpdateReport::default();

        for &id in &plan.order {
            let requested = plan.output_requests.get(&id).cloned().unwrap_or_default();
            match Self::stale_reason(graph, id, &requested)? {
                None => {
                    log::debug!("Node {} is up to date", id);
                    Self::refresh_requested_regions(graph, id, &requested)?;
                    tracker.node_skipped(id, &graph.get_node(id)?.observers);
                    report.skipped.push(id);
                }
                Some(reason) => {
                    log::debug!("Node {} is stale: {}", id, reason);
                    Self::execute_node(graph, id, &plan, &requested, &options, &budget, &tracker)?;
                    report.executed.push(id);
                }
            }
        }

        report.stats = ExecutionStats {
            total_duration_ms: start_time.elapsed().as_millis() as u64,
            nodes_executed: report.executed.len(),
            nodes_skipped: report.skipped.len(),
            bytes_allocated: budget.current_usage().saturating_sub(baseline),
        };
        log::info!(
            "Update of {} finished in {} ms: {} executed, {} skipped",
            terminal,
            report.stats.total_duration_ms,
            report.stats.nodes_executed,
            report.stats.nodes_skipped
        );
        Ok(report)
    }

    // ========================================================================
    // Planning
    // ========================================================================

    /// Metadata of every output, producers first.
    fn propagate_information(
        graph: &PipelineGraph,
        order: &[NodeId],
    ) -> FlowResult<HashMap<NodeId, HashMap<String, ImageInfo>>> {
        let mut infos: HashMap<NodeId, HashMap<String, ImageInfo>> = HashMap::new();

        for &id in order {
            let node = graph.get_node(id)?;
            let mut ctx = InformationContext::new(id, node.parameters.clone());
            for conn in graph.connections_to(id) {
                let info = Self::upstream_info(&infos, &conn.from.node_id, &conn.from.port_name)?;
                ctx.add_input(conn.to.port_name.clone(), info.clone());
            }

            let outputs = node.filter.generate_output_information(&ctx)?;
            for port in &node.metadata.outputs {
                if !outputs.contains_key(&port.name) {
                    return Err(ExecutionError::OutputNotSet {
                        node_id: id,
                        port: port.name.clone(),
                    }
                    .into());
                }
            }
            infos.insert(id, outputs);
        }

        Ok(infos)
    }

    /// Requested regions of every output, consumers first.
    fn propagate_requested_regions(
        graph: &PipelineGraph,
        order: Vec<NodeId>,
        terminal: NodeId,
        infos: HashMap<NodeId, HashMap<String, ImageInfo>>,
    ) -> FlowResult<UpdatePlan> {
        let mut pending: HashMap<(NodeId, String), ImageRegion> = HashMap::new();
        let mut output_requests = HashMap::new();
        let mut input_requests = HashMap::new();

        for &id in order.iter().rev() {
            let node = graph.get_node(id)?;
            let node_infos = infos.get(&id).cloned().unwrap_or_default();

            let mut requested = HashMap::new();
            for port in &node.metadata.outputs {
                let info = Self::upstream_info(&infos, &id, &port.name)?;
                let largest = &info.largest_possible_region;
                let raw = if id == terminal {
                    node.requested_override
                        .clone()
                        .unwrap_or_else(|| largest.clone())
                } else {
                    // Outputs nobody in this update consumes produce nothing
                    pending
                        .remove(&(id, port.name.clone()))
                        .unwrap_or_else(|| ImageRegion::empty_at(largest.index().to_vec()))
                };
                // A request outside the largest region fails before any enlargement
                let clipped = resolve_requested_region(&raw, largest)?;
                let enlarged = node.filter.enlarge_output_requested_region(&port.name, info, clipped);
                let resolved = resolve_requested_region(&enlarged, largest)?;
                log::debug!("Node {} output '{}' requested {}", id, port.name, resolved);
                requested.insert(port.name.clone(), resolved);
            }

            let mut input_infos = HashMap::new();
            for conn in graph.connections_to(id) {
                let info = Self::upstream_info(&infos, &conn.from.node_id, &conn.from.port_name)?;
                input_infos.insert(conn.to.port_name.clone(), info.clone());
            }
            let ctx = RegionContext::new(
                id,
                node.parameters.clone(),
                input_infos.clone(),
                node_infos,
                requested.clone(),
                node.metadata.primary_output().map(str::to_string),
            );
            let asked = node.filter.generate_input_requested_region(&ctx)?;

            let mut inputs = HashMap::new();
            for conn in graph.connections_to(id) {
                let largest = &input_infos[&conn.to.port_name].largest_possible_region;
                let region = asked
                    .get(&conn.to.port_name)
                    .cloned()
                    .unwrap_or_else(|| ImageRegion::empty_at(largest.index().to_vec()));
                let resolved = resolve_requested_region(&region, largest)?;
                pending
                    .entry((conn.from.node_id, conn.from.port_name.clone()))
                    .and_modify(|r| *r = r.union(&resolved))
                    .or_insert_with(|| resolved.clone());
                inputs.insert(conn.to.port_name.clone(), resolved);
            }

            output_requests.insert(id, requested);
            input_requests.insert(id, inputs);
        }

        Ok(UpdatePlan {
            order,
            infos,
            output_requests,
            input_requests,
        })
    }

    fn upstream_info<'a>(
        infos: &'a HashMap<NodeId, HashMap<String, ImageInfo>>,
        node_id: &NodeId,
        port: &str,
    ) -> ExecutionResult<&'a ImageInfo> {
        infos
            .get(node_id)
            .and_then(|outputs| outputs.get(port))
            .ok_or_else(|| ExecutionError::OutputNotSet {
                node_id: *node_id,
                port: port.to_string(),
            })
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Why the node must run, or `None` if its outputs can be reused.
    pub fn stale_reason(
        graph: &PipelineGraph,
        id: NodeId,
        requested: &HashMap<String, ImageRegion>,
    ) -> FlowResult<Option<StaleReason>> {
        let node = graph.get_node(id)?;
        let Some(last_update) = node.last_update else {
            return Ok(Some(StaleReason::NeverExecuted));
        };
        if node.modified_time > last_update {
            return Ok(Some(StaleReason::Modified));
        }

        for conn in graph.connections_to(id) {
            let upstream = graph.get_node(conn.from.node_id)?;
            match upstream.outputs.get(&conn.from.port_name) {
                Some(data) if data.modified_time() <= last_update => {}
                _ => {
                    return Ok(Some(StaleReason::UpstreamNewer {
                        upstream: conn.from.node_id,
                    }))
                }
            }
        }

        for port in &node.metadata.outputs {
            let Some(data) = node.outputs.get(&port.name) else {
                return Ok(Some(StaleReason::OutputMissing {
                    port: port.name.clone(),
                }));
            };
            if let Some(region) = requested.get(&port.name) {
                if !region.is_inside(data.buffered_region()) {
                    return Ok(Some(StaleReason::RegionNotBuffered {
                        port: port.name.clone(),
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Record new requested regions on a skipped node's outputs.
    fn refresh_requested_regions(
        graph: &mut PipelineGraph,
        id: NodeId,
        requested: &HashMap<String, ImageRegion>,
    ) -> FlowResult<()> {
        let node = graph.get_node_mut(id)?;
        for (port, region) in requested {
            if let Some(data) = node.outputs.get_mut(port) {
                if data.requested_region() != region {
                    let mut refreshed = data.clone_object();
                    refreshed.set_requested_region(region.clone());
                    *data = Arc::from(refreshed);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute_node(
        graph: &mut PipelineGraph,
        id: NodeId,
        plan: &UpdatePlan,
        requested: &HashMap<String, ImageRegion>,
        options: &ExecutionOptions,
        budget: &Arc<MemoryBudget>,
        tracker: &ProgressTracker,
    ) -> FlowResult<()> {
        // Moved out so unshared buffers can be reused in place
        let previous = std::mem::take(&mut graph.get_node_mut(id)?.outputs);

        let node = graph.get_node(id)?;
        let metadata = node.metadata.clone();
        let reporter = tracker.reporter(id, &node.observers);
        tracker.node_started(&reporter, &node.display_name());

        let mut ctx = ExecutionContext::new(id)
            .with_parameters(node.parameters.clone())
            .with_work_units(node.work_units.unwrap_or(options.work_units))
            .with_budget(Arc::clone(budget))
            .with_abort_flag(Arc::clone(&options.abort))
            .with_progress(reporter.clone());

        let input_requests = plan.input_requests.get(&id);
        for conn in graph.connections_to(id) {
            let data = graph
                .get_node(conn.from.node_id)?
                .outputs
                .get(&conn.from.port_name)
                .cloned()
                .ok_or_else(|| ExecutionError::MissingInput {
                    node_id: id,
                    port: conn.to.port_name.clone(),
                })?;
            let region = input_requests
                .and_then(|r| r.get(&conn.to.port_name))
                .cloned()
                .unwrap_or_else(|| data.requested_region().clone());
            ctx.add_input(conn.to.port_name.clone(), data, region);
        }

        let infos = plan.infos.get(&id);
        for port in &metadata.outputs {
            let info = infos
                .and_then(|i| i.get(&port.name))
                .cloned()
                .ok_or_else(|| ExecutionError::OutputNotSet {
                    node_id: id,
                    port: port.name.clone(),
                })?;
            let region = requested
                .get(&port.name)
                .cloned()
                .unwrap_or_else(|| info.largest_possible_region.clone());
            ctx.add_output(port.name.clone(), info, region);
        }

        for (port, data) in previous {
            ctx.add_previous_output(port, data);
        }

        let started = Instant::now();
        let result = ctx
            .check_aborted()
            .and_then(|_| node.filter.generate_data(&mut ctx))
            .and_then(|_| Self::collect_outputs(id, &mut ctx, &metadata, requested));
        drop(ctx);

        let node = graph.get_node_mut(id)?;
        match result {
            Ok(outputs) => {
                node.outputs = outputs;
                node.last_update = Some(TimeStamp::now());
                tracker.node_completed(&reporter, started.elapsed().as_millis() as u64);
                Ok(())
            }
            Err(error) => {
                node.invalidate();
                if matches!(error, ExecutionError::Aborted { .. }) {
                    log::warn!("Node {} aborted", id);
                    tracker.node_aborted(&reporter);
                } else {
                    log::warn!("Node {} failed: {}", id, error);
                    tracker.node_failed(&reporter, error.to_string());
                }
                Err(FlowError::Execution(error))
            }
        }
    }

    /// Check and stamp what `generate_data` produced.
    fn collect_outputs(
        id: NodeId,
        ctx: &mut ExecutionContext,
        metadata: &NodeMetadata,
        requested: &HashMap<String, ImageRegion>,
    ) -> ExecutionResult<HashMap<String, Arc<dyn DataObject>>> {
        let mut produced = ctx.take_outputs();
        let stamp = TimeStamp::now();
        let mut outputs = HashMap::new();

        for port in &metadata.outputs {
            let mut data = produced
                .remove(&port.name)
                .ok_or_else(|| ExecutionError::OutputNotSet {
                    node_id: id,
                    port: port.name.clone(),
                })?;
            if let Some(region) = requested.get(&port.name) {
                if !region.is_inside(data.buffered_region()) {
                    return Err(ExecutionError::OutputRegionMismatch {
                        node_id: id,
                        port: port.name.clone(),
                        buffered: data.buffered_region().clone(),
                        requested: region.clone(),
                    });
                }
                data.set_requested_region(region.clone());
            }
            debug_assert!(data
                .buffered_region()
                .is_inside(&data.info().largest_possible_region));
            data.set_modified_time(stamp);
            outputs.insert(port.name.clone(), Arc::from(data));
        }

        Ok(outputs)
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
