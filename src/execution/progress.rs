//! Progress tracking for updates.
//!
//! Three layers:
//! - [`ProgressTracker`] follows one update across all nodes it touches.
//! - [`ProgressReporter`] is handed to one node execution and forwards its
//!   fractional progress to the node's observers, never going backwards.
//! - [`ProgressAccumulator`] lets a composite filter fold the progress of its
//!   internal filters into its own reporter, weighting each internal filter by
//!   the share of the work it represents.

use crate::core::error::NodeId;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A node has started executing.
    Started { node_id: NodeId, node_name: String },
    /// Fraction of the node's work done, in `[0, 1]`.
    Progress { node_id: NodeId, progress: f32 },
    /// A node has finished executing.
    Completed { node_id: NodeId, duration_ms: u64 },
    /// A node was up to date and did not execute.
    Skipped { node_id: NodeId },
    /// A node stopped early because the abort flag was raised.
    Aborted { node_id: NodeId },
    /// A node failed.
    Error { node_id: NodeId, message: String },
}

impl ProgressUpdate {
    /// Node the event is about.
    pub fn node_id(&self) -> NodeId {
        match self {
            ProgressUpdate::Started { node_id, .. }
            | ProgressUpdate::Progress { node_id, .. }
            | ProgressUpdate::Completed { node_id, .. }
            | ProgressUpdate::Skipped { node_id }
            | ProgressUpdate::Aborted { node_id }
            | ProgressUpdate::Error { node_id, .. } => *node_id,
        }
    }
}

/// Callback type for progress updates.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

fn dispatch(sinks: &[ProgressCallback], update: &ProgressUpdate) {
    for sink in sinks {
        sink(update);
    }
}

// ============================================================================
// Per-node reporter
// ============================================================================

struct ReporterState {
    last: f32,
    sinks: Vec<ProgressCallback>,
}

/// Progress channel of a single node execution.
///
/// Values are clamped to `[0, 1]` and only strictly increasing values are
/// forwarded, so observers always see a non-decreasing sequence.
#[derive(Clone)]
pub struct ProgressReporter {
    node_id: NodeId,
    state: Arc<Mutex<ReporterState>>,
}

impl ProgressReporter {
    pub fn new(node_id: NodeId, sinks: Vec<ProgressCallback>) -> Self {
        Self {
            node_id,
            state: Arc::new(Mutex::new(ReporterState { last: 0.0, sinks })),
        }
    }

    /// A reporter nobody listens to.
    pub fn silent(node_id: NodeId) -> Self {
        Self::new(node_id, Vec::new())
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Report the fraction of work done.
    pub fn report(&self, progress: f32) {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
        let sinks = {
            let mut state = self.state.lock();
            if progress <= state.last {
                return;
            }
            state.last = progress;
            state.sinks.clone()
        };
        // Sinks run unlocked so they may query this reporter
        dispatch(
            &sinks,
            &ProgressUpdate::Progress {
                node_id: self.node_id,
                progress,
            },
        );
    }

    /// Last value forwarded.
    pub fn last(&self) -> f32 {
        self.state.lock().last
    }

    /// Forward a lifecycle event to every sink.
    pub fn emit(&self, update: ProgressUpdate) {
        let sinks = self.state.lock().sinks.clone();
        dispatch(&sinks, &update);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("node_id", &self.node_id)
            .field("last", &self.last())
            .finish()
    }
}

// ============================================================================
// Update-wide tracker
// ============================================================================

/// Tracks one update across all nodes it touches.
pub struct ProgressTracker {
    /// Total number of nodes in the update.
    total_nodes: usize,
    /// Number of nodes executed.
    completed_nodes: AtomicU64,
    /// Number of nodes skipped.
    skipped_nodes: AtomicU64,
    /// Start time.
    start_time: Instant,
    /// Update-wide callback, if any.
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total_nodes: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            total_nodes,
            completed_nodes: AtomicU64::new(0),
            skipped_nodes: AtomicU64::new(0),
            start_time: Instant::now(),
            callback,
        }
    }

    /// Reporter for one node execution, feeding `observers` and the update callback.
    pub fn reporter(&self, node_id: NodeId, observers: &[ProgressCallback]) -> ProgressReporter {
        let mut sinks = observers.to_vec();
        sinks.extend(self.callback.clone());
        ProgressReporter::new(node_id, sinks)
    }

    /// Report that a node has started.
    pub fn node_started(&self, reporter: &ProgressReporter, node_name: &str) {
        reporter.emit(ProgressUpdate::Started {
            node_id: reporter.node_id(),
            node_name: node_name.to_string(),
        });
    }

    /// Report that a node has finished: progress reaches 1.0, then `Completed`.
    pub fn node_completed(&self, reporter: &ProgressReporter, duration_ms: u64) {
        self.completed_nodes.fetch_add(1, Ordering::Relaxed);
        reporter.report(1.0);
        reporter.emit(ProgressUpdate::Completed {
            node_id: reporter.node_id(),
            duration_ms,
        });
    }

    /// Report that a node was up to date.
    pub fn node_skipped(&self, node_id: NodeId, observers: &[ProgressCallback]) {
        self.skipped_nodes.fetch_add(1, Ordering::Relaxed);
        self.reporter(node_id, observers)
            .emit(ProgressUpdate::Skipped { node_id });
    }

    /// Report that a node stopped on the abort flag.
    pub fn node_aborted(&self, reporter: &ProgressReporter) {
        reporter.emit(ProgressUpdate::Aborted {
            node_id: reporter.node_id(),
        });
    }

    /// Report an error.
    pub fn node_failed(&self, reporter: &ProgressReporter, message: String) {
        reporter.emit(ProgressUpdate::Error {
            node_id: reporter.node_id(),
            message,
        });
    }

    pub fn nodes_completed(&self) -> usize {
        self.completed_nodes.load(Ordering::Relaxed) as usize
    }

    pub fn nodes_skipped(&self) -> usize {
        self.skipped_nodes.load(Ordering::Relaxed) as usize
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.total_nodes == 0 {
            return 100.0;
        }
        let done = self.nodes_completed() + self.nodes_skipped();
        (done as f32 / self.total_nodes as f32) * 100.0
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

// ============================================================================
// Composite accumulator
// ============================================================================

struct AccumulatorState {
    weights: IndexMap<NodeId, f32>,
    progress: IndexMap<NodeId, f32>,
}

/// Folds the progress of a composite's internal filters into one stream.
///
/// The composite's progress is `Σ weight_i × progress_i`, where a completed
/// or skipped internal filter counts as progress 1. Events from internal
/// nodes that were never registered are ignored.
#[derive(Clone)]
pub struct ProgressAccumulator {
    state: Arc<Mutex<AccumulatorState>>,
    target: Option<ProgressReporter>,
}

impl ProgressAccumulator {
    /// Accumulator forwarding to the composite's own reporter.
    pub fn new(target: ProgressReporter) -> Self {
        Self {
            state: Arc::new(Mutex::new(AccumulatorState {
                weights: IndexMap::new(),
                progress: IndexMap::new(),
            })),
            target: Some(target),
        }
    }

    /// Accumulator that only records progress.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(Mutex::new(AccumulatorState {
                weights: IndexMap::new(),
                progress: IndexMap::new(),
            })),
            target: None,
        }
    }

    /// Register an internal filter with the share of the work it represents.
    pub fn register_internal_filter(&self, node_id: NodeId, weight: f32) {
        let state = &mut *self.state.lock();
        state.weights.insert(node_id, weight);
        state.progress.insert(node_id, 0.0);
    }

    /// Forget all registrations.
    pub fn unregister_all_filters(&self) {
        let state = &mut *self.state.lock();
        state.weights.clear();
        state.progress.clear();
    }

    /// Zero the recorded progress of every registered filter.
    pub fn reset_progress(&self) {
        for value in self.state.lock().progress.values_mut() {
            *value = 0.0;
        }
    }

    /// Sum of all registered weights.
    pub fn total_weight(&self) -> f32 {
        self.state.lock().weights.values().sum()
    }

    /// Whether the weights sum to 1.0; logs a warning when they do not.
    pub fn check_weights(&self) -> bool {
        let total = self.total_weight();
        let ok = (total - 1.0).abs() <= 1e-4;
        if !ok {
            log::warn!(
                "Internal filter weights sum to {} instead of 1.0; composite progress will be skewed",
                total
            );
        }
        ok
    }

    /// Current weighted progress.
    pub fn accumulated_progress(&self) -> f32 {
        let state = self.state.lock();
        Self::weighted_sum(&state)
    }

    fn weighted_sum(state: &AccumulatorState) -> f32 {
        state
            .weights
            .iter()
            .map(|(id, weight)| weight * state.progress.get(id).copied().unwrap_or(0.0))
            .sum()
    }

    /// Feed one event from an internal filter.
    pub fn record(&self, update: &ProgressUpdate) {
        let total = {
            let state = &mut *self.state.lock();
            let node_id = update.node_id();
            if !state.weights.contains_key(&node_id) {
                return;
            }
            let value = match update {
                ProgressUpdate::Progress { progress, .. } => *progress,
                ProgressUpdate::Completed { .. } | ProgressUpdate::Skipped { .. } => 1.0,
                _ => return,
            };
            let slot = state.progress.entry(node_id).or_insert(0.0);
            *slot = slot.max(value);
            Self::weighted_sum(state)
        };
        if let Some(target) = &self.target {
            target.report(total);
        }
    }

    /// Callback to subscribe to the internal pipeline's progress stream.
    pub fn observer(&self) -> ProgressCallback {
        let accumulator = self.clone();
        Arc::new(move |update: &ProgressUpdate| accumulator.record(update))
    }
}

/// Callback that forwards every event into a crossbeam channel.
pub fn channel_observer() -> (ProgressCallback, crossbeam::channel::Receiver<ProgressUpdate>) {
    let (sender, receiver) = crossbeam::channel::unbounded();
    let callback: ProgressCallback = Arc::new(move |update: &ProgressUpdate| {
        let _ = sender.send(update.clone());
    });
    (callback, receiver)
}
