//! Contexts handed to filter hooks.
//!
//! Each pass of an update gives the filter a different view of the graph:
//! - [`InformationContext`]: input metadata and parameters, no buffers.
//! - [`RegionContext`]: adds the regions requested from the filter's outputs.
//! - [`ExecutionContext`]: input data objects, output allocation, work units,
//!   progress and the abort flag.

use crate::core::chunked::{MemoryBudget, WorkUnitSplitter};
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::core::image::{downcast_owned, downcast_ref, DataHandle, DataObject, Image, ImageInfo};
use crate::core::numeric::{NumericTraits, PixelValue, ScalarValue};
use crate::core::region::ImageRegion;
use crate::core::types::Value;
use crate::execution::progress::ProgressReporter;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Typed read access to a node's parameters.
pub trait ParameterAccess {
    fn node_id(&self) -> NodeId;

    fn parameter(&self, name: &str) -> Option<&Value>;

    fn get_value(&self, name: &str) -> ExecutionResult<&Value> {
        self.parameter(name)
            .ok_or_else(|| ExecutionError::MissingParameter {
                node_id: self.node_id(),
                parameter: name.to_string(),
            })
    }

    fn get_integer(&self, name: &str) -> ExecutionResult<i64> {
        self.get_value(name)?
            .as_integer()
            .ok_or_else(|| self.invalid(name, "expected integer"))
    }

    fn get_float(&self, name: &str) -> ExecutionResult<f64> {
        self.get_value(name)?
            .as_float()
            .ok_or_else(|| self.invalid(name, "expected float"))
    }

    fn get_bool(&self, name: &str) -> ExecutionResult<bool> {
        self.get_value(name)?
            .as_bool()
            .ok_or_else(|| self.invalid(name, "expected boolean"))
    }

    fn get_string(&self, name: &str) -> ExecutionResult<&str> {
        self.get_value(name)?
            .as_str()
            .ok_or_else(|| self.invalid(name, "expected string"))
    }

    /// A pixel parameter, cast to `T`. Plain numbers fill every component.
    fn get_pixel<T: NumericTraits>(&self, name: &str) -> ExecutionResult<T>
    where
        Self: Sized,
    {
        let value = match self.get_value(name)? {
            Value::Pixel(p) => p.clone(),
            Value::Float(v) => PixelValue::Scalar(ScalarValue::F64(*v)),
            Value::Integer(v) => PixelValue::Scalar(ScalarValue::I64(*v)),
            _ => return Err(self.invalid(name, "expected pixel value")),
        };
        let cast = value.cast(T::pixel_kind())?;
        Ok(T::from_pixel_value(&cast)?)
    }

    fn invalid(&self, name: &str, error: &str) -> ExecutionError {
        ExecutionError::InvalidParameter {
            node_id: self.node_id(),
            parameter: name.to_string(),
            error: error.to_string(),
        }
    }
}

// ============================================================================
// Information pass
// ============================================================================

/// View given to `generate_output_information`.
#[derive(Debug, Clone)]
pub struct InformationContext {
    pub node_id: NodeId,
    parameters: HashMap<String, Value>,
    inputs: HashMap<String, ImageInfo>,
}

impl InformationContext {
    pub fn new(node_id: NodeId, parameters: HashMap<String, Value>) -> Self {
        Self {
            node_id,
            parameters,
            inputs: HashMap::new(),
        }
    }

    pub fn add_input(&mut self, port: impl Into<String>, info: ImageInfo) {
        self.inputs.insert(port.into(), info);
    }

    /// Metadata of the object connected to `port`.
    pub fn input_info(&self, port: &str) -> ExecutionResult<&ImageInfo> {
        self.inputs.get(port).ok_or_else(|| ExecutionError::MissingInput {
            node_id: self.node_id,
            port: port.to_string(),
        })
    }

    pub fn has_input(&self, port: &str) -> bool {
        self.inputs.contains_key(port)
    }

    pub fn inputs(&self) -> &HashMap<String, ImageInfo> {
        &self.inputs
    }
}

impl ParameterAccess for InformationContext {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

// ============================================================================
// Requested-region pass
// ============================================================================

/// View given to `generate_input_requested_region`.
#[derive(Debug, Clone)]
pub struct RegionContext {
    pub node_id: NodeId,
    parameters: HashMap<String, Value>,
    inputs: HashMap<String, ImageInfo>,
    outputs: HashMap<String, ImageInfo>,
    requested: HashMap<String, ImageRegion>,
    primary_output: Option<String>,
}

impl RegionContext {
    pub fn new(
        node_id: NodeId,
        parameters: HashMap<String, Value>,
        inputs: HashMap<String, ImageInfo>,
        outputs: HashMap<String, ImageInfo>,
        requested: HashMap<String, ImageRegion>,
        primary_output: Option<String>,
    ) -> Self {
        Self {
            node_id,
            parameters,
            inputs,
            outputs,
            requested,
            primary_output,
        }
    }

    pub fn input_info(&self, port: &str) -> ExecutionResult<&ImageInfo> {
        self.inputs.get(port).ok_or_else(|| ExecutionError::MissingInput {
            node_id: self.node_id,
            port: port.to_string(),
        })
    }

    /// Connected input ports.
    pub fn input_ports(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn output_info(&self, port: &str) -> Option<&ImageInfo> {
        self.outputs.get(port)
    }

    /// Region requested from one of this node's outputs.
    pub fn output_requested_region(&self, port: &str) -> ExecutionResult<&ImageRegion> {
        self.requested
            .get(port)
            .ok_or_else(|| ExecutionError::OutputNotSet {
                node_id: self.node_id,
                port: port.to_string(),
            })
    }

    /// Region requested from the first declared output, if any.
    pub fn primary_requested_region(&self) -> Option<&ImageRegion> {
        self.primary_output
            .as_deref()
            .and_then(|port| self.requested.get(port))
    }
}

impl ParameterAccess for RegionContext {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Context provided during `generate_data`.
pub struct ExecutionContext {
    pub node_id: NodeId,
    parameters: HashMap<String, Value>,
    inputs: HashMap<String, DataHandle>,
    input_requested: HashMap<String, ImageRegion>,
    output_infos: HashMap<String, ImageInfo>,
    output_requested: HashMap<String, ImageRegion>,
    previous_outputs: HashMap<String, DataHandle>,
    outputs: HashMap<String, Box<dyn DataObject>>,
    work_units: usize,
    budget: Arc<MemoryBudget>,
    abort: Arc<AtomicBool>,
    progress: ProgressReporter,
}

impl ExecutionContext {
    /// A context with no inputs, one work unit and the default budget.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            parameters: HashMap::new(),
            inputs: HashMap::new(),
            input_requested: HashMap::new(),
            output_infos: HashMap::new(),
            output_requested: HashMap::new(),
            previous_outputs: HashMap::new(),
            outputs: HashMap::new(),
            work_units: 1,
            budget: Arc::new(MemoryBudget::default()),
            abort: Arc::new(AtomicBool::new(false)),
            progress: ProgressReporter::silent(node_id),
        }
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_work_units(mut self, work_units: usize) -> Self {
        self.work_units = work_units.max(1);
        self
    }

    pub fn with_budget(mut self, budget: Arc<MemoryBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Connect an input object along with the region requested from it.
    pub fn add_input(&mut self, port: impl Into<String>, data: DataHandle, requested: ImageRegion) {
        let port = port.into();
        self.input_requested.insert(port.clone(), requested);
        self.inputs.insert(port, data);
    }

    /// Declare an output and the region it must cover.
    pub fn add_output(&mut self, port: impl Into<String>, info: ImageInfo, requested: ImageRegion) {
        let port = port.into();
        self.output_requested.insert(port.clone(), requested);
        self.output_infos.insert(port, info);
    }

    /// Hand over the output produced by the previous execution, for reuse.
    pub fn add_previous_output(&mut self, port: impl Into<String>, data: DataHandle) {
        self.previous_outputs.insert(port.into(), data);
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn has_input(&self, port: &str) -> bool {
        self.inputs.contains_key(port)
    }

    /// Handle of the object connected to `port`.
    pub fn input_data(&self, port: &str) -> ExecutionResult<&DataHandle> {
        self.inputs.get(port).ok_or_else(|| ExecutionError::MissingInput {
            node_id: self.node_id,
            port: port.to_string(),
        })
    }

    /// Borrow the input connected to `port` as a concrete type.
    pub fn input_object<O: DataObject>(&self, port: &str) -> ExecutionResult<&O> {
        downcast_ref::<O>(self.input_data(port)?.as_ref())
    }

    pub fn input_image<T: NumericTraits>(&self, port: &str) -> ExecutionResult<&Image<T>> {
        self.input_object::<Image<T>>(port)
    }

    /// Take the input out of the context; shared inputs are cloned.
    pub fn take_input_object<O: DataObject + Clone>(&mut self, port: &str) -> ExecutionResult<O> {
        let handle = self
            .inputs
            .remove(port)
            .ok_or_else(|| ExecutionError::MissingInput {
                node_id: self.node_id,
                port: port.to_string(),
            })?;
        downcast_owned::<O>(handle)
    }

    /// Region this node asked of the input during region propagation.
    pub fn input_requested_region(&self, port: &str) -> ExecutionResult<&ImageRegion> {
        self.input_requested
            .get(port)
            .ok_or_else(|| ExecutionError::MissingInput {
                node_id: self.node_id,
                port: port.to_string(),
            })
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    pub fn output_info(&self, port: &str) -> ExecutionResult<&ImageInfo> {
        self.output_infos
            .get(port)
            .ok_or_else(|| ExecutionError::OutputNotSet {
                node_id: self.node_id,
                port: port.to_string(),
            })
    }

    pub fn output_requested_region(&self, port: &str) -> ExecutionResult<&ImageRegion> {
        self.output_requested
            .get(port)
            .ok_or_else(|| ExecutionError::OutputNotSet {
                node_id: self.node_id,
                port: port.to_string(),
            })
    }

    /// An image covering the requested region of `port`, filled with `fill`.
    ///
    /// The previous output is reused in place when nobody else holds it and
    /// it already buffers exactly that region. Fresh buffers are charged to
    /// the update's memory budget.
    pub fn allocate_output<T: NumericTraits>(
        &mut self,
        port: &str,
        fill: T,
    ) -> ExecutionResult<Image<T>> {
        let info = self.output_info(port)?.clone();
        let region = self.output_requested_region(port)?.clone();

        if let Some(previous) = self.previous_outputs.remove(port) {
            if Arc::strong_count(&previous) == 1 && previous.buffered_region() == &region {
                if let Ok(mut image) = downcast_owned::<Image<T>>(previous) {
                    if image.is_buffer_unique() {
                        log::debug!("Node {} reuses its '{}' buffer", self.node_id, port);
                        image.copy_information(&info);
                        image.allocate(region.clone(), fill)?;
                        image.set_requested_region(region);
                        return Ok(image);
                    }
                }
            }
        }

        let bytes = region.number_of_pixels().saturating_mul(std::mem::size_of::<T>());
        self.budget.reserve(bytes)?;
        let mut image = Image::<T>::from_info(&info);
        if let Err(error) = image.allocate(region.clone(), fill) {
            self.budget.release(bytes);
            return Err(error);
        }
        image.set_requested_region(region);
        Ok(image)
    }

    /// Publish a data object on `port`.
    pub fn set_output<O: DataObject>(&mut self, port: &str, data: O) -> ExecutionResult<()> {
        if !self.output_infos.contains_key(port) {
            return Err(ExecutionError::OutputNotSet {
                node_id: self.node_id,
                port: port.to_string(),
            });
        }
        self.outputs.insert(port.to_string(), Box::new(data));
        Ok(())
    }

    /// Publish another node's output as ours, sharing its storage.
    ///
    /// Regions and metadata are copied into a fresh object; the buffer is not.
    pub fn graft_output(&mut self, port: &str, data: &DataHandle) -> ExecutionResult<()> {
        if !self.output_infos.contains_key(port) {
            return Err(ExecutionError::OutputNotSet {
                node_id: self.node_id,
                port: port.to_string(),
            });
        }
        self.outputs.insert(port.to_string(), data.clone_object());
        Ok(())
    }

    /// Get all outputs (consumes them).
    pub fn take_outputs(&mut self) -> HashMap<String, Box<dyn DataObject>> {
        std::mem::take(&mut self.outputs)
    }

    // ========================================================================
    // Work units, progress, abort
    // ========================================================================

    pub fn number_of_work_units(&self) -> usize {
        self.work_units
    }

    pub fn memory_limit(&self) -> usize {
        self.budget.limit()
    }

    pub fn budget(&self) -> &Arc<MemoryBudget> {
        &self.budget
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Fail with `Aborted` if the abort flag is raised.
    pub fn check_aborted(&self) -> ExecutionResult<()> {
        if self.is_aborted() {
            Err(ExecutionError::Aborted {
                node_id: self.node_id,
            })
        } else {
            Ok(())
        }
    }

    /// Report the fraction of this node's work done.
    pub fn report_progress(&self, progress: f32) {
        self.progress.report(progress);
    }

    pub fn progress_reporter(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Run `body` over the disjoint work units of `image`'s buffered region.
    ///
    /// Each unit receives its sub-region and the matching slice of the
    /// buffer. The abort flag is polled before every unit, and progress is
    /// reported as units finish, scaled into `[progress_from, progress_to]`.
    pub fn run_work_units<T, F>(
        &self,
        image: &mut Image<T>,
        progress_from: f32,
        progress_to: f32,
        body: F,
    ) -> ExecutionResult<()>
    where
        T: NumericTraits,
        F: Fn(&ImageRegion, &mut [T]) -> ExecutionResult<()> + Sync,
    {
        let region = image.buffered_region().clone();
        let pieces = WorkUnitSplitter::split(&region, self.work_units);
        let total = pieces.len();
        let mut rest = image.buffer_mut();
        let mut units = Vec::with_capacity(total);
        for piece in pieces {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(piece.number_of_pixels());
            units.push((piece, head));
            rest = tail;
        }

        let done = AtomicUsize::new(0);
        units.into_par_iter().try_for_each(|(piece, slice)| -> ExecutionResult<()> {
            self.check_aborted()?;
            body(&piece, slice)?;
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            self.report_progress(
                progress_from + (progress_to - progress_from) * finished as f32 / total as f32,
            );
            Ok(())
        })?;
        self.check_aborted()
    }

    /// Run `body` over the work units of `region` and collect the results in
    /// buffer order. Used for read-only passes over inputs.
    pub fn map_work_units<R, F>(
        &self,
        region: &ImageRegion,
        progress_from: f32,
        progress_to: f32,
        body: F,
    ) -> ExecutionResult<Vec<R>>
    where
        R: Send,
        F: Fn(&ImageRegion) -> ExecutionResult<R> + Sync,
    {
        let pieces = WorkUnitSplitter::split(region, self.work_units);
        let total = pieces.len();
        let done = AtomicUsize::new(0);
        let results = pieces
            .par_iter()
            .map(|piece| {
                self.check_aborted()?;
                let result = body(piece)?;
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                self.report_progress(
                    progress_from + (progress_to - progress_from) * finished as f32 / total as f32,
                );
                Ok(result)
            })
            .collect::<ExecutionResult<Vec<R>>>()?;
        self.check_aborted()?;
        Ok(results)
    }
}

impl ParameterAccess for ExecutionContext {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node_id", &self.node_id)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.output_infos.keys().collect::<Vec<_>>())
            .field("work_units", &self.work_units)
            .finish()
    }
}
