//! Binary shape opening, built from the label-map stages.

use crate::core::context::{ExecutionContext, ParameterAccess, RegionContext};
use crate::core::error::{ExecutionResult, FlowError, GraphResult, NodeId};
use crate::core::image::ImageInfo;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::ScalarPixel;
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use crate::execution::engine::ExecutionOptions;
use crate::execution::progress::ProgressAccumulator;
use crate::filters::labelmap::binarizer::LabelMapToBinary;
use crate::filters::labelmap::labelizer::BinaryImageToLabelMap;
use crate::filters::labelmap::opening::{attribute, attribute_parameter, ShapeOpeningLabelMap};
use crate::filters::labelmap::valuator::ShapeLabelMapValuator;
use crate::filters::labelmap::whole_map_when_requested;
use crate::filters::source::ImageSource;
use crate::graph::PipelineGraph;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Share of the composite's work done by each internal stage.
pub const LABELIZER_WEIGHT: f32 = 0.3;
pub const VALUATOR_WEIGHT: f32 = 0.3;
pub const OPENING_WEIGHT: f32 = 0.2;
pub const BINARIZER_WEIGHT: f32 = 0.2;

/// Removes the connected foreground objects whose shape attribute falls
/// below `lambda` (above it with `reverse_ordering`).
///
/// Internally runs a small pipeline: the input is labeled, the objects are
/// measured and filtered, and the survivors are painted back over the
/// input. Pixels that are not foreground pass through unchanged. Progress
/// of the stages is folded into this node's own progress.
#[derive(Debug, Clone, Default)]
pub struct BinaryShapeOpening<T> {
    _pixel: PhantomData<T>,
}

impl<T: ScalarPixel> BinaryShapeOpening<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: ScalarPixel> FilterNode for BinaryShapeOpening<T> {
    fn metadata(&self) -> NodeMetadata {
        let port_type = PortType::Image(T::pixel_kind());
        let pixel_type = PortType::Pixel(T::pixel_kind());
        NodeMetadata::builder(format!("binary_shape_opening_{}", T::KIND), "Binary Shape Opening")
            .description("Remove binary objects whose shape attribute is below a threshold")
            .category(Category::Morphology)
            .input(PortDefinition::input("input", port_type).with_description("Binary image"))
            .output(PortDefinition::output("output", port_type))
            .parameter(
                ParameterDefinition::new(
                    "background_value",
                    pixel_type,
                    Value::Pixel(T::nonpositive_min().to_pixel_value()),
                )
                .with_description("Value given to removed object pixels"),
            )
            .parameter(
                ParameterDefinition::new(
                    "foreground_value",
                    pixel_type,
                    Value::Pixel(T::max_bound().to_pixel_value()),
                )
                .with_description("Value of object pixels"),
            )
            .parameter(
                ParameterDefinition::new("fully_connected", PortType::Boolean, Value::Boolean(false))
                    .with_description("Join pixels that touch on an edge or corner"),
            )
            .parameter(
                ParameterDefinition::new("reverse_ordering", PortType::Boolean, Value::Boolean(false))
                    .with_description("Remove objects above lambda instead"),
            )
            .parameter(
                ParameterDefinition::new("lambda", PortType::Float, Value::Float(0.0))
                    .with_description("Threshold on the attribute"),
            )
            .parameter(attribute_parameter())
            .tags(["morphology", "label map", "opening"])
            .supports_progress()
            .build()
    }

    fn enlarge_output_requested_region(
        &self,
        _port: &str,
        info: &ImageInfo,
        requested: ImageRegion,
    ) -> ImageRegion {
        whole_map_when_requested(info, requested)
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let largest = ctx.input_info("input")?.largest_possible_region.clone();
        Ok(HashMap::from([("input".to_string(), largest)]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let background = ctx.get_pixel::<T>("background_value")?;
        let foreground = ctx.get_pixel::<T>("foreground_value")?;
        let fully_connected = ctx.get_bool("fully_connected")?;
        let reverse = ctx.get_bool("reverse_ordering")?;
        let lambda = ctx.get_float("lambda")?;
        let attribute = attribute(ctx)?;
        let input = Arc::clone(ctx.input_data("input")?);
        let requested = ctx.output_requested_region("output")?.clone();

        let mut mini = PipelineGraph::new();
        let source = mini.add_source(input);
        let stages = Stages {
            labelizer: mini.add(BinaryImageToLabelMap::<T>::new()),
            valuator: mini.add(ShapeLabelMapValuator::new()),
            opening: mini.add(ShapeOpeningLabelMap::new()),
            binarizer: mini.add(LabelMapToBinary::<T>::new()),
        };
        let binarizer = stages.binarizer;
        stages
            .wire(&mut mini, source)
            .and_then(|()| {
                mini.set_parameter(stages.labelizer, "fully_connected", fully_connected)?;
                mini.set_parameter(stages.labelizer, "input_foreground_value", foreground.to_pixel_value())?;
                mini.set_parameter(stages.valuator, "compute_perimeter", attribute.requires_perimeter())?;
                mini.set_parameter(
                    stages.valuator,
                    "compute_feret_diameter",
                    attribute.requires_feret_diameter(),
                )?;
                mini.set_parameter(stages.opening, "lambda", lambda)?;
                mini.set_parameter(stages.opening, "reverse_ordering", reverse)?;
                mini.set_parameter(stages.opening, "attribute", attribute.name())?;
                mini.set_parameter(binarizer, "foreground_value", foreground.to_pixel_value())?;
                mini.set_parameter(binarizer, "background_value", background.to_pixel_value())
            })
            .map_err(FlowError::from)?;

        let accumulator = ProgressAccumulator::new(ctx.progress_reporter().clone());
        for (stage, weight) in stages.weighted() {
            accumulator.register_internal_filter(stage, weight);
            mini.set_number_of_work_units(stage, ctx.number_of_work_units())
                .map_err(FlowError::from)?;
            mini.add_observer(stage, accumulator.observer())
                .map_err(FlowError::from)?;
        }
        accumulator.check_weights();
        mini.set_output_requested_region(binarizer, requested)
            .map_err(FlowError::from)?;

        let options = ExecutionOptions::new()
            .with_work_units(ctx.number_of_work_units())
            .with_abort_flag(ctx.abort_flag())
            .with_shared_budget(Arc::clone(ctx.budget()));
        if let Err(error) = mini.update_with(binarizer, options) {
            ctx.check_aborted()?;
            return Err(error.into());
        }

        log::debug!(
            "Node {} opened on {} with lambda {}",
            ctx.node_id,
            attribute,
            lambda
        );
        let output = mini.output(binarizer, "output")?;
        ctx.graft_output("output", &output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Internal nodes of the opening pipeline.
#[derive(Debug, Clone, Copy)]
struct Stages {
    labelizer: NodeId,
    valuator: NodeId,
    opening: NodeId,
    binarizer: NodeId,
}

impl Stages {
    /// source -> labelizer -> valuator -> opening -> binarizer, with the
    /// source also feeding the binarizer's background.
    fn wire(&self, graph: &mut PipelineGraph, source: NodeId) -> GraphResult<()> {
        graph.connect(source, ImageSource::OUTPUT, self.labelizer, "input")?;
        graph.connect(self.labelizer, "output", self.valuator, "input")?;
        graph.connect(self.valuator, "output", self.opening, "input")?;
        graph.connect(self.opening, "output", self.binarizer, "input")?;
        graph.connect(source, ImageSource::OUTPUT, self.binarizer, "background_image")?;
        Ok(())
    }

    fn weighted(&self) -> [(NodeId, f32); 4] {
        [
            (self.labelizer, LABELIZER_WEIGHT),
            (self.valuator, VALUATOR_WEIGHT),
            (self.opening, OPENING_WEIGHT),
            (self.binarizer, BINARIZER_WEIGHT),
        ]
    }
}
