//! Attribute opening of label maps.

use crate::core::context::{ExecutionContext, ParameterAccess};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::image::ImageInfo;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use crate::filters::labelmap::attribute::ShapeAttribute;
use crate::filters::labelmap::label_map::{Label, LabelMap};
use crate::filters::labelmap::whole_map_when_requested;

/// Parameter definition listing every attribute name.
pub(crate) fn attribute_parameter() -> ParameterDefinition {
    ParameterDefinition::new(
        "attribute",
        PortType::String,
        Value::from(ShapeAttribute::default().name()),
    )
    .with_description("Shape attribute objects are compared on")
    .with_constraint(Constraint::OneOf(
        ShapeAttribute::ALL.iter().map(|a| Value::from(a.name())).collect(),
    ))
}

/// Read the `attribute` parameter.
pub(crate) fn attribute<C: ParameterAccess>(ctx: &C) -> ExecutionResult<ShapeAttribute> {
    ctx.get_string("attribute")?
        .parse::<ShapeAttribute>()
        .map_err(|e| ctx.invalid("attribute", &e))
}

/// Removes the objects whose attribute falls below `lambda`.
///
/// With `reverse_ordering` the comparison flips and objects above `lambda`
/// are removed. Objects exactly at `lambda` are always kept.
#[derive(Debug, Clone, Default)]
pub struct ShapeOpeningLabelMap;

impl ShapeOpeningLabelMap {
    pub fn new() -> Self {
        Self
    }
}

impl FilterNode for ShapeOpeningLabelMap {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("shape_opening_label_map", "Shape Opening Label Map")
            .description("Keep the label objects whose shape attribute passes a threshold")
            .category(Category::LabelMap)
            .input(
                PortDefinition::input("input", PortType::LabelMap)
                    .with_description("Label map with measured shapes"),
            )
            .output(PortDefinition::output("output", PortType::LabelMap))
            .parameter(
                ParameterDefinition::new("lambda", PortType::Float, Value::Float(0.0))
                    .with_description("Threshold on the attribute"),
            )
            .parameter(
                ParameterDefinition::new("reverse_ordering", PortType::Boolean, Value::Boolean(false))
                    .with_description("Keep objects at or below lambda instead"),
            )
            .parameter(attribute_parameter())
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

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let lambda = ctx.get_float("lambda")?;
        let reverse = ctx.get_bool("reverse_ordering")?;
        let attribute = attribute(ctx)?;
        let mut map = ctx.take_input_object::<LabelMap>("input")?;

        let mut removed: Vec<Label> = Vec::new();
        for object in map.objects() {
            let value = object
                .shape
                .as_ref()
                .and_then(|shape| attribute.value(shape))
                .ok_or_else(|| ExecutionError::NodeExecution {
                    node_id: ctx.node_id,
                    error: format!("object {} has no measured {}", object.label, attribute),
                })?;
            let keep = if reverse { value <= lambda } else { value >= lambda };
            if !keep {
                removed.push(object.label);
            }
        }
        ctx.check_aborted()?;

        for label in &removed {
            map.remove_label(*label);
        }
        log::debug!(
            "Node {} removed {} objects on {} {} {}",
            ctx.node_id,
            removed.len(),
            attribute,
            if reverse { ">" } else { "<" },
            lambda
        );
        ctx.report_progress(1.0);
        ctx.set_output("output", map)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::DataKind;
    use crate::filters::labelmap::label_map::{LabelObject, Run};
    use crate::filters::labelmap::valuator::ShapeLabelMapValuator;
    use crate::graph::PipelineGraph;
    use std::sync::Arc;

    /// Objects of 1, 2 and 3 pixels on separate rows.
    fn map() -> LabelMap {
        let info = ImageInfo::new(DataKind::LabelMap, ImageRegion::from_size(&[4, 6]));
        let mut map = LabelMap::new(&info, 0);
        for (label, length) in [(1, 1), (2, 2), (3, 3)] {
            let mut object = LabelObject::new(label);
            object.add_run(Run::new(vec![0, 2 * label as i64 - 1], length));
            map.push_object(object);
        }
        map
    }

    fn open(lambda: f64, reverse: bool) -> LabelMap {
        let mut graph = PipelineGraph::new();
        let valuator = graph.add(ShapeLabelMapValuator::new());
        let opening = graph.add(ShapeOpeningLabelMap::new());
        graph.set_input(valuator, "input", Arc::new(map())).unwrap();
        graph.connect(valuator, "output", opening, "input").unwrap();
        graph.set_parameter(opening, "lambda", lambda).unwrap();
        graph.set_parameter(opening, "reverse_ordering", reverse).unwrap();
        graph.update(opening).unwrap();
        graph.output_object::<LabelMap>(opening, "output").unwrap()
    }

    #[test]
    fn test_keeps_objects_at_lambda() {
        assert_eq!(open(2.0, false).labels(), vec![2, 3]);
        assert_eq!(open(2.0, true).labels(), vec![1, 2]);
        assert_eq!(open(0.0, false).labels(), vec![1, 2, 3]);
    }

    #[test]
    fn test_input_map_is_not_modified() {
        let mut graph = PipelineGraph::new();
        let valuator = graph.add(ShapeLabelMapValuator::new());
        let opening = graph.add(ShapeOpeningLabelMap::new());
        graph.set_input(valuator, "input", Arc::new(map())).unwrap();
        graph.connect(valuator, "output", opening, "input").unwrap();
        graph.set_parameter(opening, "lambda", 3.0).unwrap();
        graph.update(opening).unwrap();

        let measured = graph.output_object::<LabelMap>(valuator, "output").unwrap();
        assert_eq!(measured.number_of_objects(), 3);
        let opened = graph.output_object::<LabelMap>(opening, "output").unwrap();
        assert_eq!(opened.labels(), vec![3]);
    }

    #[test]
    fn test_unmeasured_attribute_fails() {
        let mut graph = PipelineGraph::new();
        let valuator = graph.add(ShapeLabelMapValuator::new());
        let opening = graph.add(ShapeOpeningLabelMap::new());
        graph.set_input(valuator, "input", Arc::new(map())).unwrap();
        graph.connect(valuator, "output", opening, "input").unwrap();
        graph.set_parameter(opening, "attribute", "feret_diameter").unwrap();
        assert!(graph.update(opening).is_err());
        // the valuator still holds its result
        assert!(graph.output(valuator, "output").is_ok());
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let mut graph = PipelineGraph::new();
        let opening = graph.add(ShapeOpeningLabelMap::new());
        graph.set_input(opening, "input", Arc::new(map())).unwrap();
        graph.set_parameter(opening, "attribute", "area").unwrap();
        assert!(graph.update(opening).is_err());
    }
}
