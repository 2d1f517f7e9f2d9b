//! FilterNode trait and node metadata.
//!
//! A filter takes part in three passes of every update:
//!
//! 1. **Information** (`generate_output_information`): derive output
//!    metadata (largest region, spacing, pixel kind) from input metadata.
//! 2. **Requested region** (`enlarge_output_requested_region`,
//!    `generate_input_requested_region`): decide how much of each input is
//!    needed to produce the region asked of the outputs.
//! 3. **Data** (`generate_data`): fill the outputs over their requested
//!    regions.
//!
//! Only the third pass touches pixels, and it only runs for stale nodes.

use crate::core::context::{ExecutionContext, InformationContext, RegionContext};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::image::{DataKind, ImageInfo};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::PortType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category for organizing filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Sources and file readers
    Input,
    /// File writers
    Output,
    /// Geometry changes (shrink, pad)
    Transform,
    /// Pixel-wise intensity mappings
    Intensity,
    /// Label-map construction and attribute filtering
    LabelMap,
    /// Mathematical morphology
    Morphology,
    /// Utility nodes
    Utility,
    #[default]
    Custom,
}

/// Metadata describing a filter node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Unique identifier for this filter type (e.g., "binary_shape_opening")
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub category: Category,
    pub description: String,

    /// Input port definitions
    pub inputs: Vec<PortDefinition>,
    /// Output port definitions, the first one is the primary output
    pub outputs: Vec<PortDefinition>,
    /// Parameter definitions
    pub parameters: Vec<ParameterDefinition>,

    /// Searchable tags
    pub tags: Vec<String>,
    /// Whether the filter reports progress while generating data
    pub supports_progress: bool,
}

impl NodeMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeMetadataBuilder {
        NodeMetadataBuilder::new(id, name)
    }

    /// Find an input port by name.
    pub fn get_input(&self, name: &str) -> Option<&PortDefinition> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Find an output port by name.
    pub fn get_output(&self, name: &str) -> Option<&PortDefinition> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Find a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Name of the first declared output.
    pub fn primary_output(&self) -> Option<&str> {
        self.outputs.first().map(|p| p.name.as_str())
    }

    /// Default values of all declared parameters.
    pub fn default_parameters(&self) -> HashMap<String, crate::core::types::Value> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.default_value.clone()))
            .collect()
    }
}

/// Builder for NodeMetadata.
pub struct NodeMetadataBuilder {
    id: String,
    name: String,
    category: Category,
    description: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    tags: Vec<String>,
    supports_progress: bool,
}

impl NodeMetadataBuilder {
    /// Create a new builder with required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: Category::Custom,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            tags: Vec::new(),
            supports_progress: false,
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an input port.
    pub fn input(mut self, port: PortDefinition) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add an output port.
    pub fn output(mut self, port: PortDefinition) -> Self {
        self.outputs.push(port);
        self
    }

    /// Add a parameter.
    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add multiple tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    /// Mark as supporting progress reporting.
    pub fn supports_progress(mut self) -> Self {
        self.supports_progress = true;
        self
    }

    /// Build the metadata.
    pub fn build(self) -> NodeMetadata {
        NodeMetadata {
            id: self.id,
            name: self.name,
            category: self.category,
            description: self.description,
            inputs: self.inputs,
            outputs: self.outputs,
            parameters: self.parameters,
            tags: self.tags,
            supports_progress: self.supports_progress,
        }
    }
}

/// The core trait for filter nodes.
///
/// Only `metadata`, `generate_data` and `clone_box` are required. The
/// defaults of the other hooks suit filters whose outputs share the
/// geometry of their first input and need exactly the requested pixels
/// of every input.
///
/// # Example Implementation
///
/// ```ignore
/// #[derive(Clone)]
/// struct Invert;
///
/// impl FilterNode for Invert {
///     fn metadata(&self) -> NodeMetadata {
///         NodeMetadata::builder("invert", "Invert")
///             .input(PortDefinition::input("input", PortType::Image(u8::pixel_kind())))
///             .output(PortDefinition::output("output", PortType::Image(u8::pixel_kind())))
///             .build()
///     }
///
///     fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
///         let input = ctx.input_image::<u8>("input")?.clone();
///         let mut output = ctx.allocate_output::<u8>("output", 0)?;
///         ctx.run_work_units(&mut output, 0.0, 1.0, |region, out| {
///             for (o, index) in out.iter_mut().zip(region.indices()) {
///                 *o = 255 - input.get_pixel(&index)?;
///             }
///             Ok(())
///         })?;
///         ctx.set_output("output", output)
///     }
///
///     fn clone_box(&self) -> Box<dyn FilterNode> {
///         Box::new(self.clone())
///     }
/// }
/// ```
pub trait FilterNode: Send + Sync {
    /// Get the metadata for this filter.
    fn metadata(&self) -> NodeMetadata;

    /// Derive the metadata of every output from the inputs' metadata.
    ///
    /// The default copies the first connected input's information to every
    /// output, taking the pixel kind from the output port's type.
    fn generate_output_information(
        &self,
        ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        let metadata = self.metadata();
        let source = metadata
            .inputs
            .iter()
            .find_map(|port| ctx.input_info(&port.name).ok())
            .ok_or_else(|| ExecutionError::NodeExecution {
                node_id: ctx.node_id,
                error: "no connected input to derive output information from".to_string(),
            })?;

        Ok(metadata
            .outputs
            .iter()
            .map(|port| {
                let kind = match port.port_type {
                    PortType::Image(kind) => DataKind::Image(kind),
                    PortType::LabelMap => DataKind::LabelMap,
                    _ => source.data_kind,
                };
                (port.name.clone(), source.clone().with_kind(kind))
            })
            .collect())
    }

    /// Grow the region requested from `port` before it is propagated
    /// upstream. The default leaves it unchanged.
    fn enlarge_output_requested_region(
        &self,
        _port: &str,
        _info: &ImageInfo,
        requested: ImageRegion,
    ) -> ImageRegion {
        requested
    }

    /// Regions needed from each connected input.
    ///
    /// The default asks every input for the primary output's requested
    /// region, clipped to the input's largest possible region. Inputs of a
    /// different dimension are asked for everything.
    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let requested = ctx.primary_requested_region();
        let mut regions = HashMap::new();
        for port in ctx.input_ports() {
            let largest = &ctx.input_info(port)?.largest_possible_region;
            let region = match requested {
                Some(r) if r.dimension() == largest.dimension() => r.clipped_to(largest),
                _ => largest.clone(),
            };
            regions.insert(port.to_string(), region);
        }
        Ok(regions)
    }

    /// Produce the outputs over their requested regions.
    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()>;

    /// Clone this node into a boxed trait object.
    fn clone_box(&self) -> Box<dyn FilterNode>;
}

impl Clone for Box<dyn FilterNode> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeId;
    use crate::core::types::Value;
    use crate::core::numeric::{NumericTraits, ScalarKind};
    use crate::core::numeric::PixelKind;

    #[derive(Clone)]
    struct Cast;

    impl FilterNode for Cast {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder("cast", "Cast")
                .category(Category::Intensity)
                .input(PortDefinition::input("input", PortType::AnyImage))
                .output(PortDefinition::output(
                    "output",
                    PortType::Image(PixelKind::scalar(ScalarKind::F32)),
                ))
                .build()
        }

        fn generate_data(&self, _ctx: &mut ExecutionContext) -> ExecutionResult<()> {
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn FilterNode> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_primary_output_is_the_first_declared() {
        let metadata = NodeMetadata::builder("label_stats", "Label Stats")
            .category(Category::LabelMap)
            .input(PortDefinition::input("input", PortType::LabelMap))
            .input(PortDefinition::input("mask", PortType::AnyImage).optional())
            .output(PortDefinition::output("map", PortType::LabelMap))
            .output(PortDefinition::output("count", PortType::AnyImage))
            .parameter(ParameterDefinition::new("lambda", PortType::Float, 0.0.into()))
            .build();

        assert_eq!(metadata.primary_output(), Some("map"));
        assert!(metadata.get_input("mask").is_some_and(|p| p.optional));
        assert!(metadata.get_output("input").is_none());
        assert_eq!(metadata.default_parameters()["lambda"], Value::Float(0.0));
    }

    #[test]
    fn test_default_output_information_takes_port_kind() {
        let mut ctx = InformationContext::new(NodeId::new(), HashMap::new());
        let info = ImageInfo::new(
            DataKind::Image(u8::pixel_kind()),
            ImageRegion::from_size(&[4, 3]),
        )
        .with_spacing(vec![0.5, 2.0]);
        ctx.add_input("input", info);

        let outputs = Cast.generate_output_information(&ctx).unwrap();
        let out = &outputs["output"];
        assert_eq!(out.data_kind, DataKind::Image(f32::pixel_kind()));
        assert_eq!(out.spacing, vec![0.5, 2.0]);
        assert_eq!(out.largest_possible_region, ImageRegion::from_size(&[4, 3]));
    }

    #[test]
    fn test_default_input_request_is_clipped() {
        let largest = ImageRegion::from_size(&[10, 10]);
        let info = ImageInfo::new(DataKind::Image(u8::pixel_kind()), largest.clone());
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), info.clone());
        let mut requested = HashMap::new();
        requested.insert(
            "output".to_string(),
            ImageRegion::new(vec![5, -2], vec![10, 4]).unwrap(),
        );
        let ctx = RegionContext::new(
            NodeId::new(),
            HashMap::new(),
            inputs,
            HashMap::new(),
            requested,
            Some("output".to_string()),
        );

        let regions = Cast.generate_input_requested_region(&ctx).unwrap();
        assert_eq!(
            regions["input"],
            ImageRegion::new(vec![5, 0], vec![5, 2]).unwrap()
        );
    }

    #[test]
    fn test_no_input_is_an_error() {
        let ctx = InformationContext::new(NodeId::new(), HashMap::new());
        assert!(matches!(
            Cast.generate_output_information(&ctx),
            Err(ExecutionError::NodeExecution { .. })
        ));
    }
}
