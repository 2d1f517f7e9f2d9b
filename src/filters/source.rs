//! In-memory source node.

use crate::core::context::{ExecutionContext, InformationContext};
use crate::core::error::ExecutionResult;
use crate::core::image::{DataHandle, ImageInfo};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::PortDefinition;
use crate::core::types::PortType;
use std::collections::HashMap;

/// Publishes a data object that already lives in memory.
///
/// The output is a graft of the wrapped object: it shares the buffer and
/// never copies pixels.
#[derive(Debug, Clone)]
pub struct ImageSource {
    data: DataHandle,
}

impl ImageSource {
    pub const ID: &'static str = "image_source";
    pub const OUTPUT: &'static str = "output";

    pub fn new(data: DataHandle) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &DataHandle {
        &self.data
    }
}

impl FilterNode for ImageSource {
    fn metadata(&self) -> NodeMetadata {
        let info = self.data.info();
        NodeMetadata::builder(Self::ID, "Image Source")
            .description("Publish an in-memory image or label map")
            .category(Category::Input)
            .output(
                PortDefinition::output(Self::OUTPUT, PortType::for_data(&info.data_kind))
                    .with_description("The wrapped data object"),
            )
            .build()
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        Ok(HashMap::from([(Self::OUTPUT.to_string(), self.data.info())]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        ctx.graft_output(Self::OUTPUT, &self.data)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::{DataObject, Image};
    use crate::graph::PipelineGraph;
    use std::sync::Arc;

    #[test]
    fn test_source_grafts_without_copy() {
        let image = Image::filled(&[4, 4], 3u8);
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(Arc::new(image.clone()));
        graph.update(source).unwrap();

        let out = graph.output_image::<u8>(source, ImageSource::OUTPUT).unwrap();
        assert!(out.shares_buffer_with(&image));
        assert_eq!(out.largest_possible_region(), image.largest_possible_region());
        assert!(out.modified_time() > image.modified_time());
    }

    #[test]
    fn test_replacing_data_reruns_the_source() {
        let mut graph = PipelineGraph::new();
        let source = graph.add_source(Arc::new(Image::filled(&[2, 2], 1u8)));
        graph.update(source).unwrap();
        assert!(graph.update(source).unwrap().executed.is_empty());

        graph
            .set_source_data(source, Arc::new(Image::filled(&[3, 3], 7u8)))
            .unwrap();
        assert!(graph.update(source).unwrap().was_executed(source));
        let out = graph.output_image::<u8>(source, ImageSource::OUTPUT).unwrap();
        assert_eq!(out.get_pixel(&[2, 2]).unwrap(), 7);
    }

    #[test]
    fn test_only_sources_take_data() {
        let mut graph = PipelineGraph::new();
        let node = graph.add(crate::filters::Shrink::<u8>::new());
        let result = graph.set_source_data(node, Arc::new(Image::filled(&[2, 2], 1u8)));
        assert!(result.is_err());
    }
}
