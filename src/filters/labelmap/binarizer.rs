//! Rendering label maps back to binary images.

use crate::core::context::{ExecutionContext, InformationContext, ParameterAccess, RegionContext};
use crate::core::error::ExecutionResult;
use crate::core::image::{DataKind, ImageInfo};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::ScalarPixel;
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use crate::filters::labelmap::label_map::LabelMap;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Paints every object of a label map with the foreground value.
///
/// Pixels outside the objects take the background value, or are copied
/// from the optional `background_image` input. A background pixel equal to
/// the foreground value is replaced by the background value so that only
/// objects end up in the foreground.
#[derive(Debug, Clone, Default)]
pub struct LabelMapToBinary<T> {
    _pixel: PhantomData<T>,
}

impl<T: ScalarPixel> LabelMapToBinary<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: ScalarPixel> FilterNode for LabelMapToBinary<T> {
    fn metadata(&self) -> NodeMetadata {
        let port_type = PortType::Image(T::pixel_kind());
        NodeMetadata::builder(format!("label_map_to_binary_{}", T::KIND), "Label Map To Binary")
            .description("Render label objects as a binary image")
            .category(Category::LabelMap)
            .input(PortDefinition::input("input", PortType::LabelMap))
            .input(
                PortDefinition::input("background_image", port_type)
                    .optional()
                    .with_description("Pixels used outside the objects"),
            )
            .output(PortDefinition::output("output", port_type))
            .parameter(
                ParameterDefinition::new(
                    "foreground_value",
                    PortType::Pixel(T::pixel_kind()),
                    Value::Pixel(T::max_bound().to_pixel_value()),
                )
                .with_description("Value of object pixels"),
            )
            .parameter(
                ParameterDefinition::new(
                    "background_value",
                    PortType::Pixel(T::pixel_kind()),
                    Value::Pixel(T::nonpositive_min().to_pixel_value()),
                )
                .with_description("Value of the other pixels"),
            )
            .supports_progress()
            .build()
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        let info = ctx
            .input_info("input")?
            .clone()
            .with_kind(DataKind::Image(T::pixel_kind()));
        Ok(HashMap::from([("output".to_string(), info)]))
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let requested = ctx.output_requested_region("output")?.clone();
        let mut regions = HashMap::new();
        if ctx.input_info("background_image").is_ok() {
            let largest = &ctx.input_info("background_image")?.largest_possible_region;
            regions.insert("background_image".to_string(), requested.clipped_to(largest));
        }
        let largest = ctx.input_info("input")?.largest_possible_region.clone();
        let map_region = if requested.is_empty() {
            requested
        } else {
            largest
        };
        regions.insert("input".to_string(), map_region);
        Ok(regions)
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let foreground = ctx.get_pixel::<T>("foreground_value")?;
        let background = ctx.get_pixel::<T>("background_value")?;
        let map = ctx.input_object::<LabelMap>("input")?.clone();
        let background_image = if ctx.has_input("background_image") {
            Some(ctx.input_image::<T>("background_image")?.clone())
        } else {
            None
        };
        let mut output = ctx.allocate_output::<T>("output", background)?;

        ctx.run_work_units(&mut output, 0.0, 1.0, |piece, out| {
            if let Some(image) = &background_image {
                for (o, index) in out.iter_mut().zip(piece.indices()) {
                    let value = image.get_pixel(&index)?;
                    *o = if value == foreground { background } else { value };
                }
            }
            for object in map.objects() {
                for run in object.runs() {
                    let Some(clipped) = run.clipped_to(piece) else {
                        continue;
                    };
                    // clipped runs lie inside the piece
                    if let Some(offset) = piece.offset_of(&clipped.index) {
                        out[offset..offset + clipped.length].fill(foreground);
                    }
                }
            }
            Ok(())
        })?;

        ctx.set_output("output", output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
