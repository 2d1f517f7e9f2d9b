//! Image file readers and writers.
//!
//! Files go through the `image` crate, so only 2-D images in the formats it
//! was built with (PNG, TIFF) are supported.

use crate::core::context::{ExecutionContext, InformationContext, ParameterAccess};
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};
use crate::core::image::{DataKind, DataObject, Image, ImageInfo};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::NumericTraits;
use crate::core::pixel::{Rgb, Rgba};
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use image::{DynamicImage, ImageBuffer};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Pixel types that can be loaded from and stored to image files.
pub trait FilePixel: NumericTraits {
    /// Convert a decoded image, row by row.
    fn from_dynamic(image: DynamicImage) -> Vec<Self>;

    /// Wrap `width × height` pixels for encoding.
    fn to_dynamic(width: u32, height: u32, pixels: &[Self]) -> Option<DynamicImage>;
}

impl FilePixel for u8 {
    fn from_dynamic(image: DynamicImage) -> Vec<Self> {
        image.into_luma8().into_raw()
    }

    fn to_dynamic(width: u32, height: u32, pixels: &[Self]) -> Option<DynamicImage> {
        ImageBuffer::from_raw(width, height, pixels.to_vec()).map(DynamicImage::ImageLuma8)
    }
}

impl FilePixel for u16 {
    fn from_dynamic(image: DynamicImage) -> Vec<Self> {
        image.into_luma16().into_raw()
    }

    fn to_dynamic(width: u32, height: u32, pixels: &[Self]) -> Option<DynamicImage> {
        ImageBuffer::from_raw(width, height, pixels.to_vec()).map(DynamicImage::ImageLuma16)
    }
}

impl FilePixel for Rgb<u8> {
    fn from_dynamic(image: DynamicImage) -> Vec<Self> {
        image
            .into_rgb8()
            .pixels()
            .map(|p| Rgb(p.0))
            .collect()
    }

    fn to_dynamic(width: u32, height: u32, pixels: &[Self]) -> Option<DynamicImage> {
        let raw: Vec<u8> = pixels.iter().flat_map(|p| p.0).collect();
        ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgb8)
    }
}

impl FilePixel for Rgba<u8> {
    fn from_dynamic(image: DynamicImage) -> Vec<Self> {
        image
            .into_rgba8()
            .pixels()
            .map(|p| Rgba(p.0))
            .collect()
    }

    fn to_dynamic(width: u32, height: u32, pixels: &[Self]) -> Option<DynamicImage> {
        let raw: Vec<u8> = pixels.iter().flat_map(|p| p.0).collect();
        ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgba8)
    }
}

fn path_parameter() -> ParameterDefinition {
    ParameterDefinition::new("path", PortType::String, Value::String(String::new()))
        .with_description("Path to the image file")
        .with_constraint(Constraint::NotEmpty)
}

fn file_error(node_id: NodeId, action: &str, path: &str, error: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::NodeExecution {
        node_id,
        error: format!("Failed to {} '{}': {}", action, path, error),
    }
}

/// Reads a 2-D image file.
///
/// The header is read during the information pass; pixels are decoded only
/// when the node executes. The whole file is always buffered.
#[derive(Debug, Clone, Default)]
pub struct ImageFileReader<T> {
    _pixel: PhantomData<T>,
}

impl<T: FilePixel> ImageFileReader<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: FilePixel> FilterNode for ImageFileReader<T> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder(format!("image_file_reader_{}", T::pixel_kind()), "Image File Reader")
            .description("Load a 2-D image from disk")
            .category(Category::Input)
            .output(
                PortDefinition::output("output", PortType::Image(T::pixel_kind()))
                    .with_description("The loaded image"),
            )
            .parameter(path_parameter())
            .build()
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        let path = ctx.get_string("path")?;
        let (width, height) = image::image_dimensions(path)
            .map_err(|e| file_error(ctx.node_id, "read header of", path, e))?;
        let region = ImageRegion::from_size(&[width as usize, height as usize]);
        let info = ImageInfo::new(DataKind::Image(T::pixel_kind()), region);
        Ok(HashMap::from([("output".to_string(), info)]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let path = ctx.get_string("path")?.to_string();
        let info = ctx.output_info("output")?.clone();
        let requested = ctx.output_requested_region("output")?.clone();

        let bytes = info.largest_possible_region.number_of_pixels() * std::mem::size_of::<T>();
        ctx.budget().reserve(bytes)?;
        log::debug!("Reading {} ({} bytes)", path, bytes);

        let decoded = image::open(&path).map_err(|e| file_error(ctx.node_id, "read", &path, e))?;
        let mut image = Image::<T>::from_vec(info.largest_possible_region.size(), T::from_dynamic(decoded))?;
        image.copy_information(&info);
        image.set_requested_region(requested);
        ctx.report_progress(1.0);
        ctx.set_output("output", image)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Writes its input to a 2-D image file.
///
/// The writer has no outputs; updating it brings its input up to date and
/// writes the file.
#[derive(Debug, Clone, Default)]
pub struct ImageFileWriter<T> {
    _pixel: PhantomData<T>,
}

impl<T: FilePixel> ImageFileWriter<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: FilePixel> FilterNode for ImageFileWriter<T> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder(format!("image_file_writer_{}", T::pixel_kind()), "Image File Writer")
            .description("Save a 2-D image to disk; the format follows the extension")
            .category(Category::Output)
            .input(
                PortDefinition::input("input", PortType::Image(T::pixel_kind()))
                    .with_description("Image to save"),
            )
            .parameter(path_parameter())
            .build()
    }

    fn generate_output_information(
        &self,
        _ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        Ok(HashMap::new())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let path = ctx.get_string("path")?.to_string();
        let input = ctx.input_image::<T>("input")?;
        let largest = input.largest_possible_region();
        let [width, height] = largest.size() else {
            return Err(ExecutionError::NodeExecution {
                node_id: ctx.node_id,
                error: format!("only 2-D images can be written, got {} axes", largest.dimension()),
            });
        };

        let pixels = input.region_pixels(largest)?;
        let encoded = T::to_dynamic(*width as u32, *height as u32, &pixels).ok_or_else(|| {
            ExecutionError::NodeExecution {
                node_id: ctx.node_id,
                error: "pixel count does not match the image size".to_string(),
            }
        })?;
        encoded
            .save(&path)
            .map_err(|e| file_error(ctx.node_id, "write", &path, e))?;
        log::info!("Wrote {}", path);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
