//! Label maps and the filters that build, measure and render them.
//!
//! A [`LabelMap`] stores connected objects as runs along axis 0 instead of a
//! pixel buffer, so the stages in between labeling and rendering work on
//! whole objects. Label maps always cover their largest possible region.

pub mod attribute;
pub mod binarizer;
pub mod label_map;
pub mod labelizer;
pub mod opening;
pub mod shape_opening;
pub mod valuator;

pub use attribute::{ShapeAttribute, ShapeAttributes};
pub use binarizer::LabelMapToBinary;
pub use label_map::{Label, LabelMap, LabelObject, Run};
pub use labelizer::BinaryImageToLabelMap;
pub use opening::ShapeOpeningLabelMap;
pub use shape_opening::BinaryShapeOpening;
pub use valuator::ShapeLabelMapValuator;

use crate::core::image::ImageInfo;
use crate::core::region::ImageRegion;

/// Any non-empty request grows to the whole largest possible region.
pub(crate) fn whole_map_when_requested(info: &ImageInfo, requested: ImageRegion) -> ImageRegion {
    if requested.is_empty() {
        requested
    } else {
        info.largest_possible_region.clone()
    }
}
