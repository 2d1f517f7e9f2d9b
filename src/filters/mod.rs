//! Filters.
//!
//! Every filter implements [`FilterNode`](crate::core::node::FilterNode) and
//! is generic over the pixel type it processes.

pub mod intensity;
pub mod io;
pub mod labelmap;
pub mod shrink;
pub mod source;

pub use intensity::ShiftScale;
pub use io::{FilePixel, ImageFileReader, ImageFileWriter};
pub use labelmap::{
    BinaryImageToLabelMap, BinaryShapeOpening, LabelMap, LabelMapToBinary, ShapeAttribute,
    ShapeLabelMapValuator, ShapeOpeningLabelMap,
};
pub use shrink::Shrink;
pub use source::ImageSource;
