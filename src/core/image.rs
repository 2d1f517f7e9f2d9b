//! Image data objects.
//!
//! An [`Image`] owns a pixel buffer plus the three regions the executor
//! tracks: the largest possible region (the full extent its source could
//! produce), the buffered region (what the buffer actually holds) and the
//! requested region (what its consumers currently need).
//!
//! Buffers live behind an `Arc`, so cloning an image or grafting it onto
//! another shares storage. Writing through [`Image::buffer_mut`] copies the
//! buffer first if anyone else still holds it.

use crate::core::error::{ExecutionError, ExecutionResult, RegionError};
use crate::core::numeric::{NumericTraits, PixelKind};
use crate::core::region::ImageRegion;
use crate::core::time::TimeStamp;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// What kind of data object travels on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "pixel")]
pub enum DataKind {
    /// Pixel image of the given pixel kind.
    Image(PixelKind),
    /// Run-length label map.
    LabelMap,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Image(kind) => write!(f, "Image<{}>", kind),
            DataKind::LabelMap => write!(f, "LabelMap"),
        }
    }
}

/// Everything known about a data object before its buffer exists.
///
/// This is what the information pass computes and propagates downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub data_kind: DataKind,
    pub largest_possible_region: ImageRegion,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    /// Row-major direction cosines, `dimension × dimension`.
    pub direction: Vec<f64>,
}

impl ImageInfo {
    /// Unit spacing, zero origin and identity direction.
    pub fn new(data_kind: DataKind, largest_possible_region: ImageRegion) -> Self {
        let dimension = largest_possible_region.dimension();
        Self {
            data_kind,
            largest_possible_region,
            spacing: vec![1.0; dimension],
            origin: vec![0.0; dimension],
            direction: identity_direction(dimension),
        }
    }

    pub fn dimension(&self) -> usize {
        self.largest_possible_region.dimension()
    }

    pub fn with_spacing(mut self, spacing: Vec<f64>) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: Vec<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// Same geometry, different payload kind.
    pub fn with_kind(mut self, data_kind: DataKind) -> Self {
        self.data_kind = data_kind;
        self
    }

    /// Physical volume of one pixel.
    pub fn pixel_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// Physical position of the pixel at `index`.
    pub fn physical_point(&self, index: &[i64]) -> Vec<f64> {
        let d = self.dimension();
        (0..d)
            .map(|row| {
                let rotated: f64 = (0..d)
                    .map(|col| self.direction[row * d + col] * self.spacing[col] * index[col] as f64)
                    .sum();
                self.origin[row] + rotated
            })
            .collect()
    }
}

fn identity_direction(dimension: usize) -> Vec<f64> {
    let mut direction = vec![0.0; dimension * dimension];
    for d in 0..dimension {
        direction[d * dimension + d] = 1.0;
    }
    direction
}

/// A region-tracked data object that can travel between filters.
pub trait DataObject: Any + Send + Sync + fmt::Debug {
    /// Kind and geometry, without the buffer.
    fn info(&self) -> ImageInfo;

    /// Extent actually held in memory.
    fn buffered_region(&self) -> &ImageRegion;

    /// Extent consumers currently need.
    fn requested_region(&self) -> &ImageRegion;

    fn set_requested_region(&mut self, region: ImageRegion);

    /// Time the content was last produced.
    fn modified_time(&self) -> TimeStamp;

    fn set_modified_time(&mut self, time: TimeStamp);

    /// Approximate memory held by the buffer.
    fn size_in_bytes(&self) -> usize;

    /// Shallow clone: regions and metadata are copied, storage is shared.
    fn clone_object(&self) -> Box<dyn DataObject>;

    /// Concrete type name, used in downcast errors.
    fn type_name(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared, read-only handle to a data object.
pub type DataHandle = Arc<dyn DataObject>;

/// Borrow the concrete object behind a handle.
pub fn downcast_ref<T: DataObject>(handle: &dyn DataObject) -> ExecutionResult<&T> {
    handle
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ExecutionError::DowncastFailure {
            expected: std::any::type_name::<T>().to_string(),
            found: handle.type_name(),
        })
}

/// Take the concrete object out of a handle, cloning only if it is shared.
pub fn downcast_owned<T: DataObject + Clone>(handle: DataHandle) -> ExecutionResult<T> {
    let found = handle.type_name();
    let any = handle.into_any_arc();
    let typed = any
        .downcast::<T>()
        .map_err(|_| ExecutionError::DowncastFailure {
            expected: std::any::type_name::<T>().to_string(),
            found,
        })?;
    Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone()))
}

/// An N-dimensional image of pixels `T`.
///
/// The buffer is laid out over the buffered region with axis 0 varying
/// fastest.
#[derive(Clone)]
pub struct Image<T> {
    buffer: Arc<Vec<T>>,
    largest_possible_region: ImageRegion,
    buffered_region: ImageRegion,
    requested_region: ImageRegion,
    spacing: Vec<f64>,
    origin: Vec<f64>,
    direction: Vec<f64>,
    modified_time: TimeStamp,
}

impl<T: NumericTraits> Image<T> {
    /// An image with geometry from `info` and no buffer yet.
    pub fn from_info(info: &ImageInfo) -> Self {
        let dimension = info.dimension();
        Self {
            buffer: Arc::new(Vec::new()),
            largest_possible_region: info.largest_possible_region.clone(),
            buffered_region: ImageRegion::empty_at(vec![0; dimension]),
            requested_region: info.largest_possible_region.clone(),
            spacing: info.spacing.clone(),
            origin: info.origin.clone(),
            direction: info.direction.clone(),
            modified_time: TimeStamp::ZERO,
        }
    }

    /// A fully buffered image of `size`, every pixel set to `value`.
    pub fn filled(size: &[usize], value: T) -> Self {
        let region = ImageRegion::from_size(size);
        let info = ImageInfo::new(DataKind::Image(T::pixel_kind()), region.clone());
        let mut image = Self::from_info(&info);
        image.buffer = Arc::new(vec![value; region.number_of_pixels()]);
        image.buffered_region = region;
        image.modified_time = TimeStamp::now();
        image
    }

    /// A fully buffered image of `size` over `data`.
    pub fn from_vec(size: &[usize], data: Vec<T>) -> Result<Self, RegionError> {
        let region = ImageRegion::from_size(size);
        if data.len() != region.number_of_pixels() {
            return Err(RegionError::DimensionMismatch {
                expected: region.number_of_pixels(),
                got: data.len(),
            });
        }
        let info = ImageInfo::new(DataKind::Image(T::pixel_kind()), region.clone());
        let mut image = Self::from_info(&info);
        image.buffer = Arc::new(data);
        image.buffered_region = region;
        image.modified_time = TimeStamp::now();
        Ok(image)
    }

    pub fn with_spacing(mut self, spacing: Vec<f64>) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: Vec<f64>) -> Self {
        self.origin = origin;
        self
    }

    pub fn dimension(&self) -> usize {
        self.largest_possible_region.dimension()
    }

    pub fn largest_possible_region(&self) -> &ImageRegion {
        &self.largest_possible_region
    }

    pub fn set_largest_possible_region(&mut self, region: ImageRegion) {
        self.largest_possible_region = region;
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    pub fn direction(&self) -> &[f64] {
        &self.direction
    }

    /// Replace geometry and largest region with those from `info`.
    pub fn copy_information(&mut self, info: &ImageInfo) {
        self.largest_possible_region = info.largest_possible_region.clone();
        self.spacing = info.spacing.clone();
        self.origin = info.origin.clone();
        self.direction = info.direction.clone();
    }

    /// Allocate a buffer over `region`, filled with `value`.
    ///
    /// The existing buffer is reused when it is not shared and already has
    /// the right length.
    pub fn allocate(&mut self, region: ImageRegion, value: T) -> ExecutionResult<()> {
        let pixels = region.number_of_pixels();
        let reusable = Arc::get_mut(&mut self.buffer).is_some_and(|b| b.len() == pixels);
        if reusable {
            Arc::make_mut(&mut self.buffer).fill(value);
        } else {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(pixels)
                .map_err(|_| ExecutionError::AllocationFailure {
                    bytes: pixels * std::mem::size_of::<T>(),
                    limit: isize::MAX as usize,
                })?;
            buffer.resize(pixels, value);
            self.buffer = Arc::new(buffer);
        }
        self.buffered_region = region;
        Ok(())
    }

    /// Whether this image is the only holder of its buffer.
    pub fn is_buffer_unique(&self) -> bool {
        Arc::strong_count(&self.buffer) == 1
    }

    /// Whether both images share the same storage.
    pub fn shares_buffer_with(&self, other: &Image<T>) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub fn buffer(&self) -> &[T] {
        &self.buffer
    }

    /// Mutable buffer, copied first if shared.
    pub fn buffer_mut(&mut self) -> &mut [T] {
        Arc::make_mut(&mut self.buffer).as_mut_slice()
    }

    /// Pixel at `index`, which must lie in the buffered region.
    pub fn get_pixel(&self, index: &[i64]) -> Result<T, RegionError> {
        self.buffered_region
            .offset_of(index)
            .map(|offset| self.buffer[offset])
            .ok_or_else(|| RegionError::IndexOutOfBounds {
                index: index.to_vec(),
                region: self.buffered_region.clone(),
            })
    }

    pub fn set_pixel(&mut self, index: &[i64], value: T) -> Result<(), RegionError> {
        let offset = self.buffered_region.offset_of(index).ok_or_else(|| {
            RegionError::IndexOutOfBounds {
                index: index.to_vec(),
                region: self.buffered_region.clone(),
            }
        })?;
        self.buffer_mut()[offset] = value;
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.buffer_mut().fill(value);
    }

    /// Adopt `other`'s buffer and bookkeeping without copying pixels.
    pub fn graft(&mut self, other: &Image<T>) {
        self.buffer = Arc::clone(&other.buffer);
        self.largest_possible_region = other.largest_possible_region.clone();
        self.buffered_region = other.buffered_region.clone();
        self.requested_region = other.requested_region.clone();
        self.spacing = other.spacing.clone();
        self.origin = other.origin.clone();
        self.direction = other.direction.clone();
    }

    /// Pixels of `region` in buffer order.
    pub fn region_pixels(&self, region: &ImageRegion) -> Result<Vec<T>, RegionError> {
        region.indices().map(|index| self.get_pixel(&index)).collect()
    }
}

impl<T> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("pixel", &std::any::type_name::<T>())
            .field("largest_possible_region", &self.largest_possible_region)
            .field("buffered_region", &self.buffered_region)
            .field("requested_region", &self.requested_region)
            .field("spacing", &self.spacing)
            .field("modified_time", &self.modified_time)
            .finish()
    }
}

impl<T: NumericTraits> DataObject for Image<T> {
    fn info(&self) -> ImageInfo {
        ImageInfo {
            data_kind: DataKind::Image(T::pixel_kind()),
            largest_possible_region: self.largest_possible_region.clone(),
            spacing: self.spacing.clone(),
            origin: self.origin.clone(),
            direction: self.direction.clone(),
        }
    }

    fn buffered_region(&self) -> &ImageRegion {
        &self.buffered_region
    }

    fn requested_region(&self) -> &ImageRegion {
        &self.requested_region
    }

    fn set_requested_region(&mut self, region: ImageRegion) {
        self.requested_region = region;
    }

    fn modified_time(&self) -> TimeStamp {
        self.modified_time
    }

    fn set_modified_time(&mut self, time: TimeStamp) {
        self.modified_time = time;
    }

    fn size_in_bytes(&self) -> usize {
        self.buffer.len() * std::mem::size_of::<T>()
    }

    fn clone_object(&self) -> Box<dyn DataObject> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> String {
        format!("Image<{}>", T::pixel_kind())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixel::Rgb;

    #[test]
    fn test_filled_image_regions() {
        let image = Image::filled(&[4, 3], 7u8);
        assert_eq!(image.buffered_region(), image.largest_possible_region());
        assert_eq!(image.requested_region(), image.largest_possible_region());
        assert_eq!(image.buffer().len(), 12);
        assert_eq!(image.get_pixel(&[3, 2]).unwrap(), 7);
        assert!(image.get_pixel(&[4, 0]).is_err());
    }

    #[test]
    fn test_graft_shares_buffer() {
        let source = Image::filled(&[2, 2], 1.5f32);
        let mut target = Image::<f32>::from_info(&source.info());
        target.graft(&source);
        assert!(target.shares_buffer_with(&source));
        assert_eq!(target.buffered_region(), source.buffered_region());

        target.set_pixel(&[0, 0], 9.0).unwrap();
        assert!(!target.shares_buffer_with(&source));
        assert_eq!(source.get_pixel(&[0, 0]).unwrap(), 1.5);
    }

    #[test]
    fn test_allocate_reuses_unique_buffer() {
        let mut image = Image::filled(&[3, 3], 0u16);
        let before = image.buffer().as_ptr();
        image.allocate(ImageRegion::from_size(&[3, 3]), 5).unwrap();
        assert_eq!(image.buffer().as_ptr(), before);
        assert!(image.buffer().iter().all(|&p| p == 5));
    }

    #[test]
    fn test_downcast() {
        let handle: DataHandle = Arc::new(Image::filled(&[2], Rgb::new(1u8, 2, 3)));
        assert!(downcast_ref::<Image<Rgb<u8>>>(handle.as_ref()).is_ok());
        let err = downcast_ref::<Image<u8>>(handle.as_ref()).unwrap_err();
        assert!(matches!(err, ExecutionError::DowncastFailure { .. }));

        let owned: Image<Rgb<u8>> = downcast_owned(handle).unwrap();
        assert_eq!(owned.get_pixel(&[1]).unwrap(), Rgb::new(1, 2, 3));
    }

    #[test]
    fn test_physical_point() {
        let info = ImageInfo::new(
            DataKind::Image(u8::pixel_kind()),
            ImageRegion::from_size(&[4, 4]),
        )
        .with_spacing(vec![0.5, 2.0])
        .with_origin(vec![10.0, 0.0]);
        assert_eq!(info.physical_point(&[2, 3]), vec![11.0, 6.0]);
        assert_eq!(info.pixel_volume(), 1.0);
    }
}
