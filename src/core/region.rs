//! Rectangular N-dimensional regions of an image's index space.
//!
//! A region is an `index` (the first pixel) plus a `size` per axis. Every
//! propagation decision the executor makes is phrased in terms of these
//! values: containment, clipping against the largest possible region and the
//! bounding union of several consumers' requests.
//!
//! Buffers are laid out row-major with axis 0 varying fastest, so a "line" is
//! a run of pixels along axis 0.

use crate::core::error::RegionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned index + size sub-volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageRegion {
    index: Vec<i64>,
    size: Vec<usize>,
}

impl ImageRegion {
    /// Create a region from a start index and a size.
    pub fn new(index: Vec<i64>, size: Vec<usize>) -> Result<Self, RegionError> {
        if index.len() != size.len() {
            return Err(RegionError::DimensionMismatch {
                expected: index.len(),
                got: size.len(),
            });
        }
        Ok(Self { index, size })
    }

    /// Create a region starting at the origin index.
    pub fn from_size(size: &[usize]) -> Self {
        Self {
            index: vec![0; size.len()],
            size: size.to_vec(),
        }
    }

    /// An empty region of the given dimension anchored at `index`.
    pub fn empty_at(index: Vec<i64>) -> Self {
        let size = vec![0; index.len()];
        Self { index, size }
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.size.len()
    }

    /// Start index.
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Extent along every axis.
    pub fn size(&self) -> &[usize] {
        &self.size
    }

    /// Total number of pixels covered.
    pub fn number_of_pixels(&self) -> usize {
        self.size.iter().product()
    }

    /// Whether the region covers no pixel at all.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// One past the last index on every axis.
    pub fn upper_index(&self) -> Vec<i64> {
        self.index
            .iter()
            .zip(&self.size)
            .map(|(&i, &s)| i + s as i64)
            .collect()
    }

    /// Whether `index` lies inside this region.
    pub fn is_inside_index(&self, index: &[i64]) -> bool {
        index.len() == self.dimension()
            && index
                .iter()
                .zip(self.index.iter().zip(&self.size))
                .all(|(&p, (&start, &size))| p >= start && p < start + size as i64)
    }

    /// Whether this region is a subset of `other`.
    ///
    /// An empty region is inside every region of the same dimension.
    pub fn is_inside(&self, other: &ImageRegion) -> bool {
        if self.dimension() != other.dimension() {
            return false;
        }
        if self.is_empty() {
            return true;
        }
        let upper = self.upper_index();
        let other_upper = other.upper_index();
        (0..self.dimension())
            .all(|d| self.index[d] >= other.index[d] && upper[d] <= other_upper[d])
    }

    /// Overlap of two regions, `None` when they share no pixel.
    pub fn intersection(&self, other: &ImageRegion) -> Option<ImageRegion> {
        if self.dimension() != other.dimension() || self.is_empty() || other.is_empty() {
            return None;
        }
        let upper = self.upper_index();
        let other_upper = other.upper_index();
        let mut index = Vec::with_capacity(self.dimension());
        let mut size = Vec::with_capacity(self.dimension());
        for d in 0..self.dimension() {
            let start = self.index[d].max(other.index[d]);
            let end = upper[d].min(other_upper[d]);
            if end <= start {
                return None;
            }
            index.push(start);
            size.push((end - start) as usize);
        }
        Some(ImageRegion { index, size })
    }

    /// Smallest region containing both; empty operands are ignored.
    pub fn union(&self, other: &ImageRegion) -> ImageRegion {
        if other.is_empty() || self.dimension() != other.dimension() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let upper = self.upper_index();
        let other_upper = other.upper_index();
        let mut index = Vec::with_capacity(self.dimension());
        let mut size = Vec::with_capacity(self.dimension());
        for d in 0..self.dimension() {
            let start = self.index[d].min(other.index[d]);
            let end = upper[d].max(other_upper[d]);
            index.push(start);
            size.push((end - start) as usize);
        }
        ImageRegion { index, size }
    }

    /// Crop to `bounds`, collapsing to an empty region when nothing overlaps.
    pub fn clipped_to(&self, bounds: &ImageRegion) -> ImageRegion {
        match self.intersection(bounds) {
            Some(region) => region,
            None => {
                let anchor = self
                    .index
                    .iter()
                    .zip(bounds.index.iter().zip(bounds.upper_index()))
                    .map(|(&i, (&lo, hi))| i.clamp(lo, hi.max(lo)))
                    .collect();
                ImageRegion::empty_at(anchor)
            }
        }
    }

    /// Grow the region by `radius[d]` pixels on both sides of every axis.
    pub fn pad_by_radius(&self, radius: &[usize]) -> ImageRegion {
        let index = self
            .index
            .iter()
            .zip(radius)
            .map(|(&i, &r)| i - r as i64)
            .collect();
        let size = self
            .size
            .iter()
            .zip(radius)
            .map(|(&s, &r)| s + 2 * r)
            .collect();
        ImageRegion { index, size }
    }

    /// Linear offset of `index` in a buffer laid out over this region.
    pub fn offset_of(&self, index: &[i64]) -> Option<usize> {
        if !self.is_inside_index(index) {
            return None;
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for d in 0..self.dimension() {
            offset += (index[d] - self.index[d]) as usize * stride;
            stride *= self.size[d];
        }
        Some(offset)
    }

    /// Index of the pixel at `offset` in a buffer laid out over this region.
    pub fn index_of(&self, mut offset: usize) -> Vec<i64> {
        let mut index = Vec::with_capacity(self.dimension());
        for d in 0..self.dimension() {
            let size = self.size[d].max(1);
            index.push(self.index[d] + (offset % size) as i64);
            offset /= size;
        }
        index
    }

    /// Whether the pixel at `index` touches the outer boundary of the region.
    pub fn is_on_border(&self, index: &[i64]) -> bool {
        let upper = self.upper_index();
        (0..self.dimension()).any(|d| index[d] == self.index[d] || index[d] == upper[d] - 1)
    }

    /// Iterate the start index of every line (run along axis 0).
    pub fn lines(&self) -> LineIter {
        LineIter::new(self.clone())
    }

    /// Iterate every index in buffer order.
    pub fn indices(&self) -> impl Iterator<Item = Vec<i64>> + '_ {
        (0..self.number_of_pixels()).map(move |offset| self.index_of(offset))
    }
}

impl fmt::Display for ImageRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[index={:?}, size={:?}]", self.index, self.size)
    }
}

/// Iterator over the line starts of a region.
pub struct LineIter {
    region: ImageRegion,
    current: Vec<i64>,
    remaining: usize,
}

impl LineIter {
    fn new(region: ImageRegion) -> Self {
        let remaining = if region.is_empty() || region.dimension() == 0 {
            0
        } else {
            region.size[1..].iter().product()
        };
        Self {
            current: region.index.clone(),
            region,
            remaining,
        }
    }
}

impl Iterator for LineIter {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let line = self.current.clone();
        for d in 1..self.region.dimension() {
            self.current[d] += 1;
            if self.current[d] < self.region.index[d] + self.region.size[d] as i64 {
                break;
            }
            self.current[d] = self.region.index[d];
        }
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Resolve a caller's request against the largest possible region.
///
/// - A request of zero size on any axis is legal and stays empty.
/// - A non-empty request overlapping `largest` is clipped to the overlap.
/// - A non-empty request with no overlap is `InvalidRequestedRegion`.
pub fn resolve_requested_region(
    requested: &ImageRegion,
    largest: &ImageRegion,
) -> Result<ImageRegion, RegionError> {
    if requested.dimension() != largest.dimension() {
        return Err(RegionError::DimensionMismatch {
            expected: largest.dimension(),
            got: requested.dimension(),
        });
    }
    if requested.is_empty() {
        return Ok(requested.clipped_to(largest));
    }
    match requested.intersection(largest) {
        Some(clipped) => {
            if &clipped != requested {
                log::warn!("Requested region {} clipped to {}", requested, clipped);
            }
            Ok(clipped)
        }
        None => Err(RegionError::InvalidRequestedRegion {
            requested: requested.clone(),
            largest: largest.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn region(index: &[i64], size: &[usize]) -> ImageRegion {
        ImageRegion::new(index.to_vec(), size.to_vec()).unwrap()
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = ImageRegion::new(vec![0, 0], vec![1]);
        assert!(matches!(result, Err(RegionError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_containment() {
        let largest = ImageRegion::from_size(&[10, 10]);
        assert!(region(&[2, 3], &[4, 4]).is_inside(&largest));
        assert!(!region(&[8, 8], &[4, 4]).is_inside(&largest));
        assert!(region(&[50, 50], &[0, 3]).is_inside(&largest));
    }

    #[test]
    fn test_intersection_and_union() {
        let a = region(&[0, 0], &[4, 4]);
        let b = region(&[2, 2], &[4, 4]);
        assert_eq!(a.intersection(&b), Some(region(&[2, 2], &[2, 2])));
        assert_eq!(a.union(&b), region(&[0, 0], &[6, 6]));
        assert_eq!(a.intersection(&region(&[4, 0], &[1, 1])), None);
    }

    #[test]
    fn test_offsets_round_trip() {
        let r = region(&[1, 2, 3], &[2, 3, 4]);
        assert_eq!(r.offset_of(&[1, 2, 3]), Some(0));
        assert_eq!(r.offset_of(&[2, 2, 3]), Some(1));
        assert_eq!(r.offset_of(&[1, 3, 3]), Some(2));
        assert_eq!(r.index_of(23), vec![2, 4, 6]);
        assert_eq!(r.offset_of(&[0, 2, 3]), None);
    }

    #[test]
    fn test_lines() {
        let r = region(&[0, 5], &[3, 2]);
        let lines: Vec<_> = r.lines().collect();
        assert_eq!(lines, vec![vec![0, 5], vec![0, 6]]);
        assert_eq!(region(&[0, 0], &[3, 0]).lines().count(), 0);
    }

    #[test]
    fn test_resolve_requested_region() {
        let largest = ImageRegion::from_size(&[8, 8]);

        let inside = region(&[1, 1], &[2, 2]);
        assert_eq!(resolve_requested_region(&inside, &largest).unwrap(), inside);

        let partial = region(&[6, 6], &[4, 4]);
        assert_eq!(
            resolve_requested_region(&partial, &largest).unwrap(),
            region(&[6, 6], &[2, 2])
        );

        let outside = region(&[20, 20], &[2, 2]);
        assert!(matches!(
            resolve_requested_region(&outside, &largest),
            Err(RegionError::InvalidRequestedRegion { .. })
        ));

        let empty = region(&[20, 20], &[0, 2]);
        assert!(resolve_requested_region(&empty, &largest).unwrap().is_empty());
    }

    #[test]
    fn test_border() {
        let r = ImageRegion::from_size(&[3, 3]);
        assert!(r.is_on_border(&[0, 1]));
        assert!(!r.is_on_border(&[1, 1]));
    }

    proptest! {
        #[test]
        fn prop_intersection_inside_both(
            ax in -5i64..5, ay in -5i64..5, aw in 0usize..6, ah in 0usize..6,
            bx in -5i64..5, by in -5i64..5, bw in 0usize..6, bh in 0usize..6,
        ) {
            let a = region(&[ax, ay], &[aw, ah]);
            let b = region(&[bx, by], &[bw, bh]);
            if let Some(i) = a.intersection(&b) {
                prop_assert!(i.is_inside(&a));
                prop_assert!(i.is_inside(&b));
                prop_assert!(!i.is_empty());
            }
            let u = a.union(&b);
            prop_assert!(a.is_inside(&u));
            prop_assert!(b.is_inside(&u));
        }

        #[test]
        fn prop_clipped_is_inside_bounds(
            x in -10i64..10, y in -10i64..10, w in 0usize..8, h in 0usize..8,
        ) {
            let bounds = ImageRegion::from_size(&[6, 6]);
            let clipped = region(&[x, y], &[w, h]).clipped_to(&bounds);
            prop_assert!(clipped.is_inside(&bounds));
        }
    }
}
