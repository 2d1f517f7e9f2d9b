//! Work-unit partitioning and memory accounting.
//!
//! A node's requested output region is split into disjoint work units that
//! run on the rayon pool. Splitting happens along the outermost axis whose
//! extent is larger than one, so every unit covers a contiguous run of the
//! output buffer and workers can be handed plain `&mut [T]` slices.

use crate::core::error::ExecutionError;
use crate::core::region::ImageRegion;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default memory limit (500 MB)
pub const DEFAULT_MEMORY_LIMIT: usize = 500 * 1024 * 1024;

/// Splits a region into at most `n` disjoint, buffer-contiguous pieces.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkUnitSplitter;

impl WorkUnitSplitter {
    /// Axis the region is split along, if it can be split at all.
    pub fn split_axis(region: &ImageRegion) -> Option<usize> {
        (0..region.dimension()).rev().find(|&d| region.size()[d] > 1)
    }

    /// Number of pieces `split` will actually produce.
    pub fn number_of_pieces(region: &ImageRegion, requested: usize) -> usize {
        if region.is_empty() {
            return 0;
        }
        match Self::split_axis(region) {
            Some(axis) => requested.clamp(1, region.size()[axis]),
            None => 1,
        }
    }

    /// Split `region` into near-equal slabs along the split axis.
    ///
    /// Pieces are returned in buffer order; their union is `region`.
    pub fn split(region: &ImageRegion, requested: usize) -> Vec<ImageRegion> {
        let pieces = Self::number_of_pieces(region, requested);
        let axis = match Self::split_axis(region) {
            Some(axis) if pieces > 1 => axis,
            _ => return if pieces == 0 { Vec::new() } else { vec![region.clone()] },
        };

        let extent = region.size()[axis];
        let base = extent / pieces;
        let remainder = extent % pieces;
        let mut start = region.index()[axis];
        let mut out = Vec::with_capacity(pieces);
        for piece in 0..pieces {
            let length = base + usize::from(piece < remainder);
            let mut index = region.index().to_vec();
            let mut size = region.size().to_vec();
            index[axis] = start;
            size[axis] = length;
            // index and size come from the same region, so dimensions agree
            if let Ok(sub) = ImageRegion::new(index, size) {
                out.push(sub);
            }
            start += length as i64;
        }
        log::debug!(
            "Split {} into {} work units along axis {}",
            region,
            out.len(),
            axis
        );
        out
    }
}

/// Byte budget for buffers allocated during one update.
#[derive(Debug)]
pub struct MemoryBudget {
    /// Current memory usage in bytes.
    current: AtomicUsize,
    /// Peak memory usage in bytes.
    peak: AtomicUsize,
    /// Memory limit in bytes.
    limit: usize,
}

impl MemoryBudget {
    /// Create a new budget with the given limit.
    pub fn new(limit: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit,
        }
    }

    /// Try to charge `bytes` against the budget. Returns true if successful.
    pub fn try_allocate(&self, bytes: usize) -> bool {
        let mut current = self.current.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(bytes).filter(|&n| n <= self.limit) else {
                return false;
            };
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::SeqCst);
                    return true;
                }
                Err(c) => current = c,
            }
        }
    }

    /// Charge `bytes` or fail with `AllocationFailure`.
    pub fn reserve(&self, bytes: usize) -> Result<(), ExecutionError> {
        if self.try_allocate(bytes) {
            Ok(())
        } else {
            Err(ExecutionError::AllocationFailure {
                bytes,
                limit: self.limit,
            })
        }
    }

    /// Return previously charged memory.
    pub fn release(&self, bytes: usize) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(bytes))
            });
    }

    /// Get current memory usage.
    pub fn current_usage(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Get peak memory usage.
    pub fn peak_usage(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Get remaining available memory.
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.current_usage())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_along_outermost_axis() {
        let region = ImageRegion::from_size(&[10, 7, 1]);
        let pieces = WorkUnitSplitter::split(&region, 3);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].size(), &[10, 3, 1]);
        assert_eq!(pieces[1].index(), &[0, 3, 0]);
        assert_eq!(pieces[2].size(), &[10, 2, 1]);
    }

    #[test]
    fn test_split_never_exceeds_extent() {
        let region = ImageRegion::from_size(&[4, 2]);
        assert_eq!(WorkUnitSplitter::split(&region, 16).len(), 2);
        let line = ImageRegion::from_size(&[1, 1]);
        assert_eq!(WorkUnitSplitter::split(&line, 8).len(), 1);
        let empty = ImageRegion::from_size(&[0, 5]);
        assert!(WorkUnitSplitter::split(&empty, 4).is_empty());
    }

    #[test]
    fn test_memory_budget() {
        let budget = MemoryBudget::new(1000);

        assert!(budget.try_allocate(500));
        assert_eq!(budget.current_usage(), 500);
        assert!(budget.try_allocate(400));
        assert!(!budget.try_allocate(200));
        assert!(matches!(
            budget.reserve(200),
            Err(ExecutionError::AllocationFailure { bytes: 200, limit: 1000 })
        ));

        budget.release(500);
        assert_eq!(budget.current_usage(), 400);
        assert_eq!(budget.peak_usage(), 900);
        assert_eq!(budget.available(), 600);
    }

    proptest! {
        #[test]
        fn prop_pieces_tile_the_region(w in 1usize..20, h in 1usize..20, d in 1usize..4, n in 1usize..12) {
            let region = ImageRegion::new(vec![3, -2, 0], vec![w, h, d]).unwrap();
            let pieces = WorkUnitSplitter::split(&region, n);
            let total: usize = pieces.iter().map(|p| p.number_of_pixels()).sum();
            prop_assert_eq!(total, region.number_of_pixels());

            // consecutive pieces are contiguous in buffer order
            let mut next_offset = 0;
            for piece in &pieces {
                prop_assert!(piece.is_inside(&region));
                prop_assert_eq!(region.offset_of(piece.index()), Some(next_offset));
                next_offset += piece.number_of_pixels();
            }
        }
    }
}
