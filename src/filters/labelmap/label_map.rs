//! Run-length encoded label maps.

use crate::core::image::{DataKind, DataObject, ImageInfo};
use crate::core::region::ImageRegion;
use crate::core::time::TimeStamp;
use crate::filters::labelmap::attribute::ShapeAttributes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Label value. The background label never names an object.
pub type Label = u64;

/// A run of pixels along axis 0, starting at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub index: Vec<i64>,
    pub length: usize,
}

impl Run {
    pub fn new(index: Vec<i64>, length: usize) -> Self {
        Self { index, length }
    }

    /// One past the last x coordinate.
    pub fn end(&self) -> i64 {
        self.index[0] + self.length as i64
    }

    /// Coordinates of the line the run lies on (every axis but 0).
    pub fn line(&self) -> &[i64] {
        &self.index[1..]
    }

    /// Every pixel index of the run.
    pub fn indices(&self) -> impl Iterator<Item = Vec<i64>> + '_ {
        (0..self.length as i64).map(move |dx| {
            let mut index = self.index.clone();
            index[0] += dx;
            index
        })
    }

    /// The part of the run inside `region`, if any.
    pub fn clipped_to(&self, region: &ImageRegion) -> Option<Run> {
        let line_inside = self.line().iter().enumerate().all(|(i, &c)| {
            let d = i + 1;
            c >= region.index()[d] && c < region.index()[d] + region.size()[d] as i64
        });
        if !line_inside {
            return None;
        }
        let start = self.index[0].max(region.index()[0]);
        let end = self.end().min(region.index()[0] + region.size()[0] as i64);
        if end <= start {
            return None;
        }
        let mut index = self.index.clone();
        index[0] = start;
        Some(Run::new(index, (end - start) as usize))
    }
}

/// One connected set of pixels sharing a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelObject {
    pub label: Label,
    runs: Vec<Run>,
    /// Set by the shape valuator.
    pub shape: Option<ShapeAttributes>,
}

impl LabelObject {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            runs: Vec::new(),
            shape: None,
        }
    }

    pub fn add_run(&mut self, run: Run) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn number_of_pixels(&self) -> usize {
        self.runs.iter().map(|r| r.length).sum()
    }

    /// Sort runs in raster order and merge runs that touch on a line.
    pub fn optimize(&mut self) {
        self.runs.sort_by(|a, b| {
            a.line()
                .iter()
                .rev()
                .cmp(b.line().iter().rev())
                .then(a.index[0].cmp(&b.index[0]))
        });
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            match merged.last_mut() {
                Some(last) if last.line() == run.line() && last.end() >= run.index[0] => {
                    let end = last.end().max(run.end());
                    last.length = (end - last.index[0]) as usize;
                }
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }

    /// Runs grouped by line, as `[start, end)` intervals sorted by start.
    pub fn line_index(&self) -> HashMap<Vec<i64>, Vec<(i64, i64)>> {
        let mut lines: HashMap<Vec<i64>, Vec<(i64, i64)>> = HashMap::new();
        for run in &self.runs {
            lines
                .entry(run.line().to_vec())
                .or_default()
                .push((run.index[0], run.end()));
        }
        for intervals in lines.values_mut() {
            intervals.sort_unstable();
        }
        lines
    }

    pub fn contains(&self, index: &[i64]) -> bool {
        self.runs
            .iter()
            .any(|r| r.line() == &index[1..] && index[0] >= r.index[0] && index[0] < r.end())
    }
}

/// Label objects over an image grid.
///
/// Objects sit behind an `Arc`, so grafting or cloning a label map is cheap
/// and the first mutation copies them.
#[derive(Debug, Clone)]
pub struct LabelMap {
    info: ImageInfo,
    buffered_region: ImageRegion,
    requested_region: ImageRegion,
    background: Label,
    objects: Arc<BTreeMap<Label, LabelObject>>,
    modified_time: TimeStamp,
}

impl LabelMap {
    /// An empty label map buffering the whole largest region of `info`.
    pub fn new(info: &ImageInfo, background: Label) -> Self {
        let info = info.clone().with_kind(DataKind::LabelMap);
        Self {
            buffered_region: info.largest_possible_region.clone(),
            requested_region: info.largest_possible_region.clone(),
            info,
            background,
            objects: Arc::new(BTreeMap::new()),
            modified_time: TimeStamp::ZERO,
        }
    }

    pub fn background_value(&self) -> Label {
        self.background
    }

    pub fn largest_possible_region(&self) -> &ImageRegion {
        &self.info.largest_possible_region
    }

    pub fn geometry(&self) -> &ImageInfo {
        &self.info
    }

    pub fn number_of_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.objects.keys().copied().collect()
    }

    pub fn object(&self, label: Label) -> Option<&LabelObject> {
        self.objects.get(&label)
    }

    pub fn objects(&self) -> impl Iterator<Item = &LabelObject> {
        self.objects.values()
    }

    /// Mutable objects, copied first if another map shares them.
    pub fn objects_mut(&mut self) -> &mut BTreeMap<Label, LabelObject> {
        Arc::make_mut(&mut self.objects)
    }

    pub fn push_object(&mut self, object: LabelObject) {
        debug_assert_ne!(object.label, self.background);
        self.objects_mut().insert(object.label, object);
    }

    pub fn remove_label(&mut self, label: Label) -> Option<LabelObject> {
        self.objects_mut().remove(&label)
    }

    /// Whether both maps share the same object storage.
    pub fn shares_objects_with(&self, other: &LabelMap) -> bool {
        Arc::ptr_eq(&self.objects, &other.objects)
    }

    /// Label of the pixel at `index`, the background label outside objects.
    pub fn label_at(&self, index: &[i64]) -> Label {
        self.objects
            .values()
            .find(|o| o.contains(index))
            .map(|o| o.label)
            .unwrap_or(self.background)
    }
}

impl DataObject for LabelMap {
    fn info(&self) -> ImageInfo {
        self.info.clone()
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
        let per_run = std::mem::size_of::<Run>() + self.info.dimension() * std::mem::size_of::<i64>();
        self.objects
            .values()
            .map(|o| std::mem::size_of::<LabelObject>() + o.runs.len() * per_run)
            .sum()
    }

    fn clone_object(&self) -> Box<dyn DataObject> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> String {
        "LabelMap".to_string()
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

    fn info(size: &[usize]) -> ImageInfo {
        ImageInfo::new(DataKind::LabelMap, ImageRegion::from_size(size))
    }

    #[test]
    fn test_optimize_merges_touching_runs() {
        let mut object = LabelObject::new(1);
        object.add_run(Run::new(vec![3, 1], 2));
        object.add_run(Run::new(vec![0, 1], 3));
        object.add_run(Run::new(vec![0, 0], 1));
        object.optimize();
        assert_eq!(
            object.runs(),
            &[Run::new(vec![0, 0], 1), Run::new(vec![0, 1], 5)]
        );
        assert_eq!(object.number_of_pixels(), 6);
    }

    #[test]
    fn test_run_clipping() {
        let run = Run::new(vec![2, 3], 6);
        let region = ImageRegion::new(vec![4, 0], vec![10, 4]).unwrap();
        assert_eq!(run.clipped_to(&region), Some(Run::new(vec![4, 3], 4)));
        let other_line = ImageRegion::new(vec![0, 0], vec![10, 3]).unwrap();
        assert_eq!(run.clipped_to(&other_line), None);
    }

    #[test]
    fn test_objects_are_copied_on_write() {
        let mut map = LabelMap::new(&info(&[4, 4]), 0);
        let mut object = LabelObject::new(1);
        object.add_run(Run::new(vec![0, 0], 2));
        map.push_object(object);

        let graft = map.clone();
        assert!(graft.shares_objects_with(&map));
        map.remove_label(1);
        assert_eq!(map.number_of_objects(), 0);
        assert_eq!(graft.number_of_objects(), 1);
        assert_eq!(graft.label_at(&[1, 0]), 1);
        assert_eq!(graft.label_at(&[2, 0]), 0);
    }
}
