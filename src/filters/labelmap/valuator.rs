//! Shape measurements of label objects.

use crate::core::context::{ExecutionContext, ParameterAccess};
use crate::core::error::ExecutionResult;
use crate::core::image::ImageInfo;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use crate::filters::labelmap::attribute::{equivalent_perimeter, equivalent_radius, ShapeAttributes};
use crate::filters::labelmap::label_map::{LabelMap, LabelObject};
use crate::filters::labelmap::whole_map_when_requested;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Attaches [`ShapeAttributes`] to every object of a label map.
///
/// Perimeter and Feret diameter are the expensive measurements and are only
/// computed when asked for. The objects are measured in parallel.
#[derive(Debug, Clone, Default)]
pub struct ShapeLabelMapValuator;

impl ShapeLabelMapValuator {
    pub fn new() -> Self {
        Self
    }
}

impl FilterNode for ShapeLabelMapValuator {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder("shape_label_map_valuator", "Shape Label Map Valuator")
            .description("Measure the shape of every label object")
            .category(Category::LabelMap)
            .input(PortDefinition::input("input", PortType::LabelMap))
            .output(PortDefinition::output("output", PortType::LabelMap))
            .parameter(
                ParameterDefinition::new("compute_perimeter", PortType::Boolean, Value::Boolean(true))
                    .with_description("Estimate perimeter and roundness"),
            )
            .parameter(
                ParameterDefinition::new("compute_feret_diameter", PortType::Boolean, Value::Boolean(false))
                    .with_description("Compute the largest distance between two object pixels"),
            )
            .supports_progress()
            .build()
    }

    fn enlarge_output_requested_region(
        &self,
        _port: &str,
        info: &ImageInfo,
        requested: ImageRegion,
    ) -> ImageRegion {
        whole_map_when_requested(info, requested)
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let compute_perimeter = ctx.get_bool("compute_perimeter")?;
        let compute_feret = ctx.get_bool("compute_feret_diameter")?;
        let mut map = ctx.take_input_object::<LabelMap>("input")?;
        let info = map.geometry().clone();

        let total = map.number_of_objects().max(1);
        let done = AtomicUsize::new(0);
        {
            let ctx = &*ctx;
            map.objects_mut()
                .par_iter_mut()
                .try_for_each(|(_, object)| -> ExecutionResult<()> {
                    ctx.check_aborted()?;
                    object.shape = Some(measure(object, &info, compute_perimeter, compute_feret));
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.report_progress(finished as f32 / total as f32);
                    Ok(())
                })?;
        }

        log::debug!("Node {} measured {} objects", ctx.node_id, map.number_of_objects());
        ctx.set_output("output", map)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Shape attributes of one object on the grid described by `info`.
pub fn measure(
    object: &LabelObject,
    info: &ImageInfo,
    compute_perimeter: bool,
    compute_feret: bool,
) -> ShapeAttributes {
    let dimension = info.dimension();
    let largest = &info.largest_possible_region;
    let number_of_pixels = object.number_of_pixels();
    let physical_size = number_of_pixels as f64 * info.pixel_volume();
    let number_of_pixels_on_border = object
        .runs()
        .iter()
        .map(|run| run_pixels_on_border(run.index.as_slice(), run.length, largest))
        .sum();
    let equivalent_spherical_radius = equivalent_radius(physical_size, dimension);
    let equivalent_spherical_perimeter = equivalent_perimeter(equivalent_spherical_radius, dimension);

    let perimeter = compute_perimeter.then(|| perimeter(object, &info.spacing));
    let roundness = perimeter.map(|p| {
        if p > 0.0 {
            equivalent_spherical_perimeter / p
        } else {
            0.0
        }
    });
    let feret_diameter = compute_feret.then(|| feret_diameter(object, info));

    ShapeAttributes {
        number_of_pixels,
        physical_size,
        number_of_pixels_on_border,
        equivalent_spherical_radius,
        equivalent_spherical_perimeter,
        perimeter,
        roundness,
        feret_diameter,
    }
}

/// Pixels of a run that touch the boundary of `largest`.
fn run_pixels_on_border(index: &[i64], length: usize, largest: &ImageRegion) -> usize {
    if length == 0 {
        return 0;
    }
    let upper = largest.upper_index();
    let line_on_border = (1..index.len())
        .any(|d| index[d] == largest.index()[d] || index[d] == upper[d] - 1);
    if line_on_border {
        return length;
    }
    let first = index[0] == largest.index()[0];
    let last = index[0] + length as i64 == upper[0];
    if length == 1 {
        usize::from(first || last)
    } else {
        usize::from(first) + usize::from(last)
    }
}

/// Physical area of the faces between the object and everything else.
///
/// Every run exposes its two ends along axis 0. Along any other axis, the
/// part of a run not covered by the object on the neighbouring line is
/// exposed on that side.
fn perimeter(object: &LabelObject, spacing: &[f64]) -> f64 {
    let dimension = spacing.len();
    let face_area = |axis: usize| -> f64 {
        (0..dimension)
            .filter(|&d| d != axis)
            .map(|d| spacing[d])
            .product()
    };
    let lines = object.line_index();
    let mut total = 2.0 * object.runs().len() as f64 * face_area(0);

    for axis in 1..dimension {
        let area = face_area(axis);
        let mut exposed = 0usize;
        for run in object.runs() {
            for step in [-1i64, 1] {
                let mut neighbor = run.line().to_vec();
                neighbor[axis - 1] += step;
                let covered = lines
                    .get(&neighbor)
                    .map(|intervals| overlap(run.index[0], run.end(), intervals))
                    .unwrap_or(0);
                exposed += run.length - covered;
            }
        }
        total += exposed as f64 * area;
    }
    total
}

/// Length of `[start, end)` covered by sorted disjoint intervals.
fn overlap(start: i64, end: i64, intervals: &[(i64, i64)]) -> usize {
    intervals
        .iter()
        .map(|&(a, b)| (end.min(b) - start.max(a)).max(0) as usize)
        .sum()
}

/// Largest physical distance between two pixels of the object.
///
/// Only pixels on the object's boundary can be endpoints of the diameter,
/// so interior pixels are dropped before the quadratic search.
fn feret_diameter(object: &LabelObject, info: &ImageInfo) -> f64 {
    let lines = object.line_index();
    let dimension = info.dimension();
    let mut points = Vec::new();
    for run in object.runs() {
        for index in run.indices() {
            if is_boundary_pixel(&index, &lines, dimension) {
                points.push(info.physical_point(&index));
            }
        }
    }

    let mut best = 0.0f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            best = best.max(d2);
        }
    }
    best.sqrt()
}

fn is_boundary_pixel(
    index: &[i64],
    lines: &HashMap<Vec<i64>, Vec<(i64, i64)>>,
    dimension: usize,
) -> bool {
    let inside = |candidate: &[i64]| {
        lines
            .get(&candidate[1..])
            .is_some_and(|intervals| intervals.iter().any(|&(a, b)| candidate[0] >= a && candidate[0] < b))
    };
    let mut neighbor = index.to_vec();
    for d in 0..dimension {
        for step in [-1i64, 1] {
            neighbor[d] += step;
            let missing = !inside(&neighbor);
            neighbor[d] -= step;
            if missing {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::DataKind;
    use crate::filters::labelmap::label_map::Run;

    fn square(side: usize, at: i64) -> LabelObject {
        let mut object = LabelObject::new(1);
        for y in 0..side as i64 {
            object.add_run(Run::new(vec![at, at + y], side));
        }
        object
    }

    fn grid(size: &[usize]) -> ImageInfo {
        ImageInfo::new(DataKind::LabelMap, ImageRegion::from_size(size))
    }

    #[test]
    fn test_square_measurements() {
        let shape = measure(&square(3, 2), &grid(&[10, 10]), true, true);
        assert_eq!(shape.number_of_pixels, 9);
        assert_eq!(shape.physical_size, 9.0);
        assert_eq!(shape.number_of_pixels_on_border, 0);
        assert_eq!(shape.perimeter, Some(12.0));
        let diagonal = (8.0f64).sqrt();
        assert!((shape.feret_diameter.unwrap() - diagonal).abs() < 1e-12);
        let roundness = shape.roundness.unwrap();
        assert!(roundness > 0.0 && roundness < 1.0);
    }

    #[test]
    fn test_spacing_scales_measurements() {
        let info = grid(&[10, 10]).with_spacing(vec![2.0, 0.5]);
        let shape = measure(&square(2, 0), &info, true, false);
        assert_eq!(shape.physical_size, 4.0);
        // two faces of 0.5 per row and two faces of 2.0 per column
        assert_eq!(shape.perimeter, Some(2.0 * 2.0 * 0.5 + 2.0 * 2.0 * 2.0));
        assert_eq!(shape.feret_diameter, None);
    }

    #[test]
    fn test_pixels_on_border() {
        let largest = ImageRegion::from_size(&[5, 5]);
        assert_eq!(run_pixels_on_border(&[0, 2], 5, &largest), 2);
        assert_eq!(run_pixels_on_border(&[1, 0], 2, &largest), 2);
        assert_eq!(run_pixels_on_border(&[4, 2], 1, &largest), 1);
        assert_eq!(run_pixels_on_border(&[0, 2], 1, &largest), 1);
        assert_eq!(run_pixels_on_border(&[1, 2], 2, &largest), 0);
        assert_eq!(measure(&square(5, 0), &grid(&[5, 5]), false, false).number_of_pixels_on_border, 16);
    }

    #[test]
    fn test_volume_perimeter_counts_faces() {
        let mut cube = LabelObject::new(1);
        for z in 0..2 {
            for y in 0..2 {
                cube.add_run(Run::new(vec![0, y, z], 2));
            }
        }
        assert_eq!(perimeter(&cube, &[1.0, 1.0, 1.0]), 24.0);
    }
}
