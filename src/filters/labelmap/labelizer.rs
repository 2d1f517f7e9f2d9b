//! Connected-component labeling of binary images.

use crate::core::context::{ExecutionContext, ParameterAccess, RegionContext};
use crate::core::error::{ExecutionResult, RegionError};
use crate::core::image::{DataObject, Image};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::ScalarPixel;
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use crate::filters::labelmap::label_map::{Label, LabelMap, LabelObject, Run};
use petgraph::unionfind::UnionFind;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Labels the connected components of pixels equal to the foreground value.
///
/// Runs are collected per work unit in parallel, then joined with a
/// union-find. Labels are handed out in raster order of each object's first
/// pixel, so the result does not depend on how work units were scheduled.
#[derive(Debug, Clone, Default)]
pub struct BinaryImageToLabelMap<T> {
    _pixel: PhantomData<T>,
}

impl<T: ScalarPixel> BinaryImageToLabelMap<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: ScalarPixel> FilterNode for BinaryImageToLabelMap<T> {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::builder(format!("binary_image_to_label_map_{}", T::KIND), "Binary Image To Label Map")
            .description("Label the connected components of a binary image")
            .category(Category::LabelMap)
            .input(PortDefinition::input("input", PortType::Image(T::pixel_kind())))
            .output(PortDefinition::output("output", PortType::LabelMap))
            .parameter(
                ParameterDefinition::new("fully_connected", PortType::Boolean, Value::Boolean(false))
                    .with_description("Also join pixels that touch on an edge or corner"),
            )
            .parameter(
                ParameterDefinition::new(
                    "input_foreground_value",
                    PortType::Pixel(T::pixel_kind()),
                    Value::Pixel(T::max_bound().to_pixel_value()),
                )
                .with_description("Pixel value of the objects"),
            )
            .parameter(
                ParameterDefinition::new("output_background_value", PortType::Integer, Value::Integer(0))
                    .with_description("Label reserved for the background")
                    .with_constraint(Constraint::NonNegative),
            )
            .supports_progress()
            .build()
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let largest = ctx.input_info("input")?.largest_possible_region.clone();
        Ok(HashMap::from([("input".to_string(), largest)]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let fully_connected = ctx.get_bool("fully_connected")?;
        let foreground = ctx.get_pixel::<T>("input_foreground_value")?;
        let background = ctx.get_integer("output_background_value")?.max(0) as Label;
        let input = ctx.input_image::<T>("input")?.clone();
        let info = ctx.output_info("output")?.clone();
        let region = info.largest_possible_region.clone();

        let pieces = ctx.map_work_units(&region, 0.0, 0.5, |piece| {
            find_runs(&input, piece, foreground)
        })?;
        let runs = concat_runs(pieces);
        log::debug!("Node {} found {} foreground runs", ctx.node_id, runs.len());

        let roots = join_runs(&runs, fully_connected);
        ctx.check_aborted()?;
        ctx.report_progress(0.75);

        let mut objects: Vec<LabelObject> = Vec::new();
        let mut label_of_root: HashMap<usize, usize> = HashMap::new();
        let mut next_label: Label = 1;
        for (run, root) in runs.into_iter().zip(roots) {
            let slot = *label_of_root.entry(root).or_insert_with(|| {
                if next_label == background {
                    next_label += 1;
                }
                objects.push(LabelObject::new(next_label));
                next_label += 1;
                objects.len() - 1
            });
            objects[slot].add_run(run);
        }

        let mut output = LabelMap::new(&info, background);
        for mut object in objects {
            object.optimize();
            output.push_object(object);
        }
        log::debug!("Node {} labeled {} objects", ctx.node_id, output.number_of_objects());
        ctx.set_output("output", output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

/// Maximal foreground runs of `piece`, in buffer order.
fn find_runs<T: ScalarPixel>(
    input: &Image<T>,
    piece: &ImageRegion,
    foreground: T,
) -> ExecutionResult<Vec<Run>> {
    let width = piece.size()[0];
    let source = input.buffered_region();
    let mut runs = Vec::new();
    for start in piece.lines() {
        let offset = source
            .offset_of(&start)
            .ok_or_else(|| RegionError::IndexOutOfBounds {
                index: start.clone(),
                region: source.clone(),
            })?;
        let line = &input.buffer()[offset..offset + width];
        let mut x = 0;
        while x < width {
            if line[x] != foreground {
                x += 1;
                continue;
            }
            let begin = x;
            while x < width && line[x] == foreground {
                x += 1;
            }
            let mut index = start.clone();
            index[0] += begin as i64;
            runs.push(Run::new(index, x - begin));
        }
    }
    Ok(runs)
}

/// Concatenate per-unit runs, joining runs a split along axis 0 cut apart.
fn concat_runs(pieces: Vec<Vec<Run>>) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for run in pieces.into_iter().flatten() {
        match runs.last_mut() {
            Some(last) if last.line() == run.line() && last.end() == run.index[0] => {
                last.length += run.length;
            }
            _ => runs.push(run),
        }
    }
    runs
}

/// Union-find root of every run.
fn join_runs(runs: &[Run], fully_connected: bool) -> Vec<usize> {
    let mut by_line: HashMap<&[i64], Vec<usize>> = HashMap::new();
    for (i, run) in runs.iter().enumerate() {
        by_line.entry(run.line()).or_default().push(i);
    }

    let line_dims = runs.first().map(|r| r.line().len()).unwrap_or(0);
    let offsets = neighbor_line_offsets(line_dims, fully_connected);
    // Diagonal neighbours may touch one pixel past either end
    let reach = i64::from(fully_connected);

    let mut uf = UnionFind::<usize>::new(runs.len());
    for (i, run) in runs.iter().enumerate() {
        // Runs on the same line are maximal, so only other lines can join
        for offset in &offsets {
            let neighbor: Vec<i64> = run.line().iter().zip(offset).map(|(c, o)| c + o).collect();
            let Some(candidates) = by_line.get(neighbor.as_slice()) else {
                continue;
            };
            for &j in candidates {
                let other = &runs[j];
                if other.index[0] < run.end() + reach && run.index[0] < other.end() + reach {
                    uf.union(i, j);
                }
            }
        }
    }

    (0..runs.len()).map(|i| uf.find_mut(i)).collect()
}

/// Offsets to the preceding neighbour lines in the line coordinates.
///
/// Face connectivity moves one step along one axis; full connectivity
/// allows every combination of -1, 0, 1. Only offsets that come earlier in
/// raster order are returned, so every pair is examined once.
fn neighbor_line_offsets(line_dims: usize, fully_connected: bool) -> Vec<Vec<i64>> {
    let mut offsets = Vec::new();
    if fully_connected {
        let total = 3usize.pow(line_dims as u32);
        for code in 0..total {
            let mut offset = Vec::with_capacity(line_dims);
            let mut c = code;
            for _ in 0..line_dims {
                offset.push((c % 3) as i64 - 1);
                c /= 3;
            }
            if precedes(&offset) {
                offsets.push(offset);
            }
        }
    } else {
        for d in 0..line_dims {
            let mut offset = vec![0; line_dims];
            offset[d] = -1;
            offsets.push(offset);
        }
    }
    offsets
}

/// Whether a line offset points backwards in raster order.
fn precedes(offset: &[i64]) -> bool {
    offset
        .iter()
        .rev()
        .find(|&&o| o != 0)
        .is_some_and(|&o| o < 0)
}
