//! Binary shape opening on small drawn scenes.

use regionflow::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const ON: u8 = 255;

/// A 3x3 square, a 5-pixel line, a lone pixel and a diagonal pair.
struct Scene {
    square: Vec<[i64; 2]>,
    line: Vec<[i64; 2]>,
    dot: Vec<[i64; 2]>,
    diagonal: Vec<[i64; 2]>,
}

impl Scene {
    fn new() -> Self {
        Self {
            square: (1..4).flat_map(|y| (1..4).map(move |x| [x, y])).collect(),
            line: (1..6).map(|x| [x, 6]).collect(),
            dot: vec![[9, 1]],
            diagonal: vec![[8, 4], [9, 5]],
        }
    }

    fn objects(&self) -> [&[[i64; 2]]; 4] {
        [&self.square, &self.line, &self.dot, &self.diagonal]
    }

    fn image(&self) -> Image<u8> {
        let mut image = Image::filled(&[12, 8], 0u8);
        for pixel in self.objects().into_iter().flatten() {
            image.set_pixel(pixel, ON).unwrap();
        }
        image
    }
}

fn opening(image: Image<u8>) -> (PipelineGraph, NodeId, NodeId) {
    let mut graph = PipelineGraph::new();
    let node = graph.add(BinaryShapeOpening::<u8>::new());
    let source = graph.set_input(node, "input", Arc::new(image)).unwrap();
    (graph, source, node)
}

fn run(attribute: &str, lambda: f64, configure: impl FnOnce(&mut PipelineGraph, NodeId)) -> Image<u8> {
    let (mut graph, _, node) = opening(Scene::new().image());
    graph.set_parameter(node, "attribute", attribute).unwrap();
    graph.set_parameter(node, "lambda", lambda).unwrap();
    configure(&mut graph, node);
    graph.update(node).unwrap();
    graph.output_image::<u8>(node, "output").unwrap()
}

/// Whether every pixel of `object` is on; panics on a partly kept object.
fn kept(out: &Image<u8>, object: &[[i64; 2]]) -> bool {
    let on = object
        .iter()
        .filter(|p| out.get_pixel(p.as_slice()).unwrap() == ON)
        .count();
    assert!(on == 0 || on == object.len(), "object partly kept: {:?}", object);
    on == object.len()
}

fn survivors(out: &Image<u8>) -> [bool; 4] {
    let scene = Scene::new();
    scene.objects().map(|object| kept(out, object))
}

#[test]
fn small_objects_are_removed() {
    let out = run("number_of_pixels", 5.0, |_, _| {});
    // face connectivity splits the diagonal pair into two single pixels
    assert_eq!(survivors(&out), [true, true, false, false]);
}

#[test]
fn full_connectivity_joins_diagonal_neighbours() {
    let out = run("number_of_pixels", 2.0, |graph, node| {
        graph.set_parameter(node, "fully_connected", true).unwrap();
    });
    assert_eq!(survivors(&out), [true, true, false, true]);
}

#[test]
fn reverse_ordering_removes_large_objects() {
    let out = run("number_of_pixels", 5.0, |graph, node| {
        graph.set_parameter(node, "reverse_ordering", true).unwrap();
    });
    assert_eq!(survivors(&out), [false, true, true, true]);
}

#[test]
fn roundness_separates_squares_from_lines() {
    let out = run("roundness", 0.8, |_, _| {});
    assert_eq!(survivors(&out), [true, false, true, true]);
}

#[test]
fn perimeter_threshold() {
    // square and line both have 12 unit faces
    let out = run("perimeter", 12.0, |_, _| {});
    assert_eq!(survivors(&out), [true, true, false, false]);
}

#[test]
fn feret_diameter_keeps_elongated_objects() {
    let out = run("feret_diameter", 3.5, |_, _| {});
    assert_eq!(survivors(&out), [false, true, false, false]);
}

#[test]
fn volumes_are_opened_in_three_dimensions() {
    let mut image = Image::filled(&[6, 6, 3], 0u8);
    for z in 0..2 {
        for y in 1..3 {
            for x in 1..3 {
                image.set_pixel(&[x, y, z], ON).unwrap();
            }
        }
    }
    image.set_pixel(&[4, 4, 2], ON).unwrap();
    // touches the cube on a corner only
    image.set_pixel(&[3, 3, 2], ON).unwrap();

    let (mut graph, _, node) = opening(image);
    graph.set_parameter(node, "lambda", 3.0).unwrap();
    graph.update(node).unwrap();
    let out = graph.output_image::<u8>(node, "output").unwrap();
    assert_eq!(out.buffer().iter().filter(|&&p| p == ON).count(), 8);
    assert_eq!(out.get_pixel(&[2, 2, 1]).unwrap(), ON);
    assert_eq!(out.get_pixel(&[4, 4, 2]).unwrap(), 0);

    graph.set_parameter(node, "fully_connected", true).unwrap();
    graph.update(node).unwrap();
    let out = graph.output_image::<u8>(node, "output").unwrap();
    assert_eq!(out.get_pixel(&[3, 3, 2]).unwrap(), ON);
    assert_eq!(out.get_pixel(&[4, 4, 2]).unwrap(), ON);
}

#[test]
fn other_pixels_pass_through() {
    let mut image = Scene::new().image();
    image.set_pixel(&[11, 7], 100).unwrap();
    image.set_pixel(&[0, 0], 1).unwrap();

    let (mut graph, _, node) = opening(image);
    graph.set_parameter(node, "lambda", 5.0).unwrap();
    graph.set_parameter(node, "background_value", 7i64).unwrap();
    graph.update(node).unwrap();

    let out = graph.output_image::<u8>(node, "output").unwrap();
    assert_eq!(out.get_pixel(&[11, 7]).unwrap(), 100);
    assert_eq!(out.get_pixel(&[0, 0]).unwrap(), 1);
    assert_eq!(out.get_pixel(&[9, 1]).unwrap(), 7);
    assert_eq!(out.get_pixel(&[10, 3]).unwrap(), 0);
    assert_eq!(out.get_pixel(&[2, 2]).unwrap(), ON);
}

#[test]
fn custom_foreground_on_wider_pixels() {
    let scene = Scene::new();
    let mut image = Image::filled(&[12, 8], 0u16);
    for pixel in scene.objects().into_iter().flatten() {
        image.set_pixel(pixel, 1).unwrap();
    }
    // full-range pixels are not objects here
    image.set_pixel(&[11, 0], u16::MAX).unwrap();

    let mut graph = PipelineGraph::new();
    let node = graph.add(BinaryShapeOpening::<u16>::new());
    graph.set_input(node, "input", Arc::new(image)).unwrap();
    graph.set_parameter(node, "foreground_value", 1i64).unwrap();
    graph.set_parameter(node, "lambda", 5.0).unwrap();
    graph.update(node).unwrap();

    let out = graph.output_image::<u16>(node, "output").unwrap();
    assert_eq!(out.get_pixel(&[2, 2]).unwrap(), 1);
    assert_eq!(out.get_pixel(&[9, 1]).unwrap(), 0);
    assert_eq!(out.get_pixel(&[11, 0]).unwrap(), u16::MAX);
}

#[test]
fn matches_the_stages_wired_by_hand() {
    let composite = run("number_of_pixels", 5.0, |_, _| {});

    let mut graph = PipelineGraph::new();
    let labelizer = graph.add(BinaryImageToLabelMap::<u8>::new());
    let valuator = graph.add(ShapeLabelMapValuator::new());
    let filter = graph.add(ShapeOpeningLabelMap::new());
    let binarizer = graph.add(LabelMapToBinary::<u8>::new());
    let source = graph
        .set_input(labelizer, "input", Arc::new(Scene::new().image()))
        .unwrap();
    graph.connect(labelizer, "output", valuator, "input").unwrap();
    graph.connect(valuator, "output", filter, "input").unwrap();
    graph.connect(filter, "output", binarizer, "input").unwrap();
    graph
        .connect(source, ImageSource::OUTPUT, binarizer, "background_image")
        .unwrap();
    graph.set_parameter(filter, "lambda", 5.0).unwrap();
    graph.update(binarizer).unwrap();

    let manual = graph.output_image::<u8>(binarizer, "output").unwrap();
    assert_eq!(manual.buffer(), composite.buffer());

    let map = graph.output_object::<LabelMap>(valuator, "output").unwrap();
    assert_eq!(map.number_of_objects(), 5);
    assert!(map.objects().all(|o| o.shape.is_some()));
    let opened = graph.output_object::<LabelMap>(filter, "output").unwrap();
    assert_eq!(opened.number_of_objects(), 2);
}

#[test]
fn a_narrow_request_is_enlarged_to_the_whole_image() {
    let (mut graph, _, node) = opening(Scene::new().image());
    graph.set_parameter(node, "lambda", 5.0).unwrap();
    let requested = ImageRegion::new(vec![0, 5], vec![7, 3]).unwrap();
    graph.set_output_requested_region(node, requested.clone()).unwrap();
    graph.update(node).unwrap();

    let out = graph.output_image::<u8>(node, "output").unwrap();
    assert_eq!(out.buffered_region(), out.largest_possible_region());
    assert!(requested.is_inside(out.buffered_region()));
    let on: HashSet<Vec<i64>> = requested
        .indices()
        .filter(|index| out.get_pixel(index).unwrap() == ON)
        .collect();
    let line: HashSet<Vec<i64>> = Scene::new().line.iter().map(|p| p.to_vec()).collect();
    assert_eq!(on, line);
}

#[test]
fn a_request_outside_the_image_is_rejected() {
    let (mut graph, source, node) = opening(Scene::new().image());
    let outside = ImageRegion::new(vec![100, 100], vec![2, 2]).unwrap();
    graph.set_output_requested_region(node, outside).unwrap();

    assert!(matches!(
        graph.update(node),
        Err(FlowError::Region(RegionError::InvalidRequestedRegion { .. }))
    ));
    assert!(graph.get_node(node).unwrap().output("output").is_none());
    assert!(graph.get_node(source).unwrap().last_update().is_none());
}

#[test]
fn progress_passes_every_stage_boundary() {
    let (mut graph, _, node) = opening(Scene::new().image());
    graph.set_parameter(node, "lambda", 5.0).unwrap();
    let (observer, receiver) = channel_observer();
    graph.add_observer(node, observer).unwrap();
    graph.update(node).unwrap();

    let progress: Vec<f32> = receiver
        .try_iter()
        .filter_map(|update| match update {
            ProgressUpdate::Progress { node_id, progress } if node_id == node => Some(progress),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    for boundary in [0.3f32, 0.6, 0.8, 1.0] {
        assert!(
            progress.iter().any(|p| (p - boundary).abs() < 1e-5),
            "no progress value at {} in {:?}",
            boundary,
            progress
        );
    }
}

#[test]
fn unchanged_pipeline_is_not_recomputed() {
    let (mut graph, source, node) = opening(Scene::new().image());
    graph.set_parameter(node, "lambda", 5.0).unwrap();
    graph.update(node).unwrap();

    let again = graph.update(node).unwrap();
    assert!(again.executed.is_empty());

    graph.set_parameter(node, "lambda", 5.0).unwrap();
    assert!(graph.update(node).unwrap().executed.is_empty());

    graph.set_parameter(node, "lambda", 10.0).unwrap();
    let report = graph.update(node).unwrap();
    assert_eq!(report.executed, vec![node]);
    assert_eq!(report.skipped, vec![source]);
    let out = graph.output_image::<u8>(node, "output").unwrap();
    assert_eq!(out.buffer().iter().filter(|&&p| p == ON).count(), 0);
}

#[test]
fn internal_stages_stay_invisible_to_observers() {
    let (mut graph, source, node) = opening(Scene::new().image());
    let (observer, receiver) = channel_observer();
    let options = ExecutionOptions::new()
        .with_work_units(3)
        .with_progress_callback(observer);
    graph.update_with(node, options).unwrap();

    let updates: Vec<ProgressUpdate> = receiver.try_iter().collect();
    assert!(updates
        .iter()
        .all(|u| u.node_id() == source || u.node_id() == node));
    assert!(matches!(
        updates.last(),
        Some(ProgressUpdate::Completed { node_id, .. }) if *node_id == node
    ));
}

#[test]
fn abort_during_the_internal_pipeline() {
    let (mut graph, source, node) = opening(Scene::new().image());
    let abort = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&abort);
    let options = ExecutionOptions::new()
        .with_abort_flag(Arc::clone(&abort))
        .with_progress(move |update| {
            if let ProgressUpdate::Progress { node_id, progress } = update {
                if *node_id == node && *progress > 0.0 {
                    trigger.store(true, Ordering::SeqCst);
                }
            }
        });

    let result = graph.update_with(node, options);
    assert!(matches!(
        result,
        Err(FlowError::Execution(ExecutionError::Aborted { node_id })) if node_id == node
    ));
    assert!(graph.get_node(node).unwrap().output("output").is_none());
    assert!(graph.get_node(source).unwrap().last_update().is_some());
    assert!(abort.load(Ordering::SeqCst));
}

#[test]
fn unknown_attribute_fails_validation() {
    let (mut graph, _, node) = opening(Scene::new().image());
    graph.set_parameter(node, "attribute", "elongation").unwrap();
    assert!(matches!(graph.update(node), Err(FlowError::Validation(_))));
}
