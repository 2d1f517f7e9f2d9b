//! The update protocol seen from outside the crate: user-defined filters,
//! shared producers, streaming requests and replaced source data.

use regionflow::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Left half of the output from `left`, right half from `right`.
#[derive(Clone)]
struct SideBySide;

/// Columns `[from, to)` of `region`, possibly empty.
fn columns(region: &ImageRegion, from: i64, to: i64) -> Result<ImageRegion, RegionError> {
    let lo = region.index()[0].max(from);
    let hi = region.upper_index()[0].min(to).max(lo);
    let mut index = region.index().to_vec();
    let mut size = region.size().to_vec();
    index[0] = lo;
    size[0] = (hi - lo) as usize;
    ImageRegion::new(index, size)
}

fn middle(largest: &ImageRegion) -> i64 {
    largest.index()[0] + (largest.size()[0] / 2) as i64
}

impl FilterNode for SideBySide {
    fn metadata(&self) -> NodeMetadata {
        let image = PortType::Image(u8::pixel_kind());
        NodeMetadata::builder("side_by_side", "Side By Side")
            .input(PortDefinition::input("left", image))
            .input(PortDefinition::input("right", image))
            .output(PortDefinition::output("output", image))
            .build()
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let requested = ctx.output_requested_region("output")?;
        let mid = middle(&ctx.input_info("left")?.largest_possible_region);
        Ok(HashMap::from([
            ("left".to_string(), columns(requested, i64::MIN, mid)?),
            ("right".to_string(), columns(requested, mid, i64::MAX)?),
        ]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let left = ctx.input_image::<u8>("left")?.clone();
        let right = ctx.input_image::<u8>("right")?.clone();
        let mid = middle(left.largest_possible_region());
        let mut output = ctx.allocate_output::<u8>("output", 0)?;
        ctx.run_work_units(&mut output, 0.0, 1.0, |region, out| {
            for (o, index) in out.iter_mut().zip(region.indices()) {
                let side = if index[0] < mid { &left } else { &right };
                *o = side.get_pixel(&index)?;
            }
            Ok(())
        })?;
        ctx.set_output("output", output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}

fn ramp(width: usize, height: usize) -> Image<u8> {
    let data = (0..width * height).map(|v| v as u8).collect();
    Image::from_vec(&[width, height], data).unwrap()
}

/// source -> shift -> shrink
fn chain(width: usize, height: usize) -> (PipelineGraph, NodeId, NodeId, NodeId) {
    let mut graph = PipelineGraph::new();
    let shift = graph.add(ShiftScale::<u8>::new());
    let shrink = graph.add(Shrink::<u8>::new());
    let source = graph
        .set_input(shift, "input", Arc::new(ramp(width, height)))
        .unwrap();
    graph.connect(shift, "output", shrink, "input").unwrap();
    (graph, source, shift, shrink)
}

#[test]
fn consumers_of_one_output_get_the_union_of_their_requests() {
    let mut graph = PipelineGraph::new();
    let shift = graph.add(ShiftScale::<u8>::new());
    let join = graph.add(SideBySide);
    graph.set_input(shift, "input", Arc::new(ramp(8, 3))).unwrap();
    graph.connect(shift, "output", join, "left").unwrap();
    graph.connect(shift, "output", join, "right").unwrap();
    graph.set_parameter(shift, "shift", 100.0).unwrap();

    let requested = ImageRegion::new(vec![1, 0], vec![4, 3]).unwrap();
    graph.set_output_requested_region(join, requested.clone()).unwrap();
    graph.update(join).unwrap();

    // [1, 4) for the left half and [4, 5) for the right
    let shifted = graph.output_image::<u8>(shift, "output").unwrap();
    assert_eq!(shifted.buffered_region(), &requested);

    let out = graph.output_image::<u8>(join, "output").unwrap();
    assert_eq!(out.buffered_region(), &requested);
    assert_eq!(out.get_pixel(&[3, 1]).unwrap(), 111);
    assert_eq!(out.get_pixel(&[4, 2]).unwrap(), 120);
}

#[test]
fn a_request_entirely_on_one_side_leaves_the_other_input_empty() {
    let mut graph = PipelineGraph::new();
    let join = graph.add(SideBySide);
    let left = graph.set_input(join, "left", Arc::new(ramp(8, 2))).unwrap();
    let right = graph.set_input(join, "right", Arc::new(ramp(8, 2))).unwrap();
    graph
        .set_output_requested_region(join, ImageRegion::new(vec![0, 0], vec![2, 2]).unwrap())
        .unwrap();
    graph.update(join).unwrap();

    let left_out = graph.output(left, ImageSource::OUTPUT).unwrap();
    let right_out = graph.output(right, ImageSource::OUTPUT).unwrap();
    assert_eq!(left_out.requested_region().size(), &[2, 2]);
    assert!(right_out.requested_region().is_empty());
}

#[test]
fn a_narrow_request_travels_through_shrink() {
    let (mut graph, _, shift, shrink) = chain(8, 6);
    let requested = ImageRegion::new(vec![1, 1], vec![2, 1]).unwrap();
    graph.set_output_requested_region(shrink, requested.clone()).unwrap();
    graph.update(shrink).unwrap();

    let shifted = graph.output_image::<u8>(shift, "output").unwrap();
    assert_eq!(
        shifted.buffered_region(),
        &ImageRegion::new(vec![2, 2], vec![4, 2]).unwrap()
    );
    let out = graph.output_image::<u8>(shrink, "output").unwrap();
    assert_eq!(out.buffered_region(), &requested);
    assert_eq!(out.buffer(), &[18, 20]);
    assert_eq!(out.spacing(), &[2.0, 2.0]);
}

#[test]
fn terminals_sharing_a_producer_reuse_its_output() {
    let (mut graph, source, shift, shrink) = chain(8, 8);
    let other = graph.add(Shrink::<u8>::new());
    graph.set_parameter(other, "factor", 4i64).unwrap();
    graph.connect(shift, "output", other, "input").unwrap();

    graph.update(shrink).unwrap();
    let report = graph.update(other).unwrap();
    assert_eq!(report.executed, vec![other]);
    assert_eq!(report.skipped, vec![source, shift]);

    let out = graph.output_image::<u8>(other, "output").unwrap();
    assert_eq!(out.buffer(), &[0, 4, 32, 36]);
}

#[test]
fn replacing_source_data_reruns_the_chain() {
    let (mut graph, source, shift, shrink) = chain(4, 4);
    graph.update(shrink).unwrap();

    graph
        .set_source_data(source, Arc::new(Image::filled(&[6, 2], 9u8)))
        .unwrap();
    let report = graph.update(shrink).unwrap();
    assert_eq!(report.executed, vec![source, shift, shrink]);

    let out = graph.output_image::<u8>(shrink, "output").unwrap();
    assert_eq!(out.largest_possible_region().size(), &[3, 1]);
    assert_eq!(out.buffer(), &[9, 9, 9]);
}

#[test]
fn set_input_replaces_the_previous_source() {
    let (mut graph, first, shift, shrink) = chain(4, 4);
    let nodes = graph.node_count();
    let second = graph
        .set_input(shift, "input", Arc::new(Image::filled(&[2, 2], 7u8)))
        .unwrap();

    assert_ne!(first, second);
    assert!(!graph.has_node(first));
    assert_eq!(graph.node_count(), nodes);
    graph.update(shrink).unwrap();
    assert_eq!(graph.output_image::<u8>(shrink, "output").unwrap().buffer(), &[7]);
}

#[test]
fn only_sources_accept_data() {
    let (mut graph, _, shift, _) = chain(4, 4);
    let result = graph.set_source_data(shift, Arc::new(Image::filled(&[2, 2], 0u8)));
    assert!(matches!(result, Err(GraphError::NotASource(id)) if id == shift));
}

#[test]
fn constraint_violations_stop_the_update_before_execution() {
    let (mut graph, source, shift, shrink) = chain(4, 4);
    graph.set_parameter(shrink, "factor", 0i64).unwrap();

    let result = graph.update(shrink);
    assert!(matches!(
        result,
        Err(FlowError::Validation(ValidationError::ConstraintViolation { .. }))
    ));
    for id in [source, shift, shrink] {
        assert!(graph.get_node(id).unwrap().last_update().is_none());
    }
}

#[test]
fn results_do_not_depend_on_work_units() {
    let run = |work_units: usize| {
        let (mut graph, _, shift, shrink) = chain(13, 7);
        graph.set_parameter(shift, "scale", 3.0).unwrap();
        graph.set_parameter(shrink, "factor", 1i64).unwrap();
        let options = ExecutionOptions::new().with_work_units(work_units);
        graph.update_with(shrink, options).unwrap();
        graph.output_image::<u8>(shrink, "output").unwrap().buffer().to_vec()
    };

    let expected = run(1);
    for work_units in [2, 3, 7, 64] {
        assert_eq!(run(work_units), expected);
    }
}

#[test]
fn abort_between_nodes_keeps_finished_work() {
    let (mut graph, _, shift, shrink) = chain(8, 8);
    let abort = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&abort);
    let options = ExecutionOptions::new()
        .with_abort_flag(Arc::clone(&abort))
        .with_progress(move |update| {
            if matches!(update, ProgressUpdate::Completed { node_id, .. } if *node_id == shift) {
                trigger.store(true, Ordering::SeqCst);
            }
        });

    let result = graph.update_with(shrink, options);
    assert!(matches!(
        result,
        Err(FlowError::Execution(ExecutionError::Aborted { node_id })) if node_id == shrink
    ));
    assert!(graph.get_node(shift).unwrap().last_update().is_some());
    assert!(graph.get_node(shrink).unwrap().output("output").is_none());

    let report = graph.update(shrink).unwrap();
    assert_eq!(report.executed, vec![shrink]);
}

#[test]
fn reruns_reuse_unshared_buffers() {
    let (mut graph, _, shift, shrink) = chain(8, 6);
    let first = graph.update(shrink).unwrap();
    assert_eq!(first.stats.bytes_allocated, 48 + 12);

    graph.set_parameter(shift, "shift", 1.0).unwrap();
    let second = graph.update(shrink).unwrap();
    assert_eq!(second.executed, vec![shift, shrink]);
    assert_eq!(second.stats.bytes_allocated, 0);

    // a handle held by the caller forces a fresh buffer
    let held = graph.output_image::<u8>(shrink, "output").unwrap();
    graph.set_parameter(shift, "shift", 2.0).unwrap();
    let third = graph.update(shrink).unwrap();
    assert_eq!(third.stats.bytes_allocated, 12);
    assert_eq!(held.get_pixel(&[0, 0]).unwrap(), 1);
    assert_eq!(
        graph.output_image::<u8>(shrink, "output").unwrap().get_pixel(&[0, 0]).unwrap(),
        2
    );
}

#[test]
fn stale_reasons_explain_reexecution() {
    let (mut graph, _, shift, shrink) = chain(8, 8);
    let whole = |graph: &PipelineGraph, id| {
        let info = graph.get_node(id).unwrap().output_info("output").unwrap().clone();
        HashMap::from([("output".to_string(), info.largest_possible_region)])
    };

    assert_eq!(
        ExecutionEngine::stale_reason(&graph, shrink, &HashMap::new()).unwrap(),
        Some(StaleReason::NeverExecuted)
    );

    let narrow = ImageRegion::new(vec![0, 0], vec![2, 2]).unwrap();
    graph.set_output_requested_region(shrink, narrow).unwrap();
    graph.update(shrink).unwrap();
    let requested = whole(&graph, shrink);
    assert_eq!(
        ExecutionEngine::stale_reason(&graph, shrink, &requested).unwrap(),
        Some(StaleReason::RegionNotBuffered {
            port: "output".to_string()
        })
    );

    graph.set_parameter(shift, "scale", 2.0).unwrap();
    assert_eq!(
        ExecutionEngine::stale_reason(&graph, shift, &HashMap::new()).unwrap(),
        Some(StaleReason::Modified)
    );
    graph.update(shift).unwrap();
    assert_eq!(
        ExecutionEngine::stale_reason(&graph, shrink, &HashMap::new()).unwrap(),
        Some(StaleReason::UpstreamNewer { upstream: shift })
    );
}
