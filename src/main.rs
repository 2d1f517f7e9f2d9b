//! Regionflow CLI
//!
//! A small front end to the library: inspect numeric traits, run a shape
//! opening on a synthetic image, or open a binary image file.

use anyhow::{bail, Context, Result};
use regionflow::prelude::*;
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "traits" => match args.get(2) {
            Some(kind) => show_traits(kind),
            None => Err(anyhow::anyhow!("Please specify a pixel kind, e.g. u8 or rgb<f32>")),
        },
        "demo" => run_demo(&args[2..]),
        "open" => {
            if args.len() < 4 {
                eprintln!("Usage: {} open <input> <output> [options]", args[0]);
                std::process::exit(2);
            }
            open_file(&args[2], &args[3], &args[4..])
        }
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&args[0]);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("regionflow v{}", regionflow::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  traits <kind>             Print the numeric traits of a pixel kind as JSON");
    println!("  demo [options]            Shape opening on a generated image");
    println!("  open <in> <out> [options] Shape opening of a binary 8-bit image file");
    println!("  help                      Show this help message");
    println!();
    println!("Opening options:");
    println!("  --lambda <value>          Attribute threshold (default: 0)");
    println!("  --attribute <name>        Shape attribute (default: number_of_pixels)");
    println!("  --reverse                 Remove objects above lambda instead");
    println!("  --fully-connected         Join diagonal neighbours");
    println!("  --foreground <value>      Object pixel value (default: 255)");
    println!("  --work-units <n>          Work units per filter");
    println!("  --memory-mb <n>           Memory limit of the update");
    println!();
    println!("Demo options:");
    println!("  --size <n>                Side of the generated image (default: 256)");
}

/// Opening settings shared by `demo` and `open`.
#[derive(Debug, Clone)]
struct OpeningArgs {
    lambda: f64,
    attribute: ShapeAttribute,
    reverse: bool,
    fully_connected: bool,
    foreground: i64,
    work_units: Option<usize>,
    memory_mb: Option<usize>,
    size: usize,
}

impl Default for OpeningArgs {
    fn default() -> Self {
        Self {
            lambda: 0.0,
            attribute: ShapeAttribute::default(),
            reverse: false,
            fully_connected: false,
            foreground: 255,
            work_units: None,
            memory_mb: None,
            size: 256,
        }
    }
}

fn parse_options(args: &[String]) -> Result<OpeningArgs> {
    fn value<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
        args.get(i + 1)
            .map(String::as_str)
            .with_context(|| format!("{} needs a value", args[i]))
    }

    let mut options = OpeningArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lambda" => {
                options.lambda = value(args, i)?.parse().context("invalid --lambda")?;
                i += 2;
            }
            "--attribute" => {
                options.attribute = value(args, i)?.parse().map_err(anyhow::Error::msg)?;
                i += 2;
            }
            "--foreground" => {
                options.foreground = value(args, i)?.parse().context("invalid --foreground")?;
                i += 2;
            }
            "--work-units" => {
                options.work_units = Some(value(args, i)?.parse().context("invalid --work-units")?);
                i += 2;
            }
            "--memory-mb" => {
                options.memory_mb = Some(value(args, i)?.parse().context("invalid --memory-mb")?);
                i += 2;
            }
            "--size" => {
                options.size = value(args, i)?.parse().context("invalid --size")?;
                i += 2;
            }
            "--reverse" => {
                options.reverse = true;
                i += 1;
            }
            "--fully-connected" => {
                options.fully_connected = true;
                i += 1;
            }
            other => bail!("Unknown option: {}", other),
        }
    }
    Ok(options)
}

fn show_traits(kind: &str) -> Result<()> {
    let kind: PixelKind = kind.parse().map_err(anyhow::Error::msg)?;
    let record = trait_record(kind);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Add a configured opening node to `graph`.
fn add_opening(graph: &mut PipelineGraph, options: &OpeningArgs) -> Result<NodeId> {
    let opening = graph.add(BinaryShapeOpening::<u8>::new());
    graph.set_parameter(opening, "lambda", options.lambda)?;
    graph.set_parameter(opening, "attribute", options.attribute.name())?;
    graph.set_parameter(opening, "reverse_ordering", options.reverse)?;
    graph.set_parameter(opening, "fully_connected", options.fully_connected)?;
    graph.set_parameter(opening, "foreground_value", options.foreground)?;
    if let Some(work_units) = options.work_units {
        graph.set_number_of_work_units(opening, work_units)?;
    }
    Ok(opening)
}

fn execution_options(options: &OpeningArgs) -> ExecutionOptions {
    let mut execution = ExecutionOptions::new().with_progress(|update| match update {
        ProgressUpdate::Started { node_name, .. } => log::info!("Running {}", node_name),
        ProgressUpdate::Error { message, .. } => log::error!("{}", message),
        _ => {}
    });
    if let Some(work_units) = options.work_units {
        execution = execution.with_work_units(work_units);
    }
    if let Some(mb) = options.memory_mb {
        execution = execution.with_memory_limit_mb(mb);
    }
    execution
}

/// Discs of growing radius on a regular grid, plus isolated noise pixels.
fn synthetic_image(side: usize, foreground: u8) -> Image<u8> {
    let mut data = vec![0u8; side * side];
    let cell = 32usize;
    for (n, (cy, cx)) in (0..side / cell)
        .flat_map(|j| (0..side / cell).map(move |i| (j, i)))
        .enumerate()
    {
        let radius = (n % 12) as i64 + 1;
        let (cx, cy) = ((cx * cell + cell / 2) as i64, (cy * cell + cell / 2) as i64);
        for y in (cy - radius).max(0)..(cy + radius + 1).min(side as i64) {
            for x in (cx - radius).max(0)..(cx + radius + 1).min(side as i64) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius {
                    data[y as usize * side + x as usize] = foreground;
                }
            }
        }
    }
    for k in (0..side * side).step_by(997) {
        data[k] = foreground;
    }
    Image::from_vec(&[side, side], data).unwrap_or_else(|_| Image::filled(&[side, side], 0))
}

fn run_demo(args: &[String]) -> Result<()> {
    let options = parse_options(args)?;
    let foreground = u8::try_from(options.foreground).context("--foreground must fit in u8")?;
    let image = synthetic_image(options.size, foreground);

    let mut graph = PipelineGraph::new();
    let opening = add_opening(&mut graph, &options)?;
    let source = graph.set_input(opening, "input", Arc::new(image))?;

    // Object counts before and after
    let before = graph.add(BinaryImageToLabelMap::<u8>::new());
    let after = graph.add(BinaryImageToLabelMap::<u8>::new());
    for node in [before, after] {
        graph.set_parameter(node, "input_foreground_value", options.foreground)?;
        graph.set_parameter(node, "fully_connected", options.fully_connected)?;
    }
    graph.connect(source, ImageSource::OUTPUT, before, "input")?;
    graph.connect(opening, "output", after, "input")?;

    graph.update_with(before, execution_options(&options))?;
    let report = graph.update_with(after, execution_options(&options))?;
    let objects_before = graph.output_object::<LabelMap>(before, "output")?.number_of_objects();
    let objects_after = graph.output_object::<LabelMap>(after, "output")?.number_of_objects();

    println!(
        "{}x{} image, {} on {}: {} objects -> {} objects",
        options.size, options.size, options.attribute, options.lambda, objects_before, objects_after
    );
    println!("{}", serde_json::to_string_pretty(&report.stats)?);

    let again = graph.update_with(after, execution_options(&options))?;
    println!(
        "Second update: {} executed, {} skipped",
        again.executed.len(),
        again.skipped.len()
    );
    Ok(())
}

fn open_file(input: &str, output: &str, args: &[String]) -> Result<()> {
    let options = parse_options(args)?;

    let mut graph = PipelineGraph::new();
    let reader = graph.add(ImageFileReader::<u8>::new());
    graph.set_parameter(reader, "path", input)?;
    let opening = add_opening(&mut graph, &options)?;
    let writer = graph.add(ImageFileWriter::<u8>::new());
    graph.set_parameter(writer, "path", output)?;
    graph.connect(reader, "output", opening, "input")?;
    graph.connect(opening, "output", writer, "input")?;

    let report = graph
        .update_with(writer, execution_options(&options))
        .with_context(|| format!("failed to open {}", input))?;
    println!(
        "Wrote {} in {} ms ({} nodes)",
        output,
        report.stats.total_duration_ms,
        report.stats.nodes_executed
    );
    Ok(())
}
