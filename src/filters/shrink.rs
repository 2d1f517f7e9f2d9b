//! Integer subsampling.

use crate::core::context::{ExecutionContext, InformationContext, ParameterAccess, RegionContext};
use crate::core::error::{ExecutionError, ExecutionResult};
use crate::core::image::ImageInfo;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::NumericTraits;
use crate::core::port::{Constraint, ParameterDefinition, PortDefinition};
use crate::core::region::ImageRegion;
use crate::core::types::{PortType, Value};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Keeps every `factor`-th pixel along each axis.
///
/// Output pixel `o` is input pixel `o * factor`, so both images share their
/// origin and the output spacing is the input spacing times `factor`.
#[derive(Debug, Clone, Default)]
pub struct Shrink<T> {
    _pixel: PhantomData<T>,
}

impl<T: NumericTraits> Shrink<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

fn factor<C: ParameterAccess>(ctx: &C) -> ExecutionResult<i64> {
    let factor = ctx.get_integer("factor")?;
    if factor < 1 {
        return Err(ctx.invalid("factor", "must be at least 1"));
    }
    Ok(factor)
}

/// Largest output region for an input region.
fn shrink_region(input: &ImageRegion, factor: i64) -> ImageRegion {
    let index: Vec<i64> = input.index().iter().map(|&i| ceil_div(i, factor)).collect();
    let size: Vec<usize> = input.size().iter().map(|&s| s / factor as usize).collect();
    ImageRegion::new(index, size).unwrap_or_else(|_| ImageRegion::from_size(input.size()))
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    -((-value).div_euclid(divisor))
}

impl<T: NumericTraits> FilterNode for Shrink<T> {
    fn metadata(&self) -> NodeMetadata {
        let port_type = PortType::Image(T::pixel_kind());
        NodeMetadata::builder(format!("shrink_{}", T::pixel_kind()), "Shrink")
            .description("Subsample by an integer factor along every axis")
            .category(Category::Transform)
            .input(PortDefinition::input("input", port_type))
            .output(PortDefinition::output("output", port_type))
            .parameter(
                ParameterDefinition::new("factor", PortType::Integer, Value::Integer(2))
                    .with_description("Subsampling factor")
                    .with_constraint(Constraint::Positive),
            )
            .build()
    }

    fn generate_output_information(
        &self,
        ctx: &InformationContext,
    ) -> ExecutionResult<HashMap<String, ImageInfo>> {
        let factor = factor(ctx)?;
        let mut info = ctx.input_info("input")?.clone();
        info.largest_possible_region = shrink_region(&info.largest_possible_region, factor);
        for spacing in &mut info.spacing {
            *spacing *= factor as f64;
        }
        Ok(HashMap::from([("output".to_string(), info)]))
    }

    fn generate_input_requested_region(
        &self,
        ctx: &RegionContext,
    ) -> ExecutionResult<HashMap<String, ImageRegion>> {
        let factor = factor(ctx)?;
        let requested = ctx.output_requested_region("output")?;
        let largest = &ctx.input_info("input")?.largest_possible_region;
        let index = requested.index().iter().map(|&i| i * factor).collect();
        let size = requested
            .size()
            .iter()
            .map(|&s| s * factor as usize)
            .collect();
        let region = ImageRegion::new(index, size)?.clipped_to(largest);
        Ok(HashMap::from([("input".to_string(), region)]))
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let factor = factor(ctx)?;
        let input = ctx.input_image::<T>("input")?.clone();
        let mut output = ctx.allocate_output::<T>("output", T::zero())?;

        ctx.run_work_units(&mut output, 0.0, 1.0, |region, out| {
            for (o, index) in out.iter_mut().zip(region.indices()) {
                let source: Vec<i64> = index.iter().map(|&i| i * factor).collect();
                *o = input.get_pixel(&source).map_err(ExecutionError::from)?;
            }
            Ok(())
        })?;

        ctx.set_output("output", output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
