//! Pointwise intensity filters.

use crate::core::context::{ExecutionContext, ParameterAccess};
use crate::core::error::{ExecutionResult, RegionError};
use crate::core::image::DataObject;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::numeric::{NumericTraits, ScalarPixel};
use crate::core::port::{ParameterDefinition, PortDefinition};
use crate::core::types::{PortType, Value};
use std::marker::PhantomData;

/// Computes `(p + shift) * scale` for every pixel, saturating to `T`.
#[derive(Debug, Clone, Default)]
pub struct ShiftScale<T> {
    _pixel: PhantomData<T>,
}

impl<T: ScalarPixel> ShiftScale<T> {
    pub fn new() -> Self {
        Self {
            _pixel: PhantomData,
        }
    }
}

impl<T: ScalarPixel> FilterNode for ShiftScale<T> {
    fn metadata(&self) -> NodeMetadata {
        let port_type = PortType::Image(T::pixel_kind());
        NodeMetadata::builder(format!("shift_scale_{}", T::KIND), "Shift Scale")
            .description("Shift then scale every pixel")
            .category(Category::Intensity)
            .input(PortDefinition::input("input", port_type).with_description("Input image"))
            .output(PortDefinition::output("output", port_type).with_description("Mapped image"))
            .parameter(
                ParameterDefinition::new("shift", PortType::Float, Value::Float(0.0))
                    .with_description("Added before scaling"),
            )
            .parameter(
                ParameterDefinition::new("scale", PortType::Float, Value::Float(1.0))
                    .with_description("Multiplier applied after the shift"),
            )
            .supports_progress()
            .build()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext) -> ExecutionResult<()> {
        let shift = ctx.get_float("shift")?;
        let scale = ctx.get_float("scale")?;
        let input = ctx.input_image::<T>("input")?.clone();
        let mut output = ctx.allocate_output::<T>("output", T::zero())?;

        ctx.run_work_units(&mut output, 0.0, 1.0, |region, out| {
            let width = region.size()[0];
            let source = input.buffered_region();
            for (row, start) in region.lines().enumerate() {
                let offset = source
                    .offset_of(&start)
                    .ok_or_else(|| RegionError::IndexOutOfBounds {
                        index: start.clone(),
                        region: source.clone(),
                    })?;
                let src = &input.buffer()[offset..offset + width];
                let dst = &mut out[row * width..(row + 1) * width];
                for (o, &p) in dst.iter_mut().zip(src) {
                    *o = T::from_f64((p.to_f64() + shift) * scale);
                }
            }
            Ok(())
        })?;

        ctx.set_output("output", output)
    }

    fn clone_box(&self) -> Box<dyn FilterNode> {
        Box::new(self.clone())
    }
}
