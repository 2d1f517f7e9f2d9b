//! Properties of the numeric trait registry.

use proptest::prelude::*;
use regionflow::core::numeric::scalar_record;
use regionflow::prelude::*;

fn any_scalar_kind() -> impl Strategy<Value = ScalarKind> {
    prop::sample::select(ScalarKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn structured_records_pack_the_element_record(kind in any_scalar_kind(), arity in 1usize..9) {
        let element = scalar_record(kind);
        let record = trait_record(PixelKind::structured(kind, arity));

        prop_assert_eq!(record.length(), arity);
        prop_assert_eq!(record.is_signed, element.is_signed);
        prop_assert_eq!(record.is_integer, element.is_integer);
        prop_assert_eq!(record.accumulate_kind, PixelKind::structured(element.accumulate_kind.element(), arity));
        for (field, scalar) in [
            (&record.zero, &element.zero),
            (&record.one, &element.one),
            (&record.min, &element.min),
            (&record.max, &element.max),
            (&record.nonpositive_min, &element.nonpositive_min),
        ] {
            prop_assert_eq!(field.components().len(), arity);
            prop_assert!(field.components().iter().all(|c| c == &scalar.components()[0]));
        }
    }

    #[test]
    fn set_length_only_accepts_the_fixed_length(kind in any_scalar_kind(), arity in 1usize..6, length in 0usize..8) {
        let record = trait_record(PixelKind::structured(kind, arity));
        let mut value = record.max.clone();
        let result = record.set_length(&mut value, length);
        if length == arity {
            prop_assert!(result.is_ok());
            prop_assert_eq!(&value, &record.zero);
        } else {
            prop_assert_eq!(result, Err(PixelError::SizeMismatch { expected: arity, got: length }));
            prop_assert_eq!(&value, &record.max);
        }
    }

    #[test]
    fn static_and_runtime_predicates_agree(r in -1000i32..1000, g in -1000i32..1000, b in -1000i32..1000) {
        let pixel = Rgb::new(r, g, b);
        let record = <Rgb<i32>>::trait_record();
        let value = pixel.to_pixel_value();
        let luminance = 0.30 * r as f64 + 0.59 * g as f64 + 0.11 * b as f64;

        prop_assert_eq!(pixel.is_positive(), luminance > 0.0);
        prop_assert_eq!(record.is_positive(&value).unwrap(), pixel.is_positive());
        prop_assert_eq!(record.is_nonpositive(&value).unwrap(), pixel.is_nonpositive());
        prop_assert_eq!(record.is_negative(&value).unwrap(), pixel.is_negative());
        prop_assert_eq!(record.is_nonnegative(&value).unwrap(), pixel.is_nonnegative());
    }

    #[test]
    fn from_f64_saturates_into_range(v in -1.0e6f64..1.0e6) {
        let byte = <u8 as ScalarPixel>::from_f64(v);
        prop_assert_eq!(byte as f64, v.round().clamp(0.0, 255.0));
        let short = <i16 as ScalarPixel>::from_f64(v);
        prop_assert_eq!(short as f64, v.round().clamp(i16::MIN as f64, i16::MAX as f64));
    }

    #[test]
    fn pixel_values_survive_the_runtime_path(r: u8, g: u8, b: u8, a: u8) {
        let pixel = Rgba::new(r, g, b, a);
        let value = pixel.to_pixel_value();
        prop_assert_eq!(value.kind(), <Rgba<u8>>::pixel_kind());
        prop_assert_eq!(<Rgba<u8>>::from_pixel_value(&value).unwrap(), pixel);
        prop_assert!(<Rgb<u8>>::from_pixel_value(&value).is_err());
    }
}

#[test]
fn every_kind_name_parses_back() {
    for kind in ScalarKind::ALL {
        for pixel in [
            PixelKind::scalar(kind),
            PixelKind::structured(kind, 3),
            PixelKind::structured(kind, 4),
            PixelKind::structured(kind, 7),
        ] {
            assert_eq!(pixel.to_string().parse::<PixelKind>().unwrap(), pixel);
        }
    }
}

#[test]
fn float_records_use_smallest_positive_min() {
    let record = trait_record(PixelKind::scalar(ScalarKind::F64));
    assert_eq!(record.min, PixelValue::Scalar(ScalarValue::F64(f64::MIN_POSITIVE)));
    assert_eq!(record.nonpositive_min, PixelValue::Scalar(ScalarValue::F64(-f64::MAX)));
    assert!(record.is_signed);
    assert!(!record.is_integer);
}
