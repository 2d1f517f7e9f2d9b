//! Numeric trait registry for pixel types.
//!
//! Every pixel type has a trait record: its identity and bound values, its
//! sign properties and the types used when accumulating, taking absolute
//! values or printing. The record exists twice:
//!
//! - statically, as the [`NumericTraits`] trait, for filter code that is
//!   generic over the pixel type;
//! - at runtime, as [`TraitRecord`] values resolved by [`trait_record`], for
//!   code that only knows a [`PixelKind`] tag (ports, the CLI, validation).
//!
//! Both are generated from the single scalar table in [`with_scalar_registry`].
//! Structured kinds are never tabulated: their records are derived from the
//! element kind's record by packing every field component-wise.

use crate::core::error::PixelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Scalar registry in callback form.
///
/// Each entry reads:
/// ```text
/// rust_type => Kind {
///     abs: type => Kind, accumulate: type => Kind, float: type => Kind,
///     real: type => Kind, print: type => Kind,
///     signed: bool, integer: bool, min: expr, nonpositive_min: expr,
/// }
/// ```
#[macro_export]
macro_rules! with_scalar_registry {
    ($callback:path) => {
        $callback! {
            i8 => I8 {
                abs: u8 => U8, accumulate: i16 => I16, float: f32 => F32,
                real: f64 => F64, print: i32 => I32,
                signed: true, integer: true, min: i8::MIN, nonpositive_min: i8::MIN,
            },
            u8 => U8 {
                abs: u8 => U8, accumulate: u16 => U16, float: f32 => F32,
                real: f64 => F64, print: i32 => I32,
                signed: false, integer: true, min: u8::MIN, nonpositive_min: u8::MIN,
            },
            i16 => I16 {
                abs: u16 => U16, accumulate: i32 => I32, float: f32 => F32,
                real: f64 => F64, print: i16 => I16,
                signed: true, integer: true, min: i16::MIN, nonpositive_min: i16::MIN,
            },
            u16 => U16 {
                abs: u16 => U16, accumulate: u32 => U32, float: f32 => F32,
                real: f64 => F64, print: u16 => U16,
                signed: false, integer: true, min: u16::MIN, nonpositive_min: u16::MIN,
            },
            i32 => I32 {
                abs: u32 => U32, accumulate: i64 => I64, float: f32 => F32,
                real: f64 => F64, print: i32 => I32,
                signed: true, integer: true, min: i32::MIN, nonpositive_min: i32::MIN,
            },
            u32 => U32 {
                abs: u32 => U32, accumulate: u64 => U64, float: f32 => F32,
                real: f64 => F64, print: u32 => U32,
                signed: false, integer: true, min: u32::MIN, nonpositive_min: u32::MIN,
            },
            i64 => I64 {
                abs: u64 => U64, accumulate: i64 => I64, float: f32 => F32,
                real: f64 => F64, print: i64 => I64,
                signed: true, integer: true, min: i64::MIN, nonpositive_min: i64::MIN,
            },
            u64 => U64 {
                abs: u64 => U64, accumulate: u64 => U64, float: f32 => F32,
                real: f64 => F64, print: u64 => U64,
                signed: false, integer: true, min: u64::MIN, nonpositive_min: u64::MIN,
            },
            f32 => F32 {
                abs: f32 => F32, accumulate: f64 => F64, float: f32 => F32,
                real: f64 => F64, print: f32 => F32,
                signed: true, integer: false, min: f32::MIN_POSITIVE, nonpositive_min: -f32::MAX,
            },
            f64 => F64 {
                abs: f64 => F64, accumulate: f64 => F64, float: f64 => F64,
                real: f64 => F64, print: f64 => F64,
                signed: true, integer: false, min: f64::MIN_POSITIVE, nonpositive_min: -f64::MAX,
            },
        }
    };
}

// ============================================================================
// Kinds and values
// ============================================================================

/// Built-in scalar element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Every scalar kind, in table order.
    pub const ALL: [ScalarKind; 10] = [
        ScalarKind::I8,
        ScalarKind::U8,
        ScalarKind::I16,
        ScalarKind::U16,
        ScalarKind::I32,
        ScalarKind::U32,
        ScalarKind::I64,
        ScalarKind::U64,
        ScalarKind::F32,
        ScalarKind::F64,
    ];

    /// Lowercase Rust type name.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::I8 => "i8",
            ScalarKind::U8 => "u8",
            ScalarKind::I16 => "i16",
            ScalarKind::U16 => "u16",
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::I64 => "i64",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }

    /// Storage size of one element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    fn table_index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalarKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown scalar kind '{}'", s))
    }
}

/// Tag describing a pixel type: a scalar, or a fixed-arity structure of one
/// scalar element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum PixelKind {
    Scalar { element: ScalarKind },
    Structured { element: ScalarKind, arity: usize },
}

impl PixelKind {
    /// Shorthand for a scalar kind.
    pub const fn scalar(element: ScalarKind) -> Self {
        PixelKind::Scalar { element }
    }

    /// Shorthand for a structured kind.
    pub const fn structured(element: ScalarKind, arity: usize) -> Self {
        PixelKind::Structured { element, arity }
    }

    /// Element kind of every component.
    pub fn element(&self) -> ScalarKind {
        match self {
            PixelKind::Scalar { element } | PixelKind::Structured { element, .. } => *element,
        }
    }

    /// Number of components; 1 for scalars.
    pub fn length(&self) -> usize {
        match self {
            PixelKind::Scalar { .. } => 1,
            PixelKind::Structured { arity, .. } => *arity,
        }
    }

    /// Bytes needed to store one pixel.
    pub fn size_in_bytes(&self) -> usize {
        self.element().size_in_bytes() * self.length()
    }

    /// Same shape, different element kind.
    pub fn with_element(&self, element: ScalarKind) -> Self {
        match self {
            PixelKind::Scalar { .. } => PixelKind::Scalar { element },
            PixelKind::Structured { arity, .. } => PixelKind::Structured {
                element,
                arity: *arity,
            },
        }
    }
}

impl fmt::Display for PixelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelKind::Scalar { element } => write!(f, "{}", element),
            PixelKind::Structured { element, arity: 3 } => write!(f, "rgb<{}>", element),
            PixelKind::Structured { element, arity: 4 } => write!(f, "rgba<{}>", element),
            PixelKind::Structured { element, arity } => write!(f, "[{}; {}]", element, arity),
        }
    }
}

impl FromStr for PixelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("rgba<").and_then(|r| r.strip_suffix('>')) {
            return Ok(PixelKind::structured(inner.parse()?, 4));
        }
        if let Some(inner) = s.strip_prefix("rgb<").and_then(|r| r.strip_suffix('>')) {
            return Ok(PixelKind::structured(inner.parse()?, 3));
        }
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let (element, arity) = inner
                .split_once(';')
                .ok_or_else(|| format!("expected '[element; arity]', got '{}'", s))?;
            let arity: usize = arity
                .trim()
                .parse()
                .map_err(|_| format!("invalid arity in '{}'", s))?;
            return Ok(PixelKind::structured(element.trim().parse()?, arity));
        }
        Ok(PixelKind::scalar(s.parse()?))
    }
}

/// One scalar value tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ScalarValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    /// Kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::I8(_) => ScalarKind::I8,
            ScalarValue::U8(_) => ScalarKind::U8,
            ScalarValue::I16(_) => ScalarKind::I16,
            ScalarValue::U16(_) => ScalarKind::U16,
            ScalarValue::I32(_) => ScalarKind::I32,
            ScalarValue::U32(_) => ScalarKind::U32,
            ScalarValue::I64(_) => ScalarKind::I64,
            ScalarValue::U64(_) => ScalarKind::U64,
            ScalarValue::F32(_) => ScalarKind::F32,
            ScalarValue::F64(_) => ScalarKind::F64,
        }
    }

    /// Widen to `f64`.
    pub fn to_f64(&self) -> f64 {
        match *self {
            ScalarValue::I8(v) => v as f64,
            ScalarValue::U8(v) => v as f64,
            ScalarValue::I16(v) => v as f64,
            ScalarValue::U16(v) => v as f64,
            ScalarValue::I32(v) => v as f64,
            ScalarValue::U32(v) => v as f64,
            ScalarValue::I64(v) => v as f64,
            ScalarValue::U64(v) => v as f64,
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
        }
    }

    /// Convert `value` to `kind`, rounding and saturating for integers.
    pub fn from_f64(kind: ScalarKind, value: f64) -> Self {
        macro_rules! cast {
            ($($t:ty => $kind:ident),* $(,)?) => {
                match kind {
                    $(ScalarKind::$kind => ScalarValue::$kind(<$t as ScalarPixel>::from_f64(value)),)*
                }
            };
        }
        cast!(
            i8 => I8, u8 => U8, i16 => I16, u16 => U16, i32 => I32,
            u32 => U32, i64 => I64, u64 => U64, f32 => F32, f64 => F64,
        )
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{}", v),
            ScalarValue::U8(v) => write!(f, "{}", v),
            ScalarValue::I16(v) => write!(f, "{}", v),
            ScalarValue::U16(v) => write!(f, "{}", v),
            ScalarValue::I32(v) => write!(f, "{}", v),
            ScalarValue::U32(v) => write!(f, "{}", v),
            ScalarValue::I64(v) => write!(f, "{}", v),
            ScalarValue::U64(v) => write!(f, "{}", v),
            ScalarValue::F32(v) => write!(f, "{:e}", v),
            ScalarValue::F64(v) => write!(f, "{:e}", v),
        }
    }
}

/// A pixel value of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "components", rename_all = "lowercase")]
pub enum PixelValue {
    Scalar(ScalarValue),
    Structured(Vec<ScalarValue>),
}

impl PixelValue {
    /// Kind of this value. An empty structure reports a `u8` element.
    pub fn kind(&self) -> PixelKind {
        match self {
            PixelValue::Scalar(v) => PixelKind::scalar(v.kind()),
            PixelValue::Structured(components) => PixelKind::structured(
                components.first().map(|c| c.kind()).unwrap_or(ScalarKind::U8),
                components.len(),
            ),
        }
    }

    /// Components as a slice; a scalar is a one-element slice.
    pub fn components(&self) -> &[ScalarValue] {
        match self {
            PixelValue::Scalar(v) => std::slice::from_ref(v),
            PixelValue::Structured(components) => components,
        }
    }

    /// The single scalar used for sign predicates.
    ///
    /// Three and four component pixels use `0.30 r + 0.59 g + 0.11 b`; other
    /// structures use the mean of their components.
    pub fn luminance(&self) -> f64 {
        match self {
            PixelValue::Scalar(v) => v.to_f64(),
            PixelValue::Structured(c) if c.len() >= 3 && c.len() <= 4 => {
                0.30 * c[0].to_f64() + 0.59 * c[1].to_f64() + 0.11 * c[2].to_f64()
            }
            PixelValue::Structured(c) if c.is_empty() => 0.0,
            PixelValue::Structured(c) => {
                c.iter().map(ScalarValue::to_f64).sum::<f64>() / c.len() as f64
            }
        }
    }

    /// Convert to another kind of the same length, component by component.
    pub fn cast(&self, kind: PixelKind) -> Result<PixelValue, PixelError> {
        let components = self.components();
        match kind {
            PixelKind::Scalar { element } if components.len() == 1 => Ok(PixelValue::Scalar(
                ScalarValue::from_f64(element, components[0].to_f64()),
            )),
            PixelKind::Structured { element, arity } if components.len() == arity => {
                Ok(PixelValue::Structured(
                    components
                        .iter()
                        .map(|c| ScalarValue::from_f64(element, c.to_f64()))
                        .collect(),
                ))
            }
            // A scalar broadcasts into every component.
            PixelKind::Structured { element, arity } if components.len() == 1 => Ok(
                PixelValue::Structured(vec![ScalarValue::from_f64(element, components[0].to_f64()); arity]),
            ),
            _ => Err(PixelError::SizeMismatch {
                expected: kind.length(),
                got: components.len(),
            }),
        }
    }
}

impl fmt::Display for PixelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelValue::Scalar(v) => write!(f, "{}", v),
            PixelValue::Structured(components) => {
                write!(f, "[")?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// Runtime trait records
// ============================================================================

/// Trait record of one pixel kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitRecord {
    pub kind: PixelKind,
    pub abs_kind: PixelKind,
    pub accumulate_kind: PixelKind,
    pub float_kind: PixelKind,
    pub real_kind: PixelKind,
    pub print_kind: PixelKind,
    pub is_signed: bool,
    pub is_integer: bool,
    pub is_complex: bool,
    pub zero: PixelValue,
    pub one: PixelValue,
    pub min: PixelValue,
    pub max: PixelValue,
    pub nonpositive_min: PixelValue,
}

impl TraitRecord {
    /// Number of components of every value of this kind.
    pub fn length(&self) -> usize {
        self.kind.length()
    }

    fn checked_luminance(&self, value: &PixelValue) -> Result<f64, PixelError> {
        if value.kind() != self.kind {
            return Err(PixelError::KindMismatch {
                expected: self.kind.to_string(),
                found: value.kind().to_string(),
            });
        }
        Ok(value.luminance())
    }

    pub fn is_positive(&self, value: &PixelValue) -> Result<bool, PixelError> {
        Ok(self.checked_luminance(value)? > 0.0)
    }

    pub fn is_nonpositive(&self, value: &PixelValue) -> Result<bool, PixelError> {
        Ok(self.checked_luminance(value)? <= 0.0)
    }

    pub fn is_negative(&self, value: &PixelValue) -> Result<bool, PixelError> {
        Ok(self.checked_luminance(value)? < 0.0)
    }

    pub fn is_nonnegative(&self, value: &PixelValue) -> Result<bool, PixelError> {
        Ok(self.checked_luminance(value)? >= 0.0)
    }

    /// Zero-fill `value` when `length` matches the fixed length.
    ///
    /// Pixels never change shape: any other length is a `SizeMismatch`.
    pub fn set_length(&self, value: &mut PixelValue, length: usize) -> Result<(), PixelError> {
        if length != self.length() {
            return Err(PixelError::SizeMismatch {
                expected: self.length(),
                got: length,
            });
        }
        *value = self.zero.clone();
        Ok(())
    }

    /// Pack every field of an element record into a structure of `arity`.
    fn structured(element: &TraitRecord, arity: usize) -> TraitRecord {
        let pack_kind = |kind: PixelKind| PixelKind::structured(kind.element(), arity);
        let pack_value = |value: &PixelValue| {
            PixelValue::Structured(vec![value.components()[0]; arity])
        };
        TraitRecord {
            kind: pack_kind(element.kind),
            abs_kind: pack_kind(element.abs_kind),
            accumulate_kind: pack_kind(element.accumulate_kind),
            float_kind: pack_kind(element.float_kind),
            real_kind: pack_kind(element.real_kind),
            print_kind: pack_kind(element.print_kind),
            is_signed: element.is_signed,
            is_integer: element.is_integer,
            is_complex: element.is_complex,
            zero: pack_value(&element.zero),
            one: pack_value(&element.one),
            min: pack_value(&element.min),
            max: pack_value(&element.max),
            nonpositive_min: pack_value(&element.nonpositive_min),
        }
    }
}

macro_rules! scalar_record_table {
    ($($t:ty => $kind:ident {
        abs: $abs:ty => $abs_kind:ident, accumulate: $acc:ty => $acc_kind:ident,
        float: $float:ty => $float_kind:ident, real: $real:ty => $real_kind:ident,
        print: $print:ty => $print_kind:ident,
        signed: $signed:expr, integer: $integer:expr,
        min: $min:expr, nonpositive_min: $npmin:expr,
    }),* $(,)?) => {
        fn build_scalar_records() -> Vec<TraitRecord> {
            let mut records = vec![$(TraitRecord {
                kind: PixelKind::scalar(ScalarKind::$kind),
                abs_kind: PixelKind::scalar(ScalarKind::$abs_kind),
                accumulate_kind: PixelKind::scalar(ScalarKind::$acc_kind),
                float_kind: PixelKind::scalar(ScalarKind::$float_kind),
                real_kind: PixelKind::scalar(ScalarKind::$real_kind),
                print_kind: PixelKind::scalar(ScalarKind::$print_kind),
                is_signed: $signed,
                is_integer: $integer,
                is_complex: false,
                zero: PixelValue::Scalar(ScalarValue::$kind(<$t as NumericTraits>::zero())),
                one: PixelValue::Scalar(ScalarValue::$kind(<$t as NumericTraits>::one())),
                min: PixelValue::Scalar(ScalarValue::$kind($min)),
                max: PixelValue::Scalar(ScalarValue::$kind(<$t>::MAX)),
                nonpositive_min: PixelValue::Scalar(ScalarValue::$kind($npmin)),
            }),*];
            records.sort_by_key(|record| record.kind.element().table_index());
            records
        }
    };
}

with_scalar_registry!(scalar_record_table);

static SCALAR_RECORDS: OnceLock<Vec<TraitRecord>> = OnceLock::new();

/// The hand-specified record of a scalar kind.
pub fn scalar_record(kind: ScalarKind) -> &'static TraitRecord {
    &SCALAR_RECORDS.get_or_init(build_scalar_records)[kind.table_index()]
}

/// Resolve the trait record of any pixel kind.
pub fn trait_record(kind: PixelKind) -> TraitRecord {
    match kind {
        PixelKind::Scalar { element } => scalar_record(element).clone(),
        PixelKind::Structured { element, arity } => {
            TraitRecord::structured(scalar_record(element), arity)
        }
    }
}

// ============================================================================
// Static traits
// ============================================================================

/// Compile-time trait record of a pixel type.
pub trait NumericTraits:
    Copy + Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    type Abs: Copy + fmt::Debug;
    type Accumulate: Copy + fmt::Debug;
    type Float: Copy + fmt::Debug;
    type Real: Copy + fmt::Debug;
    type Print: Copy + fmt::Debug + fmt::Display;

    const IS_SIGNED: bool;
    const IS_INTEGER: bool;
    const IS_COMPLEX: bool = false;

    /// Runtime tag of this type.
    fn pixel_kind() -> PixelKind;

    fn zero() -> Self;
    fn one() -> Self;
    fn min_bound() -> Self;
    fn max_bound() -> Self;
    fn nonpositive_min() -> Self;

    /// Scalar the sign predicates are evaluated on.
    fn luminance(&self) -> f64;

    fn is_positive(&self) -> bool {
        self.luminance() > 0.0
    }

    fn is_nonpositive(&self) -> bool {
        self.luminance() <= 0.0
    }

    fn is_negative(&self) -> bool {
        self.luminance() < 0.0
    }

    fn is_nonnegative(&self) -> bool {
        self.luminance() >= 0.0
    }

    /// Fixed number of components.
    fn length(&self) -> usize {
        Self::pixel_kind().length()
    }

    /// Zero-fill when `length` equals the fixed length, fail otherwise.
    fn set_length(&mut self, length: usize) -> Result<(), PixelError> {
        let expected = Self::pixel_kind().length();
        if length != expected {
            return Err(PixelError::SizeMismatch {
                expected,
                got: length,
            });
        }
        *self = Self::zero();
        Ok(())
    }

    fn to_pixel_value(&self) -> PixelValue;

    fn from_pixel_value(value: &PixelValue) -> Result<Self, PixelError>;

    /// Runtime record of this type.
    fn trait_record() -> TraitRecord {
        trait_record(Self::pixel_kind())
    }
}

/// A built-in scalar usable as a pixel or as a structured pixel's element.
pub trait ScalarPixel: NumericTraits + PartialOrd {
    const KIND: ScalarKind;

    fn to_f64(self) -> f64;

    /// Convert from `f64`, rounding and saturating for integer types.
    fn from_f64(value: f64) -> Self;

    fn to_scalar_value(self) -> ScalarValue;

    fn from_scalar_value(value: &ScalarValue) -> Option<Self>;
}

macro_rules! impl_scalar_traits {
    ($($t:ty => $kind:ident {
        abs: $abs:ty => $abs_kind:ident, accumulate: $acc:ty => $acc_kind:ident,
        float: $float:ty => $float_kind:ident, real: $real:ty => $real_kind:ident,
        print: $print:ty => $print_kind:ident,
        signed: $signed:expr, integer: $integer:expr,
        min: $min:expr, nonpositive_min: $npmin:expr,
    }),* $(,)?) => {$(
        impl NumericTraits for $t {
            type Abs = $abs;
            type Accumulate = $acc;
            type Float = $float;
            type Real = $real;
            type Print = $print;

            const IS_SIGNED: bool = $signed;
            const IS_INTEGER: bool = $integer;

            fn pixel_kind() -> PixelKind {
                PixelKind::scalar(ScalarKind::$kind)
            }

            fn zero() -> Self {
                0 as $t
            }

            fn one() -> Self {
                1 as $t
            }

            fn min_bound() -> Self {
                $min
            }

            fn max_bound() -> Self {
                <$t>::MAX
            }

            fn nonpositive_min() -> Self {
                $npmin
            }

            fn luminance(&self) -> f64 {
                *self as f64
            }

            fn to_pixel_value(&self) -> PixelValue {
                PixelValue::Scalar(ScalarValue::$kind(*self))
            }

            fn from_pixel_value(value: &PixelValue) -> Result<Self, PixelError> {
                match value {
                    PixelValue::Scalar(ScalarValue::$kind(v)) => Ok(*v),
                    other => Err(PixelError::KindMismatch {
                        expected: stringify!($t).to_string(),
                        found: other.kind().to_string(),
                    }),
                }
            }
        }

        impl ScalarPixel for $t {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                if $integer {
                    value.round() as $t
                } else {
                    value as $t
                }
            }

            fn to_scalar_value(self) -> ScalarValue {
                ScalarValue::$kind(self)
            }

            fn from_scalar_value(value: &ScalarValue) -> Option<Self> {
                match value {
                    ScalarValue::$kind(v) => Some(*v),
                    _ => None,
                }
            }
        }
    )*};
}

with_scalar_registry!(impl_scalar_traits);
