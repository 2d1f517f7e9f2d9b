//! Fixed-arity structured pixels.
//!
//! `Rgb<T>` and `Rgba<T>` get their numeric traits from the element type:
//! every bound and identity is the element's value repeated in each
//! component, and the sign predicates look at luminance.

use crate::core::error::PixelError;
use crate::core::numeric::{NumericTraits, PixelKind, PixelValue, ScalarPixel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

macro_rules! structured_pixel {
    ($(#[$meta:meta])* $name:ident, $arity:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        pub struct $name<T>(pub [T; $arity]);

        impl<T: Copy> $name<T> {
            /// Number of components.
            pub const ARITY: usize = $arity;

            /// Every component set to `value`.
            pub fn filled(value: T) -> Self {
                Self([value; $arity])
            }

            pub fn components(&self) -> &[T; $arity] {
                &self.0
            }

            /// Apply `f` to every component.
            pub fn map<U: Copy>(self, f: impl Fn(T) -> U) -> $name<U> {
                $name(self.0.map(f))
            }
        }

        impl<T> Index<usize> for $name<T> {
            type Output = T;

            fn index(&self, i: usize) -> &T {
                &self.0[i]
            }
        }

        impl<T> IndexMut<usize> for $name<T> {
            fn index_mut(&mut self, i: usize) -> &mut T {
                &mut self.0[i]
            }
        }

        impl<T: fmt::Display> fmt::Display for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "[")?;
                for (i, c) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "]")
            }
        }

        impl<T: ScalarPixel> NumericTraits for $name<T> {
            type Abs = $name<T::Abs>;
            type Accumulate = $name<T::Accumulate>;
            type Float = $name<T::Float>;
            type Real = $name<T::Real>;
            type Print = $name<T::Print>;

            const IS_SIGNED: bool = T::IS_SIGNED;
            const IS_INTEGER: bool = T::IS_INTEGER;
            const IS_COMPLEX: bool = T::IS_COMPLEX;

            fn pixel_kind() -> PixelKind {
                PixelKind::structured(T::KIND, $arity)
            }

            fn zero() -> Self {
                Self::filled(T::zero())
            }

            fn one() -> Self {
                Self::filled(T::one())
            }

            fn min_bound() -> Self {
                Self::filled(T::min_bound())
            }

            fn max_bound() -> Self {
                Self::filled(T::max_bound())
            }

            fn nonpositive_min() -> Self {
                Self::filled(T::nonpositive_min())
            }

            fn luminance(&self) -> f64 {
                0.30 * self.0[0].to_f64() + 0.59 * self.0[1].to_f64() + 0.11 * self.0[2].to_f64()
            }

            fn to_pixel_value(&self) -> PixelValue {
                PixelValue::Structured(self.0.iter().map(|c| c.to_scalar_value()).collect())
            }

            fn from_pixel_value(value: &PixelValue) -> Result<Self, PixelError> {
                let mismatch = || PixelError::KindMismatch {
                    expected: Self::pixel_kind().to_string(),
                    found: value.kind().to_string(),
                };
                let components = match value {
                    PixelValue::Structured(components) if components.len() == $arity => components,
                    _ => return Err(mismatch()),
                };
                let mut out = Self::zero();
                for (slot, component) in out.0.iter_mut().zip(components) {
                    *slot = T::from_scalar_value(component).ok_or_else(mismatch)?;
                }
                Ok(out)
            }
        }
    };
}

structured_pixel!(
    /// Three-component color pixel.
    Rgb,
    3
);

structured_pixel!(
    /// Four-component color pixel with alpha.
    Rgba,
    4
);

impl<T: Copy> Rgb<T> {
    pub fn new(r: T, g: T, b: T) -> Self {
        Self([r, g, b])
    }
}

impl<T: Copy> Rgba<T> {
    pub fn new(r: T, g: T, b: T, a: T) -> Self {
        Self([r, g, b, a])
    }
}
