//! Parameter values and port types.
//!
//! Images never travel as `Value`s: they move between filters as
//! [`DataHandle`](crate::core::image::DataHandle)s. `Value` only carries the
//! configuration a filter is parameterised with.

use crate::core::image::DataKind;
use crate::core::numeric::{PixelKind, PixelValue};
use crate::core::region::ImageRegion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    Boolean(bool),
    String(String),
    /// A pixel of a specific kind
    Pixel(PixelValue),
    Region(ImageRegion),
    /// Represents absence of value
    None,
}

impl Value {
    /// Get the port type of this value.
    pub fn get_type(&self) -> PortType {
        match self {
            Value::Integer(_) => PortType::Integer,
            Value::Float(_) => PortType::Float,
            Value::Boolean(_) => PortType::Boolean,
            Value::String(_) => PortType::String,
            Value::Pixel(p) => PortType::Pixel(p.kind()),
            Value::Region(_) => PortType::Region,
            Value::None => PortType::Any,
        }
    }

    /// Numeric view, with integers widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Pixel(PixelValue::Scalar(v)) => Some(v.to_f64()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pixel(&self) -> Option<&PixelValue> {
        match self {
            Value::Pixel(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_region(&self) -> Option<&ImageRegion> {
        match self {
            Value::Region(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<PixelValue> for Value {
    fn from(v: PixelValue) -> Self {
        Value::Pixel(v)
    }
}

impl From<ImageRegion> for Value {
    fn from(v: ImageRegion) -> Self {
        Value::Region(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Pixel(v) => write!(f, "{}", v),
            Value::Region(r) => write!(f, "{}", r),
            Value::None => write!(f, "none"),
        }
    }
}

/// Port and parameter types.
///
/// Image ports are typed by pixel kind, so wiring a `u8` producer into an
/// `f32` consumer is rejected when the connection is made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "inner")]
pub enum PortType {
    Image(PixelKind),
    /// Image of any pixel kind
    AnyImage,
    LabelMap,
    Integer,
    Float,
    Boolean,
    String,
    Pixel(PixelKind),
    Region,
    /// Accepts any type (for generic filters)
    Any,
}

impl PortType {
    /// Whether an output of type `self` may feed an input of type `target`.
    pub fn compatible_with(&self, target: &PortType) -> bool {
        match (self, target) {
            (_, PortType::Any) | (PortType::Any, _) => true,
            (PortType::Image(_), PortType::AnyImage) => true,
            (PortType::AnyImage, PortType::Image(_)) => true,
            (a, b) => a == b,
        }
    }

    /// Whether a data object of `kind` can travel on a port of this type.
    pub fn accepts_data(&self, kind: &DataKind) -> bool {
        match (self, kind) {
            (PortType::Any, _) => true,
            (PortType::AnyImage, DataKind::Image(_)) => true,
            (PortType::Image(expected), DataKind::Image(found)) => expected == found,
            (PortType::LabelMap, DataKind::LabelMap) => true,
            _ => false,
        }
    }

    /// The port type data objects of `kind` travel on.
    pub fn for_data(kind: &DataKind) -> PortType {
        match kind {
            DataKind::Image(pixel) => PortType::Image(*pixel),
            DataKind::LabelMap => PortType::LabelMap,
        }
    }

    /// Whether a parameter value matches this type.
    ///
    /// Plain numbers are accepted for pixel parameters and are cast to the
    /// pixel kind when read.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (PortType::Any, _) => true,
            (PortType::Integer, Value::Integer(_)) => true,
            (PortType::Float, Value::Float(_) | Value::Integer(_)) => true,
            (PortType::Boolean, Value::Boolean(_)) => true,
            (PortType::String, Value::String(_)) => true,
            (PortType::Region, Value::Region(_)) => true,
            (PortType::Pixel(kind), Value::Pixel(p)) => p.kind() == *kind,
            (PortType::Pixel(_), Value::Integer(_) | Value::Float(_)) => true,
            _ => false,
        }
    }

    /// Whether this type carries a data object rather than a parameter.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            PortType::Image(_) | PortType::AnyImage | PortType::LabelMap
        )
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Image(kind) => write!(f, "Image<{}>", kind),
            PortType::AnyImage => write!(f, "Image"),
            PortType::LabelMap => write!(f, "LabelMap"),
            PortType::Integer => write!(f, "Integer"),
            PortType::Float => write!(f, "Float"),
            PortType::Boolean => write!(f, "Boolean"),
            PortType::String => write!(f, "String"),
            PortType::Pixel(kind) => write!(f, "Pixel<{}>", kind),
            PortType::Region => write!(f, "Region"),
            PortType::Any => write!(f, "Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numeric::{ScalarKind, ScalarValue};

    #[test]
    fn test_image_port_compatibility() {
        let u8_image = PortType::Image(PixelKind::scalar(ScalarKind::U8));
        let f32_image = PortType::Image(PixelKind::scalar(ScalarKind::F32));
        assert!(u8_image.compatible_with(&u8_image));
        assert!(!u8_image.compatible_with(&f32_image));
        assert!(u8_image.compatible_with(&PortType::AnyImage));
        assert!(!u8_image.compatible_with(&PortType::LabelMap));
        assert!(PortType::LabelMap.compatible_with(&PortType::Any));
    }

    #[test]
    fn test_parameter_matching() {
        let pixel = PortType::Pixel(PixelKind::scalar(ScalarKind::I16));
        assert!(pixel.matches(&Value::Pixel(PixelValue::Scalar(ScalarValue::I16(3)))));
        assert!(!pixel.matches(&Value::Pixel(PixelValue::Scalar(ScalarValue::U8(3)))));
        assert!(pixel.matches(&Value::Float(3.0)));
        assert!(PortType::Float.matches(&Value::Integer(2)));
        assert!(!PortType::Integer.matches(&Value::Float(2.0)));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(4).as_float(), Some(4.0));
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
        assert!(Value::None.is_none());
    }
}
