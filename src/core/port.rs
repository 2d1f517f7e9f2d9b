//! Ports and parameters of a filter.
//!
//! Ports name the images and label maps a filter consumes and produces.
//! Parameters are plain values set on the graph between updates; their
//! declared type and constraints are checked before an update starts.

use crate::core::numeric::{scalar_record, PixelKind};
use crate::core::types::{PortType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// One input or output of a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub port_type: PortType,
    pub direction: PortDirection,
    /// An optional input may stay unconnected.
    pub optional: bool,
    pub description: String,
}

impl PortDefinition {
    fn new(name: impl Into<String>, port_type: PortType, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            port_type,
            direction,
            optional: false,
            description: String::new(),
        }
    }

    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        Self::new(name, port_type, PortDirection::Input)
    }

    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        Self::new(name, port_type, PortDirection::Output)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A named, typed parameter with a default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub param_type: PortType,
    pub default_value: Value,
    pub description: String,
    pub constraints: Vec<Constraint>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, param_type: PortType, default_value: Value) -> Self {
        Self {
            name: name.into(),
            param_type,
            default_value,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Check a value against the declared type and every constraint.
    ///
    /// Numbers given for a pixel parameter must also fit the pixel's
    /// element type.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if !self.param_type.matches(value) {
            return Err(format!(
                "expected {}, got {}",
                self.param_type,
                value.get_type()
            ));
        }
        if let (PortType::Pixel(kind), Some(number)) = (self.param_type, value.as_float()) {
            check_pixel_range(kind, number)?;
        }
        self.constraints
            .iter()
            .try_for_each(|constraint| constraint.check(value))
    }
}

fn check_pixel_range(kind: PixelKind, number: f64) -> Result<(), String> {
    let record = scalar_record(kind.element());
    let low = record.nonpositive_min.components()[0].to_f64();
    let high = record.max.components()[0].to_f64();
    if (low..=high).contains(&number) {
        Ok(())
    } else {
        Err(format!(
            "{} does not fit a {} pixel [{}, {}]",
            number,
            kind.element(),
            low,
            high
        ))
    }
}

/// Restriction on a parameter value.
///
/// Numeric constraints ignore non-numeric values; the type check reports
/// those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Within `[min, max]`.
    Range { min: f64, max: f64 },
    Positive,
    NonNegative,
    /// A string with something besides whitespace.
    NotEmpty,
    OneOf(Vec<Value>),
}

impl Constraint {
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let satisfied = match (self, value.as_float()) {
            (Constraint::Range { min, max }, Some(n)) => (*min..=*max).contains(&n),
            (Constraint::Positive, Some(n)) => n > 0.0,
            (Constraint::NonNegative, Some(n)) => n >= 0.0,
            (Constraint::NotEmpty, _) => {
                !matches!(value, Value::String(s) if s.trim().is_empty())
            }
            (Constraint::OneOf(options), _) => options.contains(value),
            (_, None) => true,
        };
        if satisfied {
            Ok(())
        } else {
            Err(format!("{} {}", value, self))
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Range { min, max } => write!(f, "must be between {} and {}", min, max),
            Constraint::Positive => write!(f, "must be positive"),
            Constraint::NonNegative => write!(f, "must not be negative"),
            Constraint::NotEmpty => write!(f, "must not be empty"),
            Constraint::OneOf(options) => {
                let names: Vec<String> = options.iter().map(Value::to_string).collect();
                write!(f, "must be one of [{}]", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numeric::ScalarKind;

    #[test]
    fn test_range_includes_bounds() {
        let constraint = Constraint::Range { min: 0.0, max: 1.0 };
        assert!(constraint.check(&Value::Float(0.0)).is_ok());
        assert!(constraint.check(&Value::Integer(1)).is_ok());
        assert!(constraint.check(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_one_of_lists_the_options() {
        let constraint = Constraint::OneOf(vec![
            Value::String("perimeter".into()),
            Value::String("roundness".into()),
        ]);
        assert!(constraint.check(&Value::String("roundness".into())).is_ok());
        let err = constraint
            .check(&Value::String("volume".into()))
            .unwrap_err();
        assert!(err.contains("perimeter"));
    }

    #[test]
    fn test_not_empty_rejects_blank_strings() {
        assert!(Constraint::NotEmpty.check(&Value::String("  ".into())).is_err());
        assert!(Constraint::NotEmpty.check(&Value::String("a.png".into())).is_ok());
    }

    #[test]
    fn test_type_is_checked_first() {
        let param = ParameterDefinition::new("factor", PortType::Integer, Value::Integer(2))
            .with_constraint(Constraint::Positive);
        assert!(param.check(&Value::Integer(4)).is_ok());
        assert!(param.check(&Value::Integer(0)).is_err());
        assert!(param.check(&Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_pixel_parameters_fit_their_element() {
        let param = ParameterDefinition::new(
            "foreground_value",
            PortType::Pixel(PixelKind::scalar(ScalarKind::U8)),
            Value::Integer(255),
        );
        assert!(param.check(&Value::Integer(0)).is_ok());
        assert!(param.check(&Value::Integer(255)).is_ok());
        assert!(param.check(&Value::Integer(256)).is_err());
        assert!(param.check(&Value::Float(-1.0)).is_err());

        let signed = ParameterDefinition::new(
            "background_value",
            PortType::Pixel(PixelKind::scalar(ScalarKind::I16)),
            Value::Integer(0),
        );
        assert!(signed.check(&Value::Integer(-32768)).is_ok());
    }
}
