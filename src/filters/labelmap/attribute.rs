//! Shape attributes of label objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute a label object can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShapeAttribute {
    #[default]
    NumberOfPixels,
    PhysicalSize,
    NumberOfPixelsOnBorder,
    EquivalentSphericalRadius,
    EquivalentSphericalPerimeter,
    Perimeter,
    Roundness,
    FeretDiameter,
}

impl ShapeAttribute {
    pub const ALL: [ShapeAttribute; 8] = [
        ShapeAttribute::NumberOfPixels,
        ShapeAttribute::PhysicalSize,
        ShapeAttribute::NumberOfPixelsOnBorder,
        ShapeAttribute::EquivalentSphericalRadius,
        ShapeAttribute::EquivalentSphericalPerimeter,
        ShapeAttribute::Perimeter,
        ShapeAttribute::Roundness,
        ShapeAttribute::FeretDiameter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShapeAttribute::NumberOfPixels => "number_of_pixels",
            ShapeAttribute::PhysicalSize => "physical_size",
            ShapeAttribute::NumberOfPixelsOnBorder => "number_of_pixels_on_border",
            ShapeAttribute::EquivalentSphericalRadius => "equivalent_spherical_radius",
            ShapeAttribute::EquivalentSphericalPerimeter => "equivalent_spherical_perimeter",
            ShapeAttribute::Perimeter => "perimeter",
            ShapeAttribute::Roundness => "roundness",
            ShapeAttribute::FeretDiameter => "feret_diameter",
        }
    }

    /// Whether the valuator must estimate perimeters for this attribute.
    pub fn requires_perimeter(&self) -> bool {
        matches!(self, ShapeAttribute::Perimeter | ShapeAttribute::Roundness)
    }

    pub fn requires_feret_diameter(&self) -> bool {
        matches!(self, ShapeAttribute::FeretDiameter)
    }

    /// Value of this attribute, `None` if it was not computed.
    pub fn value(&self, shape: &ShapeAttributes) -> Option<f64> {
        match self {
            ShapeAttribute::NumberOfPixels => Some(shape.number_of_pixels as f64),
            ShapeAttribute::PhysicalSize => Some(shape.physical_size),
            ShapeAttribute::NumberOfPixelsOnBorder => Some(shape.number_of_pixels_on_border as f64),
            ShapeAttribute::EquivalentSphericalRadius => Some(shape.equivalent_spherical_radius),
            ShapeAttribute::EquivalentSphericalPerimeter => {
                Some(shape.equivalent_spherical_perimeter)
            }
            ShapeAttribute::Perimeter => shape.perimeter,
            ShapeAttribute::Roundness => shape.roundness,
            ShapeAttribute::FeretDiameter => shape.feret_diameter,
        }
    }
}

impl fmt::Display for ShapeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        ShapeAttribute::ALL
            .into_iter()
            .find(|a| a.name() == normalized)
            .ok_or_else(|| format!("unknown shape attribute '{}'", s))
    }
}

/// Measurements of one label object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeAttributes {
    pub number_of_pixels: usize,
    /// Number of pixels times the physical pixel volume.
    pub physical_size: f64,
    /// Pixels touching the boundary of the largest possible region.
    pub number_of_pixels_on_border: usize,
    /// Radius of the hypersphere with the same physical size.
    pub equivalent_spherical_radius: f64,
    /// Surface of that hypersphere.
    pub equivalent_spherical_perimeter: f64,
    pub perimeter: Option<f64>,
    /// Equivalent spherical perimeter over perimeter; 1 for a sphere.
    pub roundness: Option<f64>,
    pub feret_diameter: Option<f64>,
}

/// Volume of the unit hypersphere in `dimension` dimensions.
pub fn unit_sphere_volume(dimension: usize) -> f64 {
    match dimension {
        0 => 1.0,
        1 => 2.0,
        d => unit_sphere_volume(d - 2) * 2.0 * std::f64::consts::PI / d as f64,
    }
}

/// Radius of the hypersphere of volume `size`.
pub fn equivalent_radius(size: f64, dimension: usize) -> f64 {
    if dimension == 0 {
        return 0.0;
    }
    (size / unit_sphere_volume(dimension)).powf(1.0 / dimension as f64)
}

/// Surface of the hypersphere of radius `radius`.
pub fn equivalent_perimeter(radius: f64, dimension: usize) -> f64 {
    if dimension == 0 {
        return 0.0;
    }
    dimension as f64 * unit_sphere_volume(dimension) * radius.powi(dimension as i32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_parse_attribute() {
        assert_eq!("NUMBER_OF_PIXELS".parse::<ShapeAttribute>().unwrap(), ShapeAttribute::NumberOfPixels);
        assert_eq!("feret-diameter".parse::<ShapeAttribute>().unwrap(), ShapeAttribute::FeretDiameter);
        assert!("area".parse::<ShapeAttribute>().is_err());
    }

    #[test]
    fn test_requirements() {
        assert!(ShapeAttribute::Roundness.requires_perimeter());
        assert!(!ShapeAttribute::NumberOfPixels.requires_perimeter());
        assert!(ShapeAttribute::FeretDiameter.requires_feret_diameter());
        assert_eq!(ShapeAttribute::Perimeter.value(&ShapeAttributes::default()), None);
    }

    #[test]
    fn test_hypersphere() {
        assert!((unit_sphere_volume(2) - PI).abs() < 1e-12);
        assert!((unit_sphere_volume(3) - 4.0 / 3.0 * PI).abs() < 1e-12);
        let r = equivalent_radius(PI, 2);
        assert!((r - 1.0).abs() < 1e-12);
        assert!((equivalent_perimeter(r, 2) - 2.0 * PI).abs() < 1e-12);
    }
}
