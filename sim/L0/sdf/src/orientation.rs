//! Pose and orientation helpers.
//!
//! Converts the textual pose forms (`x y z roll pitch yaw` or
//! `x y z qx qy qz qw`) into a single `Isometry3` representation.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

use crate::error::{Result, SdfError};

/// Rotation encodings accepted in `<pose rotation_format="...">`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationFormat {
    /// Fixed-axis roll, pitch, yaw.
    #[default]
    EulerRpy,
    /// Quaternion in x, y, z, w order.
    QuatXyzw,
}

impl RotationFormat {
    /// Parse a `rotation_format` attribute.
    pub fn from_name(s: &str) -> Result<Self> {
        match s.trim() {
            "euler_rpy" => Ok(Self::EulerRpy),
            "quat_xyzw" => Ok(Self::QuatXyzw),
            other => Err(SdfError::invalid_attribute(
                "rotation_format",
                "pose",
                format!("unknown rotation format '{other}'"),
            )),
        }
    }
}

/// Parse whitespace separated floats.
pub fn parse_floats(text: &str, attribute: &'static str, element: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|s| {
            s.parse::<f64>().map_err(|_| {
                SdfError::invalid_attribute(attribute, element, format!("'{s}' is not a number"))
            })
        })
        .collect()
}

/// Parse exactly three floats.
pub fn parse_vector3(text: &str, attribute: &'static str, element: &str) -> Result<Vector3<f64>> {
    let values = parse_floats(text, attribute, element)?;
    if values.len() != 3 {
        return Err(SdfError::invalid_attribute(
            attribute,
            element,
            format!("expected 3 values, got {}", values.len()),
        ));
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

/// Roll-pitch-yaw (fixed X, then Y, then Z) to quaternion.
pub fn rpy_to_quat(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(roll, pitch, yaw)
}

/// Build a pose from the values of a `<pose>` element.
///
/// An empty value list is the identity.
pub fn pose_from_values(
    values: &[f64],
    degrees: bool,
    format: RotationFormat,
    element: &str,
) -> Result<Isometry3<f64>> {
    if values.is_empty() {
        return Ok(Isometry3::identity());
    }
    let expected = match format {
        RotationFormat::EulerRpy => 6,
        RotationFormat::QuatXyzw => 7,
    };
    if values.len() != expected {
        return Err(SdfError::invalid_attribute(
            "pose",
            element,
            format!("expected {expected} values, got {}", values.len()),
        ));
    }

    let translation = Translation3::new(values[0], values[1], values[2]);
    let rotation = match format {
        RotationFormat::EulerRpy => {
            let scale = if degrees { std::f64::consts::PI / 180.0 } else { 1.0 };
            rpy_to_quat(values[3] * scale, values[4] * scale, values[5] * scale)
        }
        RotationFormat::QuatXyzw => {
            let q = Quaternion::new(values[6], values[3], values[4], values[5]);
            if q.norm() < 1e-10 {
                return Err(SdfError::invalid_attribute(
                    "pose",
                    element,
                    "quaternion has zero length",
                ));
            }
            UnitQuaternion::from_quaternion(q)
        }
    };
    Ok(Isometry3::from_parts(translation, rotation))
}

/// Safe axis normalization with Z fallback for zero-length vectors.
#[inline]
pub fn safe_normalize_axis(v: Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n > 1e-10 { v / n } else { Vector3::z() }
}
