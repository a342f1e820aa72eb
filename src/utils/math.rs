// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Math utilities

use nalgebra::{Point3, Vector2, Vector3};

/// Calculate the (unnormalized) flat normal of a triangle given three vertices
pub fn triangle_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    let v1 = p1 - p0;
    let v2 = p2 - p0;
    v1.cross(&v2)
}

/// Component-wise equality within tolerance for 3-vectors
pub fn vec3_equal(a: &Vector3<f64>, b: &Vector3<f64>, tolerance: f64) -> bool {
    (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance && (a.z - b.z).abs() < tolerance
}

/// Component-wise equality within tolerance for 2-vectors
pub fn vec2_equal(a: &Vector2<f64>, b: &Vector2<f64>, tolerance: f64) -> bool {
    (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance
}

/// Unclamped angle between two vectors, in radians.
///
/// Returns NaN when either vector has zero length or rounding pushes the
/// cosine outside [-1, 1]. The normal engine relies on the NaN result to
/// classify degenerate comparisons, so this must not clamp the way
/// `nalgebra::Vector3::angle` does.
pub fn vec3_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a.dot(b) / (a.norm() * b.norm())).acos()
}

/// Check if two floats are approximately equal
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_equal() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(1.0 + 1e-8, 2.0, 3.0);
        assert!(vec3_equal(&a, &b, 1e-6));
        assert!(!vec3_equal(&a, &b, 1e-9));
    }

    #[test]
    fn test_vec3_angle_orthogonal() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert!(approx_eq(
            vec3_angle(&a, &b),
            std::f64::consts::FRAC_PI_2,
            1e-12
        ));
    }

    #[test]
    fn test_vec3_angle_degenerate_is_nan() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert!(vec3_angle(&a, &b).is_nan());
    }

    #[test]
    fn test_triangle_normal_direction() {
        let n = triangle_normal(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        assert!(n.z > 0.0);
        assert!(approx_eq(n.x, 0.0, 1e-12));
        assert!(approx_eq(n.y, 0.0, 1e-12));
    }
}
