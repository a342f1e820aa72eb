// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Face record: an ordered polygon with lazy per-corner attributes

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A single polygon referencing mesh points by index.
///
/// Faces hold 3 or 4 points while unprepared and exactly 3 after
/// triangulation. Per-corner attribute arrays are populated lazily: each is
/// either empty or has exactly `points.len()` entries. The compiler depends
/// on that parity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub points: Vec<usize>,
    pub point_normals: Vec<Vector3<f64>>,
    pub point_colors: Vec<Vector3<f64>>,
    pub uvs: Vec<Vector2<f64>>,
    /// Flat face normal (unit length once computed)
    pub normal: Vector3<f64>,
    /// Index into the owning mesh's material list
    pub material: usize,
    /// Arbitrary grouping id for visibility toggling; ignored by normals
    pub segment: i32,
}

impl Default for Face {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            point_normals: Vec::new(),
            point_colors: Vec::new(),
            uvs: Vec::new(),
            normal: Vector3::zeros(),
            material: 0,
            segment: 0,
        }
    }
}

impl Face {
    pub fn new(points: Vec<usize>, material: usize, segment: i32) -> Self {
        Self {
            points,
            material,
            segment,
            ..Self::default()
        }
    }

    /// Set one corner's UV, growing the array with zeros if needed
    pub fn set_uv(&mut self, corner: usize, uv: Vector2<f64>) {
        if self.uvs.len() <= corner {
            self.uvs.resize(corner + 1, Vector2::zeros());
        }
        self.uvs[corner] = uv;
    }

    /// Replace the whole UV array
    pub fn set_uvs(&mut self, uvs: Vec<Vector2<f64>>) {
        self.uvs = uvs;
    }

    /// Set one corner's color, growing the array with zeros if needed
    pub fn set_color(&mut self, corner: usize, color: Vector3<f64>) {
        if self.point_colors.len() <= corner {
            self.point_colors.resize(corner + 1, Vector3::zeros());
        }
        self.point_colors[corner] = color;
    }

    pub fn set_colors(&mut self, colors: Vec<Vector3<f64>>) {
        self.point_colors = colors;
    }

    /// Reverse winding: points and UVs reverse order, per-corner normals
    /// negate and reverse, the flat normal negates. Corner colors stay in
    /// source order.
    pub fn flip(&mut self) {
        for n in &mut self.point_normals {
            *n = -*n;
        }
        self.points.reverse();
        self.point_normals.reverse();
        self.uvs.reverse();
        self.normal = -self.normal;
    }
}
