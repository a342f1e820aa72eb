// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Compile map: the vertex-deduplication plan
//!
//! Partitions triangulated faces by (material, segment) and assigns each
//! face corner to an output vertex, reusing a previously emitted vertex at
//! the same point when its normal/UV/color agree within tolerance. The map
//! references sources rather than copying data, so the VBO stage (and the
//! dynamic patch path) can refill from live mesh arrays.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::bbox::BoundingBox;
use crate::geometry::mesh::Mesh;
use crate::utils::math::{vec2_equal, vec3_equal};

/// Default attribute-comparison tolerance for vertex deduplication
pub const DEFAULT_COMPILE_TOLERANCE: f64 = 1e-5;

/// Output vertices and draw lists for one (material, segment) partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    /// Slot in the mesh's material list
    pub material: usize,
    pub segment: i32,
    /// Output vertex indices, three per triangle
    pub elements: Vec<u32>,
    /// Output vertex indices, two per wireframe line; empty unless the
    /// mesh had edges built before compilation
    pub line_elements: Vec<u32>,
}

/// Deduplicated-vertex plan produced by [`Mesh::compile_map`].
///
/// `points[i]` is the source point of output vertex `i`; the parallel
/// `normals`/`uvs`/`colors` lists name the (face, corner) that supplies
/// each present attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileMap {
    pub points: Vec<usize>,
    pub normals: Vec<(u32, u32)>,
    pub uvs: Vec<(u32, u32)>,
    pub colors: Vec<(u32, u32)>,
    pub partitions: Vec<Partition>,
    /// Segment ids in first-use order
    pub segments: Vec<i32>,
    pub bounds: Option<BoundingBox>,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub has_colors: bool,
}

impl CompileMap {
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    pub fn element_count(&self) -> usize {
        self.partitions.iter().map(|p| p.elements.len()).sum()
    }
}

impl Mesh {
    /// Build the deduplication plan for the current (triangulated) mesh.
    ///
    /// Attribute presence is decided over the whole compiled set: if any
    /// compiled face carries UVs, faces without them are padded with zeros
    /// first (same for normals and colors), restoring the per-corner
    /// parity the comparisons depend on. Faces that are not triangles are
    /// ignored.
    pub fn compile_map(&mut self, tolerance: Option<f64>) -> CompileMap {
        let tolerance = tolerance.unwrap_or(DEFAULT_COMPILE_TOLERANCE);

        // Partition triangle faces by (material, segment); BTreeMap gives
        // material-then-segment order, deterministic across runs
        let mut groups: BTreeMap<(usize, i32), Vec<usize>> = BTreeMap::new();
        let mut segments: Vec<i32> = Vec::new();
        for (fi, face) in self.faces.iter().enumerate() {
            if face.points.len() != 3 {
                continue;
            }
            groups
                .entry((face.material, face.segment))
                .or_insert_with(|| {
                    if !segments.contains(&face.segment) {
                        segments.push(face.segment);
                    }
                    Vec::new()
                })
                .push(fi);
        }

        let compiled: Vec<usize> = groups.values().flatten().copied().collect();
        let has_normals = compiled.iter().any(|&f| !self.faces[f].point_normals.is_empty());
        let has_uvs = compiled.iter().any(|&f| !self.faces[f].uvs.is_empty());
        let has_colors = compiled.iter().any(|&f| !self.faces[f].point_colors.is_empty());

        // Pad missing attribute arrays with zeros so every compiled corner
        // can be compared uniformly
        for face in &mut self.faces {
            let n = face.points.len();
            if has_normals && face.point_normals.is_empty() {
                face.point_normals = vec![Vector3::zeros(); n];
            }
            if has_uvs && face.uvs.is_empty() {
                face.uvs = vec![Vector2::zeros(); n];
            }
            if has_colors && face.point_colors.is_empty() {
                face.point_colors = vec![Vector3::zeros(); n];
            }
        }

        let mut map = CompileMap {
            points: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            colors: Vec::new(),
            partitions: Vec::new(),
            segments,
            bounds: None,
            has_normals,
            has_uvs,
            has_colors,
        };

        // Per source point: (face, corner, output index) of every vertex
        // already emitted for that point
        let mut vtx_ref: Vec<Vec<(usize, usize, u32)>> = vec![Vec::new(); self.points.len()];
        // First output vertex per source point, for wireframe lines
        let mut first_out: Vec<Option<u32>> = vec![None; self.points.len()];

        for (&(material, segment), face_list) in &groups {
            let mut partition = Partition {
                material,
                segment,
                elements: Vec::new(),
                line_elements: Vec::new(),
            };

            for &fi in face_list {
                for corner in 0..3 {
                    let pt = self.faces[fi].points[corner];

                    let found = vtx_ref[pt].iter().find(|&&(oface, ocorner, _)| {
                        let of = &self.faces[oface];
                        let nf = &self.faces[fi];
                        (!has_normals
                            || vec3_equal(
                                &of.point_normals[ocorner],
                                &nf.point_normals[corner],
                                tolerance,
                            ))
                            && (!has_uvs
                                || vec2_equal(&of.uvs[ocorner], &nf.uvs[corner], tolerance))
                            && (!has_colors
                                || vec3_equal(
                                    &of.point_colors[ocorner],
                                    &nf.point_colors[corner],
                                    tolerance,
                                ))
                    });

                    match found {
                        Some(&(_, _, index)) => partition.elements.push(index),
                        None => {
                            let index = map.points.len() as u32;
                            map.points.push(pt);
                            match &mut map.bounds {
                                Some(bounds) => bounds.expand_to_include(&self.points[pt]),
                                None => {
                                    map.bounds =
                                        Some(BoundingBox::from_points(&[self.points[pt]]));
                                }
                            }
                            if has_normals {
                                map.normals.push((fi as u32, corner as u32));
                            }
                            if has_uvs {
                                map.uvs.push((fi as u32, corner as u32));
                            }
                            if has_colors {
                                map.colors.push((fi as u32, corner as u32));
                            }
                            partition.elements.push(index);
                            vtx_ref[pt].push((fi, corner, index));
                            if first_out[pt].is_none() {
                                first_out[pt] = Some(index);
                            }
                        }
                    }
                }
            }

            map.partitions.push(partition);
        }

        // Wireframe lines, mapped onto the first emitted vertex for each
        // edge endpoint
        if let Some(edges) = &self.edges {
            for partition in &mut map.partitions {
                for edge in edges {
                    if edge.material != partition.material || edge.segment != partition.segment {
                        continue;
                    }
                    if let (Some(a), Some(b)) = (first_out[edge.a], first_out[edge.b]) {
                        partition.line_elements.push(a);
                        partition.line_elements.push(b);
                    }
                }
            }
        }

        map
    }
}
