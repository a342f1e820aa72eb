// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Normal engine
//!
//! Flat face normals, smoothing-group corner normals driven by each
//! material's `max_smooth` threshold, and a cached-adjacency fast path for
//! dynamic meshes.

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::material::{MaterialLibrary, DEFAULT_MAX_SMOOTH};
use super::mesh::Mesh;
use crate::utils::math::{triangle_normal, vec3_angle};

/// Compact corner-normal adjacency cache.
///
/// For every (face, corner) pair, records which other faces contributed to
/// that corner's smoothed normal. Valid only for the exact face/point
/// topology it was built against; any topology change invalidates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalMap {
    /// Starting corner slot of each face
    face_offsets: Vec<u32>,
    /// Contributing-face count per corner slot
    counts: Vec<u32>,
    /// Contributing face indices, concatenated in corner-slot order
    refs: Vec<u32>,
}

impl NormalMap {
    fn slot(&self, face: usize, corner: usize) -> usize {
        self.face_offsets[face] as usize + corner
    }

    /// Whether this cache still matches the mesh's face/corner shape
    fn matches(&self, mesh: &Mesh) -> bool {
        if self.face_offsets.len() != mesh.faces.len() {
            return false;
        }
        let total: usize = mesh.faces.iter().map(|f| f.points.len()).sum();
        self.counts.len() == total
    }
}

impl Mesh {
    /// Compute flat face normals over `range` (default: all faces).
    ///
    /// The normal is the normalized cross product of the first two edge
    /// vectors of the first three points; faces with fewer than 3 points or
    /// zero area get a zero normal.
    pub fn calc_face_normals(&mut self, range: Option<Range<usize>>) {
        let range = range.unwrap_or(0..self.faces.len());
        for fi in range {
            let Some(face) = self.faces.get(fi) else { continue };
            if face.points.len() < 3 {
                self.faces[fi].normal = Vector3::zeros();
                continue;
            }
            let n = triangle_normal(
                &self.points[face.points[0]],
                &self.points[face.points[1]],
                &self.points[face.points[2]],
            );
            let len = n.norm();
            self.faces[fi].normal = if len > 0.0 { n / len } else { Vector3::zeros() };
        }
    }

    /// Full smoothing pass: flat normals, then per-corner averaging across
    /// faces sharing each point, gated by the face material's `max_smooth`
    /// threshold in degrees.
    ///
    /// A NaN angle (degenerate normal comparison) counts as within the
    /// threshold; this matches long-standing engine behavior and avoids
    /// spurious hard edges on degenerate geometry.
    pub fn calc_normals(&mut self, library: &MaterialLibrary) {
        self.smooth_normals(library, false);
    }

    /// Like [`calc_normals`](Self::calc_normals) but also records the
    /// corner adjacency into the mesh's `normal_map` cache for later
    /// [`recalc_normals`](Self::recalc_normals) calls.
    pub fn calc_normals_cached(&mut self, library: &MaterialLibrary) {
        self.smooth_normals(library, true);
    }

    fn smooth_normals(&mut self, library: &MaterialLibrary, record: bool) {
        self.calc_face_normals(None);

        let mut point_refs: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.points.len()];
        for (fi, face) in self.faces.iter().enumerate() {
            for (ci, &pt) in face.points.iter().enumerate() {
                point_refs[pt].push((fi, ci));
            }
        }

        let face_normals: Vec<Vector3<f64>> = self.faces.iter().map(|f| f.normal).collect();

        let mut face_offsets: Vec<u32> = Vec::with_capacity(self.faces.len());
        let mut slot = 0u32;
        for face in &self.faces {
            face_offsets.push(slot);
            slot += face.points.len() as u32;
        }
        let total_corners = slot as usize;
        let mut contrib: Vec<Vec<u32>> = if record {
            vec![Vec::new(); total_corners]
        } else {
            Vec::new()
        };

        for refs in &point_refs {
            for (j, &(face_num, corner)) in refs.iter().enumerate() {
                let face = &self.faces[face_num];
                let max_smooth = if self.materials.is_empty() {
                    DEFAULT_MAX_SMOOTH
                } else {
                    self.materials
                        .get(face.material)
                        .map_or(DEFAULT_MAX_SMOOTH, |&h| library.max_smooth(h))
                };

                let this_normal = face_normals[face_num];
                let mut sum = this_normal;
                let mut count = 1.0;

                if max_smooth != 0.0 {
                    for (k, &(other_face, _)) in refs.iter().enumerate() {
                        if j == k {
                            continue;
                        }
                        let other_normal = face_normals[other_face];
                        let ang = vec3_angle(&other_normal, &this_normal);
                        // NaN compares false, so test the smooth branch as
                        // "not above threshold" to let NaN through
                        if !(ang.to_degrees() > max_smooth) {
                            if record {
                                contrib[face_offsets[face_num] as usize + corner]
                                    .push(other_face as u32);
                            }
                            sum += other_normal;
                            count += 1.0;
                        }
                    }
                }

                let avg = sum / count;
                let len = avg.norm();
                let smoothed = if len > 0.0 { avg / len } else { Vector3::zeros() };

                let face = &mut self.faces[face_num];
                if face.point_normals.len() != face.points.len() {
                    face.point_normals = vec![Vector3::zeros(); face.points.len()];
                }
                face.point_normals[corner] = smoothed;
            }
        }

        if record {
            let mut counts = Vec::with_capacity(total_corners);
            let mut flat_refs = Vec::new();
            for list in contrib {
                counts.push(list.len() as u32);
                flat_refs.extend(list);
            }
            self.normal_map = Some(NormalMap {
                face_offsets,
                counts,
                refs: flat_refs,
            });
        }
    }

    /// Fast renormal pass for dynamic meshes: recompute flat normals, then
    /// re-average each corner from the adjacency cached by a prior
    /// [`calc_normals_cached`](Self::calc_normals_cached) call.
    ///
    /// Produces results identical to a full pass on unchanged topology.
    /// Silently does nothing when no cache exists or the cache no longer
    /// matches the topology.
    pub fn recalc_normals(&mut self) {
        let Some(map) = self.normal_map.take() else {
            debug!("recalc_normals: no adjacency cache, skipped");
            return;
        };
        if !map.matches(self) {
            debug!("recalc_normals: stale adjacency cache, skipped");
            self.normal_map = Some(map);
            return;
        }

        self.calc_face_normals(None);
        let face_normals: Vec<Vector3<f64>> = self.faces.iter().map(|f| f.normal).collect();

        // Prefix offsets into the flattened ref list
        let mut ref_offsets = Vec::with_capacity(map.counts.len());
        let mut ofs = 0usize;
        for &c in &map.counts {
            ref_offsets.push(ofs);
            ofs += c as usize;
        }

        for (fi, face) in self.faces.iter_mut().enumerate() {
            if face.point_normals.len() != face.points.len() {
                face.point_normals = vec![Vector3::zeros(); face.points.len()];
            }
            for corner in 0..face.points.len() {
                let slot = map.slot(fi, corner);
                let count = map.counts[slot] as usize;
                let mut sum = face_normals[fi];
                for r in 0..count {
                    let other = map.refs[ref_offsets[slot] + r] as usize;
                    sum += face_normals[other];
                }
                face.point_normals[corner] = if count != 0 {
                    let avg = sum / (count as f64 + 1.0);
                    let len = avg.norm();
                    if len > 0.0 { avg / len } else { Vector3::zeros() }
                } else {
                    sum
                };
            }
        }

        self.normal_map = Some(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::material::Material;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    /// Two triangles sharing the edge (1, 2), folded around the y axis so
    /// the dihedral angle is `fold_degrees`.
    fn folded_pair(fold_degrees: f64) -> Mesh {
        let a = fold_degrees.to_radians();
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(a.cos(), 0.0, -a.sin()),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face(&[1, 3, 2], 0, 0);
        mesh
    }

    #[test]
    fn test_flat_normals_unit_length() {
        let lib = MaterialLibrary::new();
        let mut mesh = folded_pair(30.0);
        mesh.calc_normals(&lib);
        for face in &mesh.faces {
            assert_relative_eq!(face.normal.norm(), 1.0, epsilon = 1e-6);
            for n in &face.point_normals {
                assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_degenerate_face_zero_normal() {
        let lib = MaterialLibrary::new();
        let mut mesh = Mesh::new();
        mesh.add_points(&[Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        mesh.add_face(&[0, 1], 0, 0);
        mesh.calc_normals(&lib);
        assert_eq!(mesh.faces[0].normal, Vector3::zeros());
    }

    #[test]
    fn test_smoothing_below_threshold_blends() {
        let lib = MaterialLibrary::new();
        let mut mesh = folded_pair(30.0);
        mesh.calc_normals(&lib);
        // Shared edge corners blend both face normals
        let n0 = mesh.faces[0].normal;
        let n1 = mesh.faces[1].normal;
        let expected = ((n0 + n1) / 2.0).normalize();
        // corner 1 of face 0 is point 1, shared with corner 0 of face 1
        assert_relative_eq!(mesh.faces[0].point_normals[1], expected, epsilon = 1e-9);
        assert_relative_eq!(mesh.faces[1].point_normals[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_smoothing_above_threshold_stays_flat() {
        let lib = MaterialLibrary::new();
        let mut mesh = folded_pair(120.0);
        mesh.calc_normals(&lib);
        assert_relative_eq!(
            mesh.faces[0].point_normals[1],
            mesh.faces[0].normal,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_threshold_boundary_is_commutative() {
        // Dihedral angle exactly at the default 60 degree threshold: both
        // faces must make the same smooth-or-flat decision regardless of
        // visit order.
        let lib = MaterialLibrary::new();
        let mut mesh = folded_pair(60.0);
        mesh.calc_normals(&lib);
        let a = mesh.faces[0].point_normals[1];
        let b = mesh.faces[1].point_normals[0];
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_max_smooth_disables_smoothing() {
        let mut lib = MaterialLibrary::new();
        let hard = lib.add(Material::new("hard").with_max_smooth(0.0));
        let mut mesh = folded_pair(10.0);
        let slot = mesh.add_material(hard);
        for face in &mut mesh.faces {
            face.material = slot;
        }
        mesh.calc_normals(&lib);
        assert_relative_eq!(
            mesh.faces[0].point_normals[1],
            mesh.faces[0].normal,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            mesh.faces[1].point_normals[0],
            mesh.faces[1].normal,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_recalc_matches_full_pass() {
        let lib = MaterialLibrary::new();
        let mut mesh = folded_pair(30.0);
        mesh.calc_normals_cached(&lib);
        assert!(mesh.normal_map.is_some());

        // Move a point, then compare the fast path against a full pass
        mesh.points[0] = Point3::new(-1.5, 0.2, 0.1);
        mesh.recalc_normals();
        let fast: Vec<_> = mesh
            .faces
            .iter()
            .map(|f| f.point_normals.clone())
            .collect();

        mesh.calc_normals(&lib);
        let full: Vec<_> = mesh
            .faces
            .iter()
            .map(|f| f.point_normals.clone())
            .collect();

        for (fa, fb) in fast.iter().zip(&full) {
            for (na, nb) in fa.iter().zip(fb) {
                assert_relative_eq!(*na, *nb, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_recalc_without_cache_is_noop() {
        let mut mesh = folded_pair(30.0);
        mesh.recalc_normals();
        assert!(mesh.faces[0].point_normals.is_empty());
    }
}
