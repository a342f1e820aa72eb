// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Topology transforms
//!
//! Quad triangulation, winding flips, mesh merge, duplicate-point welding,
//! boundary-edge extraction and interior-face removal. All of these mutate
//! topology, so each one drops the mesh's derived caches.

use ahash::{AHashMap, AHashSet};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use super::face::Face;
use super::mesh::Mesh;

/// Default weld tolerance for [`Mesh::remove_doubles`]
pub const DEFAULT_WELD_TOLERANCE: f64 = 1e-7;

/// One wireframe edge, recorded once per (material, segment) context
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub face: usize,
    pub a: usize,
    pub b: usize,
    pub material: usize,
    pub segment: i32,
}

impl Mesh {
    /// Split every 4-point face into two triangles: the original face is
    /// truncated to `[p0, p1, p2]` and a new face `[p2, p3, p0]` is
    /// appended, carrying the same material, segment and flat normal.
    /// Per-corner attributes are partitioned the same way. Idempotent:
    /// a second call finds no quads and changes nothing.
    pub fn triangulate_quads(&mut self) {
        let original_count = self.faces.len();
        let mut changed = false;

        for i in 0..original_count {
            if self.faces[i].points.len() != 4 {
                continue;
            }
            changed = true;

            let src = &self.faces[i];
            let mut split = Face::new(
                vec![src.points[2], src.points[3], src.points[0]],
                src.material,
                src.segment,
            );
            split.normal = src.normal;
            if src.uvs.len() == 4 {
                split.uvs = vec![src.uvs[2], src.uvs[3], src.uvs[0]];
            }
            if src.point_normals.len() == 4 {
                split.point_normals =
                    vec![src.point_normals[2], src.point_normals[3], src.point_normals[0]];
            }
            if src.point_colors.len() == 4 {
                split.point_colors =
                    vec![src.point_colors[2], src.point_colors[3], src.point_colors[0]];
            }

            let face = &mut self.faces[i];
            face.points.truncate(3);
            face.uvs.truncate(3);
            face.point_normals.truncate(3);
            face.point_colors.truncate(3);

            self.faces.push(split);
        }

        if changed {
            self.invalidate_caches();
        }
    }

    /// Reverse the winding of every face; used to correct orientation
    /// after negative-scale instancing
    pub fn flip_faces(&mut self) {
        for face in &mut self.faces {
            face.flip();
        }
        self.invalidate_caches();
    }

    /// Merge another mesh into this one: points appended (optionally
    /// transformed), materials deduplicated by handle and remapped, faces
    /// reindexed with their attributes copied.
    ///
    /// Despite the traditional name this is a plain set union, not a CSG
    /// boolean; callers assembling compound objects depend on the
    /// merge-only behavior.
    pub fn boolean_add(&mut self, other: &Mesh, transform: Option<&Matrix4<f64>>) {
        let point_offset = self.points.len();

        match transform {
            Some(m) => {
                for p in &other.points {
                    self.points.push(m.transform_point(p));
                }
            }
            None => self.points.extend_from_slice(&other.points),
        }

        let material_map: Vec<usize> = other
            .materials
            .iter()
            .map(|&handle| self.add_material(handle))
            .collect();

        for src in &other.faces {
            let mut face = Face::new(
                src.points.iter().map(|&p| p + point_offset).collect(),
                material_map.get(src.material).copied().unwrap_or(src.material),
                src.segment,
            );
            face.normal = src.normal;
            face.uvs = src.uvs.clone();
            face.point_normals = src.point_normals.clone();
            face.point_colors = src.point_colors.clone();
            self.faces.push(face);
        }

        self.invalidate_caches();
    }

    /// Weld points whose positions coincide within `tolerance` (default
    /// 1e-7) and remap every face to the deduplicated set. Each point maps
    /// to the first earlier point within tolerance, not the nearest; at
    /// weld-scale tolerances the two are indistinguishable. Linear scan,
    /// O(n^2); intended for moderate point counts at preparation time.
    /// Returns the number of points removed.
    pub fn remove_doubles(&mut self, tolerance: Option<f64>) -> usize {
        let tolerance = tolerance.unwrap_or(DEFAULT_WELD_TOLERANCE);
        let original_count = self.points.len();
        if original_count == 0 {
            return 0;
        }

        let mut unique = Vec::new();
        let mut remap = vec![0usize; original_count];

        for (i, p) in self.points.iter().enumerate() {
            let found = unique
                .iter()
                .position(|q: &nalgebra::Point3<f64>| (p - q).norm() < tolerance);
            match found {
                Some(j) => remap[i] = j,
                None => {
                    remap[i] = unique.len();
                    unique.push(*p);
                }
            }
        }

        for face in &mut self.faces {
            for p in &mut face.points {
                *p = remap[*p];
            }
        }

        self.points = unique;
        self.invalidate_caches();
        original_count - self.points.len()
    }

    /// Drop points no face references and remap the survivors; cleans up
    /// after welds and face removal. Returns the number of points removed.
    pub fn remove_unreferenced_points(&mut self) -> usize {
        let mut used = vec![false; self.points.len()];
        for face in &self.faces {
            for &p in &face.points {
                used[p] = true;
            }
        }

        let mut remap = vec![0usize; self.points.len()];
        let mut kept = Vec::new();
        for (i, p) in self.points.iter().enumerate() {
            if used[i] {
                remap[i] = kept.len();
                kept.push(*p);
            }
        }
        let removed = self.points.len() - kept.len();
        if removed == 0 {
            return 0;
        }

        for face in &mut self.faces {
            for p in &mut face.points {
                *p = remap[*p];
            }
        }
        self.points = kept;
        self.invalidate_caches();
        removed
    }

    /// Derive the undirected wireframe edge list. Each face edge `(a, b)`
    /// is recorded once per (material, segment) context; the reverse edge
    /// from an adjacent face in the same context is skipped, so shared
    /// interior edges draw a single line. The result is stored on the mesh
    /// for the compiler's line-index pass.
    pub fn build_edges(&mut self) {
        let mut seen: AHashSet<(usize, i32, usize, usize)> = AHashSet::new();
        let mut edges = Vec::new();

        for (fi, face) in self.faces.iter().enumerate() {
            let n = face.points.len();
            for i in 0..n {
                let a = face.points[i];
                let b = face.points[(i + 1) % n];
                let key = (face.material, face.segment, a.min(b), a.max(b));
                if seen.insert(key) {
                    edges.push(Edge {
                        face: fi,
                        a,
                        b,
                        material: face.material,
                        segment: face.segment,
                    });
                }
            }
        }

        self.edges = Some(edges);
    }

    /// Drop faces whose every edge has the exact reverse edge on another
    /// face: fully interior partition walls left behind by merges.
    /// Returns the number of faces removed.
    pub fn remove_internals(&mut self) -> usize {
        let mut directed: AHashMap<(usize, usize), Vec<usize>> = AHashMap::new();
        for (fi, face) in self.faces.iter().enumerate() {
            let n = face.points.len();
            for i in 0..n {
                let a = face.points[i];
                let b = face.points[(i + 1) % n];
                directed.entry((a, b)).or_default().push(fi);
            }
        }

        let is_internal = |fi: usize, face: &Face| {
            let n = face.points.len();
            if n < 3 {
                return false;
            }
            (0..n).all(|i| {
                let a = face.points[i];
                let b = face.points[(i + 1) % n];
                directed
                    .get(&(b, a))
                    .is_some_and(|faces| faces.iter().any(|&other| other != fi))
            })
        };

        let original_count = self.faces.len();
        let kept: Vec<Face> = self
            .faces
            .iter()
            .enumerate()
            .filter(|(fi, face)| !is_internal(*fi, face))
            .map(|(_, face)| face.clone())
            .collect();
        let removed = original_count - kept.len();
        if removed > 0 {
            self.faces = kept;
            self.invalidate_caches();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::material::{Material, MaterialLibrary};
    use nalgebra::{Point3, Vector2, Vector3};

    fn quad_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2, 3], 0, 7);
        mesh
    }

    #[test]
    fn test_triangulate_quads() {
        let mut mesh = quad_mesh();
        mesh.faces[0].set_uvs(vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ]);
        mesh.triangulate_quads();

        assert_eq!(mesh.faces.len(), 2);
        assert!(mesh.faces.iter().all(|f| f.points.len() == 3));
        assert_eq!(mesh.faces[0].points, vec![0, 1, 2]);
        assert_eq!(mesh.faces[1].points, vec![2, 3, 0]);
        assert_eq!(mesh.faces[1].segment, 7);
        // Attribute partition follows the point split
        assert_eq!(mesh.faces[1].uvs[0], Vector2::new(1.0, 1.0));
        assert_eq!(mesh.faces[1].uvs[2], Vector2::new(0.0, 0.0));
    }

    #[test]
    fn test_triangulate_is_idempotent() {
        let mut mesh = quad_mesh();
        mesh.triangulate_quads();
        let count = mesh.faces.len();
        mesh.triangulate_quads();
        assert_eq!(mesh.faces.len(), count);
    }

    #[test]
    fn test_boolean_add_merges_and_dedups_materials() {
        let mut lib = MaterialLibrary::new();
        let shared = lib.add(Material::new("shared"));
        let only_b = lib.add(Material::new("only-b"));

        let mut a = quad_mesh();
        let slot = a.add_material(shared);
        a.faces[0].material = slot;

        let mut b = Mesh::new();
        b.add_points(&[
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ]);
        let b_shared = b.add_material(shared);
        let b_only = b.add_material(only_b);
        b.add_face(&[0, 1, 2], b_shared, 1);
        b.add_face(&[2, 1, 0], b_only, 2);

        a.boolean_add(&b, None);

        assert_eq!(a.points.len(), 7);
        assert_eq!(a.faces.len(), 3);
        // shared dedups onto the existing slot, only-b is appended
        assert_eq!(a.materials, vec![shared, only_b]);
        assert_eq!(a.faces[1].material, 0);
        assert_eq!(a.faces[2].material, 1);
        assert_eq!(a.faces[1].points, vec![4, 5, 6]);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_boolean_add_applies_transform() {
        let mut a = Mesh::new();
        let b = quad_mesh();
        let shift = Matrix4::new_translation(&Vector3::new(0.0, 0.0, 5.0));
        a.boolean_add(&b, Some(&shift));
        assert_eq!(a.points[0], Point3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_remove_doubles() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0), // duplicate of 1
            Point3::new(0.0, 1.0, 0.0), // duplicate of 2
            Point3::new(1.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face(&[3, 5, 4], 0, 0);

        let removed = mesh.remove_doubles(None);
        assert_eq!(removed, 2);
        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.faces[1].points, vec![1, 3, 2]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_remove_doubles_welds_to_first_match() {
        let mut mesh = Mesh::new();
        // At a coarse tolerance, point 2 lies within range of both
        // survivors and is nearer to point 1; it still welds onto the
        // earliest match, point 0
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.8, 0.0, 0.0),
            Point3::new(0.45, 0.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);

        let removed = mesh.remove_doubles(Some(0.5));
        assert_eq!(removed, 1);
        assert_eq!(mesh.points.len(), 2);
        assert_eq!(mesh.faces[0].points, vec![0, 1, 0]);
    }

    #[test]
    fn test_remove_unreferenced_points() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 5.0), // orphan
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 2, 3], 0, 0);

        let removed = mesh.remove_unreferenced_points();
        assert_eq!(removed, 1);
        assert_eq!(mesh.points.len(), 3);
        assert_eq!(mesh.faces[0].points, vec![0, 1, 2]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_build_edges_skips_shared_interior() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face(&[0, 2, 3], 0, 0);
        mesh.build_edges();
        // 4 boundary edges + the shared diagonal recorded once
        assert_eq!(mesh.edges.as_ref().unwrap().len(), 5);
    }

    #[test]
    fn test_build_edges_separates_segments() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face(&[0, 2, 3], 0, 1);
        mesh.build_edges();
        // Different segment contexts keep their own copy of the diagonal
        assert_eq!(mesh.edges.as_ref().unwrap().len(), 6);
    }

    #[test]
    fn test_remove_internals_drops_back_to_back_faces() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);
        // Back-to-back pair: every edge of each has its reverse on the other
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face(&[2, 1, 0], 0, 0);
        // Open face sharing one edge only
        mesh.add_face(&[1, 3, 2], 0, 0);

        let removed = mesh.remove_internals();
        assert_eq!(removed, 2);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.faces[0].points, vec![1, 3, 2]);
    }
}
