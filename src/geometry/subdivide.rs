// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Subdivision engine
//!
//! Recursive linear or Catmull-Clark subdivision of triangle/quad faces.
//! Each level replaces a face with one quad per corner, built from the
//! corner, its two adjacent edge points and the face point, propagating
//! UV/color/normal averages alongside positions.

use ahash::AHashMap;
use log::error;
use nalgebra::{Point3, Vector2, Vector3};

use super::face::Face;
use super::mesh::Mesh;
use crate::error::MeshError;

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

struct EdgeEntry {
    /// Faces adjacent to this edge; interior edges have 2
    faces: Vec<usize>,
    /// Index of this edge's point in the output, assigned in face order
    point: Option<usize>,
}

impl Mesh {
    /// Apply `level` rounds of subdivision. With `catmull` the full
    /// Catmull-Clark rules run (face points, blended edge points, original
    /// vertex repositioning); otherwise plain midpoint subdivision.
    ///
    /// Catmull-Clark requires a closed surface: an edge with only one
    /// adjacent face aborts the call with [`MeshError::SubdivisionHole`]
    /// and leaves the mesh unmodified. Faces that are not triangles or
    /// quads are carried over untouched.
    pub fn subdivide(&mut self, level: u32, catmull: bool) -> Result<(), MeshError> {
        for _ in 0..level {
            if let Err(err) = self.subdivide_once(catmull) {
                error!("subdivide: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    fn subdivide_once(&mut self, catmull: bool) -> Result<(), MeshError> {
        let subdividable: Vec<usize> = self
            .faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.points.len() == 3 || f.points.len() == 4)
            .map(|(i, _)| i)
            .collect();

        // Adjacency over the subdividable faces only
        let mut edge_map: AHashMap<(usize, usize), EdgeEntry> = AHashMap::new();
        let mut vertex_faces: Vec<Vec<usize>> = vec![Vec::new(); self.points.len()];
        let mut vertex_edges: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.points.len()];

        for &fi in &subdividable {
            let face = &self.faces[fi];
            let n = face.points.len();
            for i in 0..n {
                let a = face.points[i];
                let b = face.points[(i + 1) % n];
                let key = edge_key(a, b);
                let entry = edge_map.entry(key).or_insert_with(|| EdgeEntry {
                    faces: Vec::new(),
                    point: None,
                });
                if !entry.faces.contains(&fi) {
                    entry.faces.push(fi);
                }
                vertex_faces[a].push(fi);
                if !vertex_edges[a].contains(&key) {
                    vertex_edges[a].push(key);
                }
                if !vertex_edges[b].contains(&key) {
                    vertex_edges[b].push(key);
                }
            }
        }

        if catmull {
            // The Catmull-Clark edge rule needs both adjacent face points;
            // abort before touching the mesh
            for (&(a, b), entry) in &edge_map {
                if entry.faces.len() < 2 {
                    return Err(MeshError::SubdivisionHole { a, b });
                }
            }
        }

        // Face points: centroid of positions and of uniformly present
        // corner attributes
        let mut face_centroids: AHashMap<usize, Point3<f64>> = AHashMap::new();
        for &fi in &subdividable {
            let face = &self.faces[fi];
            let sum = face
                .points
                .iter()
                .fold(Vector3::zeros(), |acc, &p| acc + self.points[p].coords);
            face_centroids.insert(fi, Point3::from(sum / face.points.len() as f64));
        }

        let mut new_points = self.points.clone();

        if catmull {
            // Reposition each original point of the subdivided region:
            // (F + 2R + (n-3)P) / n, with F the average adjacent face
            // point and R the average adjacent edge midpoint
            for v in 0..self.points.len() {
                let adjacent = &vertex_faces[v];
                if adjacent.is_empty() {
                    continue;
                }
                let n = adjacent.len() as f64;
                let f = adjacent
                    .iter()
                    .fold(Vector3::zeros(), |acc, fi| acc + face_centroids[fi].coords)
                    / n;
                let r = vertex_edges[v].iter().fold(Vector3::zeros(), |acc, &(a, b)| {
                    acc + (self.points[a].coords + self.points[b].coords) / 2.0
                }) / n;
                new_points[v] =
                    Point3::from((f + 2.0 * r + (n - 3.0) * self.points[v].coords) / n);
            }
        }

        // Edge points, assigned in face-traversal order for determinism
        for &fi in &subdividable {
            let face = &self.faces[fi];
            let n = face.points.len();
            for i in 0..n {
                let a = face.points[i];
                let b = face.points[(i + 1) % n];
                let entry = edge_map.get_mut(&edge_key(a, b)).unwrap();
                if entry.point.is_some() {
                    continue;
                }
                let midpoint = (self.points[a].coords + self.points[b].coords) / 2.0;
                let position = if catmull {
                    let face_mid = (face_centroids[&entry.faces[0]].coords
                        + face_centroids[&entry.faces[1]].coords)
                        / 2.0;
                    (midpoint + face_mid) / 2.0
                } else {
                    midpoint
                };
                entry.point = Some(new_points.len());
                new_points.push(Point3::from(position));
            }
        }

        let mut face_points: AHashMap<usize, usize> = AHashMap::new();
        for &fi in &subdividable {
            face_points.insert(fi, new_points.len());
            new_points.push(face_centroids[&fi]);
        }

        // Untouched faces carry over; each subdividable face becomes one
        // quad per corner
        let mut new_faces: Vec<Face> = self
            .faces
            .iter()
            .enumerate()
            .filter(|(fi, _)| !face_points.contains_key(fi))
            .map(|(_, f)| f.clone())
            .collect();

        for &fi in &subdividable {
            let face = &self.faces[fi];
            let n = face.points.len();
            let has_uvs = face.uvs.len() == n;
            let has_colors = face.point_colors.len() == n;
            let has_normals = face.point_normals.len() == n;

            let uv_center = has_uvs
                .then(|| face.uvs.iter().sum::<Vector2<f64>>() / n as f64);
            let color_center = has_colors
                .then(|| face.point_colors.iter().sum::<Vector3<f64>>() / n as f64);
            let normal_center = has_normals
                .then(|| face.point_normals.iter().sum::<Vector3<f64>>() / n as f64);

            for i in 0..n {
                let prev = (i + n - 1) % n;
                let next = (i + 1) % n;
                let ep_next = edge_map[&edge_key(face.points[i], face.points[next])]
                    .point
                    .unwrap();
                let ep_prev = edge_map[&edge_key(face.points[prev], face.points[i])]
                    .point
                    .unwrap();

                let mut quad = Face::new(
                    vec![face.points[i], ep_next, face_points[&fi], ep_prev],
                    face.material,
                    face.segment,
                );
                quad.normal = face.normal;
                if let Some(center) = uv_center {
                    quad.uvs = vec![
                        face.uvs[i],
                        (face.uvs[i] + face.uvs[next]) / 2.0,
                        center,
                        (face.uvs[prev] + face.uvs[i]) / 2.0,
                    ];
                }
                if let Some(center) = color_center {
                    quad.point_colors = vec![
                        face.point_colors[i],
                        (face.point_colors[i] + face.point_colors[next]) / 2.0,
                        center,
                        (face.point_colors[prev] + face.point_colors[i]) / 2.0,
                    ];
                }
                if let Some(center) = normal_center {
                    quad.point_normals = vec![
                        face.point_normals[i],
                        (face.point_normals[i] + face.point_normals[next]) / 2.0,
                        center,
                        (face.point_normals[prev] + face.point_normals[i]) / 2.0,
                    ];
                }
                new_faces.push(quad);
            }
        }

        self.points = new_points;
        self.faces = new_faces;
        self.invalidate_caches();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_quad() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2, 3], 0, 0);
        mesh
    }

    fn quad_cube() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ]);
        mesh.add_face(&[0, 3, 2, 1], 0, 0);
        mesh.add_face(&[4, 5, 6, 7], 0, 0);
        mesh.add_face(&[0, 1, 5, 4], 0, 0);
        mesh.add_face(&[2, 3, 7, 6], 0, 0);
        mesh.add_face(&[1, 2, 6, 5], 0, 0);
        mesh.add_face(&[3, 0, 4, 7], 0, 0);
        mesh
    }

    #[test]
    fn test_linear_quad_counts() {
        let mut mesh = single_quad();
        mesh.subdivide(1, false).unwrap();
        // 4 original + 4 edge points + 1 face point
        assert_eq!(mesh.points.len(), 9);
        assert_eq!(mesh.faces.len(), 4);
        assert!(mesh.faces.iter().all(|f| f.points.len() == 4));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_linear_keeps_original_positions() {
        let mut mesh = single_quad();
        mesh.subdivide(1, false).unwrap();
        assert_eq!(mesh.points[0], Point3::new(0.0, 0.0, 0.0));
        // Face point is the centroid
        assert_relative_eq!(
            mesh.points[8],
            Point3::new(0.5, 0.5, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_linear_propagates_uvs() {
        let mut mesh = single_quad();
        mesh.faces[0].set_uvs(vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ]);
        mesh.subdivide(1, false).unwrap();
        let quad = &mesh.faces[0]; // corner 0 quad
        assert_eq!(quad.uvs[0], Vector2::new(0.0, 0.0));
        assert_eq!(quad.uvs[1], Vector2::new(0.5, 0.0));
        assert_eq!(quad.uvs[2], Vector2::new(0.5, 0.5));
        assert_eq!(quad.uvs[3], Vector2::new(0.0, 0.5));
    }

    #[test]
    fn test_catmull_open_quad_is_hole_error() {
        let mut mesh = single_quad();
        let err = mesh.subdivide(1, true);
        assert!(matches!(err, Err(MeshError::SubdivisionHole { .. })));
        // Mesh unmodified on failure
        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.faces.len(), 1);
    }

    #[test]
    fn test_catmull_cube_counts() {
        let mut mesh = quad_cube();
        mesh.subdivide(1, true).unwrap();
        // Closed quad cube: V + E + F = 8 + 12 + 6
        assert_eq!(mesh.points.len(), 26);
        assert_eq!(mesh.faces.len(), 24);
        mesh.subdivide(1, true).unwrap();
        assert_eq!(mesh.points.len(), 98);
        assert_eq!(mesh.faces.len(), 96);
    }

    #[test]
    fn test_catmull_pulls_corners_inward() {
        let mut mesh = quad_cube();
        mesh.subdivide(1, true).unwrap();
        // Original cube corners shrink toward the center
        let p = mesh.points[0];
        assert!(p.x > -1.0 && p.y > -1.0 && p.z > -1.0);
    }

    #[test]
    fn test_triangle_subdivides_into_three_quads() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.subdivide(1, false).unwrap();
        assert_eq!(mesh.faces.len(), 3);
        // 3 original + 3 edge + 1 face point
        assert_eq!(mesh.points.len(), 7);
    }

    #[test]
    fn test_odd_faces_carried_over() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.5, 1.5, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        // A pentagon is neither triangulated nor deleted
        mesh.add_face(&[0, 1, 2, 3, 4], 0, 0);
        mesh.subdivide(1, false).unwrap();
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.faces[0].points.len(), 5);
    }
}
