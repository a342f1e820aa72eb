// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Mesh topology store
//!
//! Owns the point and face arrays and the ordered material list, and
//! provides incremental and declarative construction. Derived state
//! (normal adjacency cache, boundary edges, compiled buffers) is attached
//! here but produced by the normal engine and the compilation pipeline.

use ahash::AHashMap;
use log::warn;
use nalgebra::{Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::face::Face;
use super::material::MaterialHandle;
use super::normals::NormalMap;
use super::transforms::Edge;
use crate::compile::backend::MeshBuffer;
use crate::compile::vbo::DynamicState;
use crate::error::MeshError;

/// Polygonal mesh: flat point list, face list, ordered material list, and
/// derived/cached state produced by the downstream pipeline stages.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    /// Point positions, shared across faces by index
    pub points: Vec<Point3<f64>>,
    pub faces: Vec<Face>,
    /// Materials used by this mesh, deduplicated by handle, in first-use
    /// order. `Face::material` indexes this list.
    pub materials: Vec<MaterialHandle>,
    /// Fixed-topology contract: compiled buffers are patched in place and
    /// point/face counts must not change after the first compile.
    pub dynamic: bool,
    /// Corner-normal adjacency cache from the last `calc_normals` pass;
    /// invalidated by any topology change.
    #[serde(skip)]
    pub normal_map: Option<NormalMap>,
    /// Boundary/wireframe edges from `build_edges`
    #[serde(skip)]
    pub edges: Option<Vec<Edge>>,
    /// Compiled GPU buffer handles, once bound
    #[serde(skip)]
    pub compiled: Option<MeshBuffer>,
    /// Per-segment visibility, seeded at bind time
    #[serde(skip)]
    pub segment_state: AHashMap<i32, bool>,
    #[serde(skip)]
    pub(crate) dynamic_state: Option<DynamicState>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Create a mesh under the dynamic-update contract
    pub fn dynamic() -> Self {
        Self {
            dynamic: true,
            ..Self::default()
        }
    }

    /// Append a point, returning its index
    pub fn add_point(&mut self, p: Point3<f64>) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    /// Append several points, returning the index of the last one added
    pub fn add_points(&mut self, points: &[Point3<f64>]) -> usize {
        self.points.extend_from_slice(points);
        self.points.len() - 1
    }

    /// Resolve a material handle to its slot in this mesh's material list,
    /// appending it if new. Deduplication is by handle equality.
    pub fn add_material(&mut self, handle: MaterialHandle) -> usize {
        match self.materials.iter().position(|&m| m == handle) {
            Some(idx) => idx,
            None => {
                self.materials.push(handle);
                self.materials.len() - 1
            }
        }
    }

    pub fn material_slot(&self, handle: MaterialHandle) -> Option<usize> {
        self.materials.iter().position(|&m| m == handle)
    }

    /// Append a face with an explicit material slot and segment
    pub fn add_face(&mut self, points: &[usize], material: usize, segment: i32) -> usize {
        self.faces.push(Face::new(points.to_vec(), material, segment));
        self.faces.len() - 1
    }

    /// Create or overwrite the face at `face_num`. Gaps below `face_num`
    /// are filled with empty faces, matching sparse importer input.
    pub fn add_face_at(
        &mut self,
        face_num: usize,
        points: &[usize],
        material: usize,
        segment: i32,
    ) -> usize {
        if self.faces.len() <= face_num {
            self.faces.resize_with(face_num + 1, Face::default);
        }
        self.faces[face_num] = Face::new(points.to_vec(), material, segment);
        face_num
    }

    /// Retag one face's material by handle, resolving (and appending) the
    /// handle against this mesh's material list
    pub fn set_face_material(&mut self, handle: MaterialHandle, face_num: usize) {
        let slot = self.add_material(handle);
        match self.faces.get_mut(face_num) {
            Some(face) => face.material = slot,
            None => warn!("set_face_material: no face {face_num}"),
        }
    }

    /// Builder with an explicit current-material/segment cursor
    pub fn builder(&mut self) -> MeshBuilder<'_> {
        MeshBuilder {
            mesh: self,
            material: 0,
            segment: 0,
        }
    }

    pub fn set_segment_visible(&mut self, segment: i32, visible: bool) {
        self.segment_state.insert(segment, visible);
    }

    pub fn show_all_segments(&mut self) {
        for state in self.segment_state.values_mut() {
            *state = true;
        }
    }

    pub fn hide_all_segments(&mut self) {
        for state in self.segment_state.values_mut() {
            *state = false;
        }
    }

    /// Drop derived caches after a topology change
    pub(crate) fn invalidate_caches(&mut self) {
        self.normal_map = None;
        self.edges = None;
    }

    /// Release CPU-side topology once the compiled buffer is the source of
    /// truth. No-op for dynamic meshes, which keep patching from the CPU
    /// arrays. Recompiling or re-subdividing after `clean` requires
    /// rebuilding from the original source.
    pub fn clean(&mut self) {
        if self.dynamic {
            return;
        }
        self.points = Vec::new();
        self.faces = Vec::new();
        self.invalidate_caches();
    }

    /// Check the structural invariants the compiler depends on
    pub fn validate(&self) -> Result<(), MeshError> {
        for (fi, face) in self.faces.iter().enumerate() {
            for &p in &face.points {
                if p >= self.points.len() {
                    return Err(MeshError::PointOutOfRange {
                        face: fi,
                        point: p,
                        point_count: self.points.len(),
                    });
                }
            }
            let n = face.points.len();
            for (name, len) in [
                ("point_normals", face.point_normals.len()),
                ("uvs", face.uvs.len()),
                ("point_colors", face.point_colors.len()),
            ] {
                if len != 0 && len != n {
                    return Err(MeshError::AttributeParity {
                        face: fi,
                        attr: name,
                        attr_len: len,
                        point_count: n,
                    });
                }
            }
            if !self.materials.is_empty() && face.material >= self.materials.len() {
                return Err(MeshError::UnresolvedMaterial {
                    face: fi,
                    material: face.material,
                    material_count: self.materials.len(),
                });
            }
        }
        Ok(())
    }

    /// Bulk-construct from declarative parts. Malformed parts are logged
    /// and skipped so partially bad scene data still renders.
    pub fn build(&mut self, parts: &[MeshPart], registry: Option<&PrimitiveRegistry>) {
        for (pi, part) in parts.iter().enumerate() {
            self.build_part(pi, part, registry);
        }
        self.invalidate_caches();
    }

    fn build_part(&mut self, pi: usize, part: &MeshPart, registry: Option<&PrimitiveRegistry>) {
        if let Some(primitive) = &part.primitive {
            let Some(generator) = registry.and_then(|r| r.get(&primitive.kind)) else {
                warn!("build: part {pi}: unknown primitive type {:?}, skipped", primitive.kind);
                return;
            };
            match generator(&primitive.params) {
                Ok(generated) => {
                    self.boolean_add(&generated, None);
                }
                Err(err) => {
                    warn!("build: part {pi}: primitive {:?} failed: {err}, skipped", primitive.kind);
                }
            }
            return;
        }

        let point_offset = self.points.len();
        self.points.extend_from_slice(&part.points);

        let material = match part.material {
            Some(handle) => self.add_material(handle),
            None => 0,
        };
        let segment = part.segment.unwrap_or(0);
        let first_face = self.faces.len();

        for (fi, face_points) in part.faces.iter().enumerate() {
            let offset_points: Vec<usize> =
                face_points.iter().map(|&p| p + point_offset).collect();
            if let Some(&bad) = offset_points.iter().find(|&&p| p >= self.points.len()) {
                warn!("build: part {pi} face {fi} references point {bad} out of range, skipped");
                continue;
            }
            self.add_face(&offset_points, material, segment);
        }
        let face_count = self.faces.len() - first_face;

        match &part.uv {
            Some(UvSource::PerFace(uv_lists)) => {
                if uv_lists.len() != face_count {
                    warn!(
                        "build: part {pi} has {} uv lists for {} faces, uvs skipped",
                        uv_lists.len(),
                        face_count
                    );
                } else {
                    for (face, uvs) in self.faces[first_face..].iter_mut().zip(uv_lists) {
                        if uvs.len() != face.points.len() {
                            warn!("build: part {pi}: uv count mismatch on face, uvs skipped");
                            continue;
                        }
                        face.set_uvs(uvs.clone());
                    }
                }
            }
            Some(UvSource::Mapper(mapper)) => {
                mapper.apply(self, material, segment, first_face, face_count);
            }
            None => {}
        }

        if let Some(color_lists) = &part.colors {
            if color_lists.len() != face_count {
                warn!(
                    "build: part {pi} has {} color lists for {} faces, colors skipped",
                    color_lists.len(),
                    face_count
                );
            } else {
                for (face, colors) in self.faces[first_face..].iter_mut().zip(color_lists) {
                    if colors.len() != face.points.len() {
                        warn!("build: part {pi}: color count mismatch on face, colors skipped");
                        continue;
                    }
                    face.set_colors(colors.clone());
                }
            }
        }
    }
}

/// Explicit construction cursor: current material slot and segment carried
/// as builder state instead of hidden fields on the mesh, so construction
/// order stays visible at the call site.
pub struct MeshBuilder<'a> {
    mesh: &'a mut Mesh,
    material: usize,
    segment: i32,
}

impl<'a> MeshBuilder<'a> {
    /// Set the cursor material, resolving the handle against the mesh
    pub fn material(&mut self, handle: MaterialHandle) -> &mut Self {
        self.material = self.mesh.add_material(handle);
        self
    }

    pub fn segment(&mut self, segment: i32) -> &mut Self {
        self.segment = segment;
        self
    }

    pub fn add_point(&mut self, p: Point3<f64>) -> usize {
        self.mesh.add_point(p)
    }

    pub fn add_points(&mut self, points: &[Point3<f64>]) -> usize {
        self.mesh.add_points(points)
    }

    /// Append a face under the cursor's material/segment
    pub fn add_face(&mut self, points: &[usize]) -> usize {
        self.mesh.add_face(points, self.material, self.segment)
    }

    /// Create or overwrite a face at an explicit slot
    pub fn add_face_at(&mut self, face_num: usize, points: &[usize]) -> usize {
        self.mesh
            .add_face_at(face_num, points, self.material, self.segment)
    }

    pub fn mesh(&mut self) -> &mut Mesh {
        self.mesh
    }
}

/// UV-projection collaborator applied over a freshly built face range
pub trait UvMapper {
    fn apply(
        &self,
        mesh: &mut Mesh,
        material: usize,
        segment: i32,
        first_face: usize,
        face_count: usize,
    );
}

/// UV input for a declarative part
pub enum UvSource {
    /// Projection object applied after the part's faces are added
    Mapper(Box<dyn UvMapper>),
    /// Explicit per-face corner UVs, one list per face
    PerFace(Vec<Vec<Vector2<f64>>>),
}

/// Named primitive record dispatched through a [`PrimitiveRegistry`]
pub struct PrimitiveSpec {
    pub kind: String,
    pub params: Value,
}

/// One declarative construction part: either explicit points/faces with
/// optional attributes, or a named primitive record.
#[derive(Default)]
pub struct MeshPart {
    pub material: Option<MaterialHandle>,
    pub segment: Option<i32>,
    pub points: Vec<Point3<f64>>,
    /// Point indices relative to this part's own point list
    pub faces: Vec<Vec<usize>>,
    pub uv: Option<UvSource>,
    pub colors: Option<Vec<Vec<Vector3<f64>>>>,
    pub primitive: Option<PrimitiveSpec>,
}

type PrimitiveFn = Box<dyn Fn(&Value) -> anyhow::Result<Mesh>>;

/// Registry of named primitive generators used by declarative `build`
#[derive(Default)]
pub struct PrimitiveRegistry {
    generators: AHashMap<String, PrimitiveFn>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: impl Into<String>,
        generator: impl Fn(&Value) -> anyhow::Result<Mesh> + 'static,
    ) {
        self.generators.insert(kind.into(), Box::new(generator));
    }

    fn get(&self, kind: &str) -> Option<&PrimitiveFn> {
        self.generators.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::material::{Material, MaterialLibrary};

    #[test]
    fn test_add_points_returns_last_index() {
        let mut mesh = Mesh::new();
        assert_eq!(mesh.add_point(Point3::new(0.0, 0.0, 0.0)), 0);
        let last = mesh.add_points(&[
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        assert_eq!(last, 2);
        assert_eq!(mesh.points.len(), 3);
    }

    #[test]
    fn test_builder_cursor() {
        let mut lib = MaterialLibrary::new();
        let steel = lib.add(Material::new("steel"));
        let glass = lib.add(Material::new("glass"));

        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        let mut b = mesh.builder();
        b.material(steel).segment(2);
        b.add_face(&[0, 1, 2]);
        b.material(glass);
        b.add_face(&[1, 3, 2]);

        assert_eq!(mesh.materials.len(), 2);
        assert_eq!(mesh.faces[0].material, 0);
        assert_eq!(mesh.faces[0].segment, 2);
        assert_eq!(mesh.faces[1].material, 1);
        assert_eq!(mesh.faces[1].segment, 2);
    }

    #[test]
    fn test_add_material_dedups_by_handle() {
        let mut lib = MaterialLibrary::new();
        let m = lib.add(Material::new("steel"));
        let mut mesh = Mesh::new();
        assert_eq!(mesh.add_material(m), 0);
        assert_eq!(mesh.add_material(m), 0);
        assert_eq!(mesh.materials.len(), 1);
    }

    #[test]
    fn test_add_face_at_overwrites() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.add_face_at(0, &[2, 1, 0], 0, 5);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.faces[0].points, vec![2, 1, 0]);
        assert_eq!(mesh.faces[0].segment, 5);
    }

    #[test]
    fn test_build_skips_malformed_part() {
        let mut mesh = Mesh::new();
        let parts = [
            MeshPart {
                points: vec![
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                faces: vec![vec![0, 1, 2], vec![0, 1, 99]],
                ..Default::default()
            },
            MeshPart {
                primitive: Some(PrimitiveSpec {
                    kind: "torus".into(),
                    params: Value::Null,
                }),
                ..Default::default()
            },
        ];
        mesh.build(&parts, None);
        // The out-of-range face and the unknown primitive are both skipped
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.points.len(), 3);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_build_offsets_part_points() {
        let mut mesh = Mesh::new();
        mesh.add_point(Point3::new(9.0, 9.0, 9.0));
        let parts = [MeshPart {
            points: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2]],
            ..Default::default()
        }];
        mesh.build(&parts, None);
        assert_eq!(mesh.faces[0].points, vec![1, 2, 3]);
    }

    #[test]
    fn test_build_dispatches_primitive() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("tri", |_params| {
            let mut m = Mesh::new();
            m.add_points(&[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ]);
            m.add_face(&[0, 1, 2], 0, 0);
            Ok(m)
        });
        let mut mesh = Mesh::new();
        mesh.build(
            &[MeshPart {
                primitive: Some(PrimitiveSpec {
                    kind: "tri".into(),
                    params: Value::Null,
                }),
                ..Default::default()
            }],
            Some(&registry),
        );
        assert_eq!(mesh.points.len(), 3);
        assert_eq!(mesh.faces.len(), 1);
    }

    #[test]
    fn test_build_per_face_uvs_mismatch_skipped() {
        let mut mesh = Mesh::new();
        mesh.build(
            &[MeshPart {
                points: vec![
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                faces: vec![vec![0, 1, 2]],
                uv: Some(UvSource::PerFace(vec![vec![
                    Vector2::new(0.0, 0.0),
                    Vector2::new(1.0, 0.0),
                ]])),
                ..Default::default()
            }],
            None,
        );
        assert!(mesh.faces[0].uvs.is_empty());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_attribute_parity() {
        let mut mesh = Mesh::new();
        mesh.add_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.add_face(&[0, 1, 2], 0, 0);
        mesh.faces[0].uvs.push(Vector2::zeros());
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::AttributeParity { .. })
        ));
    }
}
