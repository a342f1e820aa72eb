// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Compiled vertex data
//!
//! Flattens a [`CompileMap`] into tightly packed typed arrays ready for
//! upload, and carries the dynamic back-mapping that lets a fixed-topology
//! mesh refill those arrays in place each frame.

use log::warn;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::map::CompileMap;
use crate::geometry::bbox::BoundingBox;
use crate::geometry::mesh::Mesh;

/// Which outputs [`Mesh::compile_vbo`] should emit
#[derive(Debug, Clone, Copy)]
pub struct AttributeSelect {
    pub element: bool,
    pub vertex: bool,
    pub normal: bool,
    pub uv: bool,
    pub color: bool,
}

impl Default for AttributeSelect {
    fn default() -> Self {
        Self {
            element: true,
            vertex: true,
            normal: true,
            uv: true,
            color: true,
        }
    }
}

/// Which attributes a dynamic [`Mesh::update`] pass should refresh
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub points: bool,
    pub normals: bool,
    pub uvs: bool,
    pub colors: bool,
}

impl UpdateOptions {
    pub fn points() -> Self {
        Self {
            points: true,
            ..Self::default()
        }
    }

    pub fn points_and_normals() -> Self {
        Self {
            points: true,
            normals: true,
            ..Self::default()
        }
    }
}

/// Index range of one (material, segment) partition within the packed
/// element (or line-element) array
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ElementRange {
    pub material: usize,
    pub segment: i32,
    pub start: usize,
    pub count: usize,
}

/// Back-mapping from output vertices to their live sources, kept for
/// dynamic meshes so the typed arrays can be refilled without recompiling
/// the map. Sized once at compile time; valid only while point/face counts
/// stay fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicMap {
    /// Output vertex -> source point index
    pub points: Vec<u32>,
    /// Output vertex -> (face, corner) supplying its normal
    pub normals: Vec<(u32, u32)>,
    pub uvs: Vec<(u32, u32)>,
    pub colors: Vec<(u32, u32)>,
}

/// Packed attribute arrays and 16-bit index lists produced from a
/// [`CompileMap`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileVbo {
    pub points: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub colors: Vec<f32>,
    pub elements: Vec<u16>,
    pub element_ranges: Vec<ElementRange>,
    pub line_elements: Vec<u16>,
    pub line_ranges: Vec<ElementRange>,
    pub segments: Vec<i32>,
    pub bounds: Option<BoundingBox>,
    pub dynamic_map: Option<DynamicMap>,
}

/// CPU-side snapshot retained by a dynamic mesh after compile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicState {
    pub vbo: CompileVbo,
    /// Point positions at compile time, for change diffing
    pub source_points: Vec<Point3<f64>>,
}

impl Mesh {
    /// Flatten a compile map into packed typed arrays. For dynamic meshes
    /// the result also carries the [`DynamicMap`] back-mapping.
    pub fn compile_vbo(&self, map: &CompileMap, select: AttributeSelect) -> CompileVbo {
        let mut vbo = CompileVbo {
            segments: map.segments.clone(),
            bounds: map.bounds,
            ..CompileVbo::default()
        };

        if map.vertex_count() > u16::MAX as usize {
            warn!(
                "compile_vbo: {} vertices exceed 16-bit element range",
                map.vertex_count()
            );
        }

        if select.vertex {
            vbo.points.reserve(map.points.len() * 3);
            for &pt in &map.points {
                let p = &self.points[pt];
                vbo.points.extend([p.x as f32, p.y as f32, p.z as f32]);
            }
        }

        if select.normal && map.has_normals {
            vbo.normals.reserve(map.normals.len() * 3);
            for &(face, corner) in &map.normals {
                let n = &self.faces[face as usize].point_normals[corner as usize];
                vbo.normals.extend([n.x as f32, n.y as f32, n.z as f32]);
            }
        }

        if select.uv && map.has_uvs {
            vbo.uvs.reserve(map.uvs.len() * 2);
            for &(face, corner) in &map.uvs {
                let uv = &self.faces[face as usize].uvs[corner as usize];
                vbo.uvs.extend([uv.x as f32, uv.y as f32]);
            }
        }

        if select.color && map.has_colors {
            vbo.colors.reserve(map.colors.len() * 3);
            for &(face, corner) in &map.colors {
                let c = &self.faces[face as usize].point_colors[corner as usize];
                vbo.colors.extend([c.x as f32, c.y as f32, c.z as f32]);
            }
        }

        if select.element {
            for partition in &map.partitions {
                vbo.element_ranges.push(ElementRange {
                    material: partition.material,
                    segment: partition.segment,
                    start: vbo.elements.len(),
                    count: partition.elements.len(),
                });
                vbo.elements
                    .extend(partition.elements.iter().map(|&e| e as u16));

                if !partition.line_elements.is_empty() {
                    vbo.line_ranges.push(ElementRange {
                        material: partition.material,
                        segment: partition.segment,
                        start: vbo.line_elements.len(),
                        count: partition.line_elements.len(),
                    });
                    vbo.line_elements
                        .extend(partition.line_elements.iter().map(|&e| e as u16));
                }
            }
        }

        if self.dynamic {
            vbo.dynamic_map = Some(DynamicMap {
                points: map.points.iter().map(|&p| p as u32).collect(),
                normals: map.normals.clone(),
                uvs: map.uvs.clone(),
                colors: map.colors.clone(),
            });
        }

        vbo
    }

    /// Refill the already-sized typed arrays from live mesh data through
    /// the dynamic back-mapping. No reallocation; vertex count and
    /// topology must be unchanged since compile (caller contract, not
    /// checked here).
    pub(crate) fn update_vbo(&self, vbo: &mut CompileVbo, options: UpdateOptions) {
        let Some(map) = vbo.dynamic_map.take() else {
            warn!("update_vbo: mesh has no dynamic back-mapping");
            return;
        };

        if options.points {
            for (i, &pt) in map.points.iter().enumerate() {
                let p = &self.points[pt as usize];
                vbo.points[i * 3] = p.x as f32;
                vbo.points[i * 3 + 1] = p.y as f32;
                vbo.points[i * 3 + 2] = p.z as f32;
            }
        }
        if options.normals {
            for (i, &(face, corner)) in map.normals.iter().enumerate() {
                let n = &self.faces[face as usize].point_normals[corner as usize];
                vbo.normals[i * 3] = n.x as f32;
                vbo.normals[i * 3 + 1] = n.y as f32;
                vbo.normals[i * 3 + 2] = n.z as f32;
            }
        }
        if options.uvs {
            for (i, &(face, corner)) in map.uvs.iter().enumerate() {
                let uv = &self.faces[face as usize].uvs[corner as usize];
                vbo.uvs[i * 2] = uv.x as f32;
                vbo.uvs[i * 2 + 1] = uv.y as f32;
            }
        }
        if options.colors {
            for (i, &(face, corner)) in map.colors.iter().enumerate() {
                let c = &self.faces[face as usize].point_colors[corner as usize];
                vbo.colors[i * 3] = c.x as f32;
                vbo.colors[i * 3 + 1] = c.y as f32;
                vbo.colors[i * 3 + 2] = c.z as f32;
            }
        }

        vbo.dynamic_map = Some(map);
    }
}
