// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Compilation pipeline
//!
//! map -> vbo -> buffer -> bind. `compile_map` plans vertex deduplication,
//! `compile_vbo` packs typed arrays, `buffer_vbo` uploads them through the
//! rendering backend, and `bind_buffer` attaches the result to the mesh.
//! Dynamic meshes keep a CPU-side snapshot for the per-frame `update`
//! path.

pub mod backend;
pub mod map;
pub mod vbo;

pub use backend::{BufferId, BufferTarget, BufferUsage, MemoryBackend, MeshBuffer, RenderBackend};
pub use map::{CompileMap, Partition, DEFAULT_COMPILE_TOLERANCE};
pub use vbo::{AttributeSelect, CompileVbo, DynamicMap, ElementRange, UpdateOptions};

use log::warn;

use crate::geometry::material::MaterialLibrary;
use crate::geometry::mesh::Mesh;
use vbo::DynamicState;

/// Upload a compiled VBO's populated arrays and return the buffer handles.
///
/// Attributes absent from `vbo` inherit `base`'s handles instead of being
/// left null, so a partial recompile can fuse with an earlier buffer.
pub fn buffer_vbo(
    backend: &mut dyn RenderBackend,
    vbo: &CompileVbo,
    base: Option<&MeshBuffer>,
) -> MeshBuffer {
    let upload_f32 = |backend: &mut dyn RenderBackend, data: &[f32]| {
        let id = backend.create_buffer();
        backend.buffer_data(
            id,
            BufferTarget::Array,
            bytemuck::cast_slice(data),
            BufferUsage::Static,
        );
        id
    };
    let upload_u16 = |backend: &mut dyn RenderBackend, data: &[u16]| {
        let id = backend.create_buffer();
        backend.buffer_data(
            id,
            BufferTarget::ElementArray,
            bytemuck::cast_slice(data),
            BufferUsage::Static,
        );
        id
    };
    let inherit = |get: fn(&MeshBuffer) -> Option<BufferId>| base.and_then(get);

    let points = if vbo.points.is_empty() {
        inherit(|b| b.points)
    } else {
        Some(upload_f32(backend, &vbo.points))
    };
    let normals = if vbo.normals.is_empty() {
        inherit(|b| b.normals)
    } else {
        Some(upload_f32(backend, &vbo.normals))
    };
    let uvs = if vbo.uvs.is_empty() {
        inherit(|b| b.uvs)
    } else {
        Some(upload_f32(backend, &vbo.uvs))
    };
    let colors = if vbo.colors.is_empty() {
        inherit(|b| b.colors)
    } else {
        Some(upload_f32(backend, &vbo.colors))
    };

    let (elements, element_ranges) = if vbo.elements.is_empty() {
        match base {
            Some(b) => (b.elements, b.element_ranges.clone()),
            None => (None, Vec::new()),
        }
    } else {
        (
            Some(upload_u16(backend, &vbo.elements)),
            vbo.element_ranges.clone(),
        )
    };
    let (line_elements, line_ranges) = if vbo.line_elements.is_empty() {
        match base {
            Some(b) => (b.line_elements, b.line_ranges.clone()),
            None => (None, Vec::new()),
        }
    } else {
        (
            Some(upload_u16(backend, &vbo.line_elements)),
            vbo.line_ranges.clone(),
        )
    };

    MeshBuffer {
        points,
        normals,
        uvs,
        colors,
        elements,
        element_ranges,
        line_elements,
        line_ranges,
        segments: vbo.segments.clone(),
        bounds: vbo.bounds,
    }
}

/// Re-upload the requested attribute arrays into an existing buffer with a
/// dynamic-usage hint; the per-frame half of the dynamic update path
pub fn rebuffer_vbo(
    backend: &mut dyn RenderBackend,
    vbo: &CompileVbo,
    buffer: &MeshBuffer,
    options: UpdateOptions,
) {
    let targets = [
        (options.points, buffer.points, &vbo.points),
        (options.normals, buffer.normals, &vbo.normals),
        (options.uvs, buffer.uvs, &vbo.uvs),
        (options.colors, buffer.colors, &vbo.colors),
    ];
    for (requested, id, data) in targets {
        if !requested || data.is_empty() {
            continue;
        }
        match id {
            Some(id) => backend.buffer_data(
                id,
                BufferTarget::Array,
                bytemuck::cast_slice(data),
                BufferUsage::Dynamic,
            ),
            None => warn!("rebuffer_vbo: requested attribute has no buffer"),
        }
    }
}

impl Mesh {
    /// Attach compiled buffer handles to the mesh and seed per-segment
    /// visibility (all visible)
    pub fn bind_buffer(&mut self, buffer: MeshBuffer) {
        self.segment_state.clear();
        for &segment in &buffer.segments {
            self.segment_state.insert(segment, true);
        }
        self.compiled = Some(buffer);
    }

    /// Run the whole pipeline: map -> vbo -> buffer -> bind. Dynamic
    /// meshes also snapshot their point positions and retain the packed
    /// arrays for later in-place updates.
    pub fn compile(&mut self, backend: &mut dyn RenderBackend, tolerance: Option<f64>) {
        let map = self.compile_map(tolerance);
        let vbo = self.compile_vbo(&map, AttributeSelect::default());
        let buffer = buffer_vbo(backend, &vbo, None);
        self.bind_buffer(buffer);
        if self.dynamic {
            self.dynamic_state = Some(DynamicState {
                source_points: self.points.clone(),
                vbo,
            });
        }
    }

    /// Convenience preparation: triangulate, compute smoothed normals
    /// (cached when dynamic), compile, and optionally release the CPU-side
    /// arrays
    pub fn prepare(
        &mut self,
        library: &MaterialLibrary,
        backend: &mut dyn RenderBackend,
        do_clean: bool,
    ) {
        self.triangulate_quads();
        if self.dynamic {
            self.calc_normals_cached(library);
        } else {
            self.calc_normals(library);
        }
        self.compile(backend, None);
        if do_clean {
            self.clean();
        }
    }

    /// Per-frame dynamic update: recompute normals from the adjacency
    /// cache if requested, refill the packed arrays through the dynamic
    /// back-mapping, and re-upload only the requested attributes. A point
    /// update is skipped entirely when positions are unchanged since the
    /// last sync, so an idle frame costs one comparison and no upload.
    ///
    /// Only valid for meshes compiled with the `dynamic` flag; point and
    /// face counts must be unchanged since compile.
    pub fn update(&mut self, backend: &mut dyn RenderBackend, mut options: UpdateOptions) {
        if options.normals {
            self.recalc_normals();
        }
        let Some(mut state) = self.dynamic_state.take() else {
            warn!("update: mesh is not compiled as dynamic");
            return;
        };
        if options.points && self.points == state.source_points {
            options.points = false;
        }
        self.update_vbo(&mut state.vbo, options);
        if let Some(buffer) = &self.compiled {
            rebuffer_vbo(backend, &state.vbo, buffer, options);
        }
        if options.points {
            state.source_points.clone_from(&self.points);
        }
        self.dynamic_state = Some(state);
    }
}
