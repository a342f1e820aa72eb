// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Meshframe Geometry Engine
//!
//! A polygonal mesh engine for real-time rendering pipelines. Provides
//! topology construction, smoothing-group normal calculation, topology
//! transforms (triangulation, welding, edge extraction), Catmull-Clark
//! subdivision, and compilation of meshes into deduplicated, partitioned
//! vertex buffers behind a pluggable rendering backend.

pub mod compile;
pub mod error;
pub mod geometry;
pub mod utils;

pub use compile::{
    AttributeSelect, BufferId, CompileMap, CompileVbo, MemoryBackend, MeshBuffer, RenderBackend,
    UpdateOptions,
};
pub use error::MeshError;
pub use geometry::{
    BoundingBox, Face, Material, MaterialHandle, MaterialLibrary, Mesh, MeshBuilder, MeshPart,
    PrimitiveRegistry,
};

use anyhow::Result;

/// Prepare a mesh for rendering in one call: triangulate, smooth normals,
/// compile, and bind through the backend.
pub fn prepare(
    mesh: &mut Mesh,
    library: &MaterialLibrary,
    backend: &mut dyn RenderBackend,
) -> Result<()> {
    mesh.validate()?;
    mesh.prepare(library, backend, false);
    Ok(())
}
