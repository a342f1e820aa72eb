// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Geometry module - mesh topology, materials, normals, and transforms

pub mod bbox;
pub mod face;
pub mod material;
pub mod mesh;
pub mod normals;
pub mod subdivide;
pub mod transforms;

pub use bbox::BoundingBox;
pub use face::Face;
pub use material::{Material, MaterialHandle, MaterialLibrary, DEFAULT_MAX_SMOOTH};
pub use mesh::{Mesh, MeshBuilder, MeshPart, PrimitiveRegistry, PrimitiveSpec, UvMapper, UvSource};
pub use normals::NormalMap;
pub use transforms::{Edge, DEFAULT_WELD_TOLERANCE};
