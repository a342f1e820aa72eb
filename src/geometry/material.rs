// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Material arena and handles
//!
//! Materials are arena-allocated entities referenced by a stable handle.
//! Meshes and merge operations deduplicate by handle equality, never by
//! structural comparison: two materials with identical parameters are
//! still distinct surfaces.

use serde::{Deserialize, Serialize};

/// Default smoothing angle threshold in degrees
pub const DEFAULT_MAX_SMOOTH: f64 = 60.0;

/// Stable handle into a [`MaterialLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialHandle(pub usize);

/// Surface parameters consumed by the mesh engine.
///
/// The full material model (textures, shading parameters) lives with the
/// renderer; the mesh engine only reads the smoothing threshold and the
/// color-map flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: Option<String>,
    /// Smoothing angle threshold in degrees. Adjacent face normals within
    /// this angle are blended into shared corner normals; `0.0` disables
    /// smoothing for faces carrying this material.
    pub max_smooth: f64,
    pub color_map: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            max_smooth: DEFAULT_MAX_SMOOTH,
            color_map: false,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_max_smooth(mut self, degrees: f64) -> Self {
        self.max_smooth = degrees;
        self
    }

    pub fn with_color_map(mut self, color_map: bool) -> Self {
        self.color_map = color_map;
        self
    }
}

/// Arena of materials shared across meshes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a material and return its stable handle
    pub fn add(&mut self, material: Material) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len());
        self.materials.push(material);
        handle
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle.0)
    }

    /// Look up a material handle by name (first match)
    pub fn find_by_name(&self, name: &str) -> Option<MaterialHandle> {
        self.materials
            .iter()
            .position(|m| m.name.as_deref() == Some(name))
            .map(MaterialHandle)
    }

    /// Smoothing threshold for a handle, falling back to the default when
    /// the handle does not resolve
    pub fn max_smooth(&self, handle: MaterialHandle) -> f64 {
        self.get(handle).map_or(DEFAULT_MAX_SMOOTH, |m| m.max_smooth)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
