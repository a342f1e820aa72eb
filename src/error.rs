// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Error types for mesh operations
//!
//! Soft failures (malformed declarative input, repack size mismatches) are
//! logged and skipped rather than returned; hard errors are reserved for
//! structural problems with no well-defined recovery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    /// Catmull-Clark subdivision found an edge with no opposite face. The
    /// edge rule needs both adjacent face points, so the call aborts and
    /// leaves the mesh unmodified. Run `remove_doubles` first if the mesh
    /// was assembled from unwelded parts.
    #[error("subdivision hole at edge ({a}, {b}); run remove_doubles() before subdividing")]
    SubdivisionHole { a: usize, b: usize },

    /// A face references a point index outside the mesh's point array.
    #[error("face {face} references point {point}, but mesh has {point_count} points")]
    PointOutOfRange {
        face: usize,
        point: usize,
        point_count: usize,
    },

    /// A face carries a per-corner attribute array whose length does not
    /// match its point count.
    #[error("face {face} has {attr_len} {attr} entries for {point_count} points")]
    AttributeParity {
        face: usize,
        attr: &'static str,
        attr_len: usize,
        point_count: usize,
    },

    /// A face's material index does not resolve against the mesh's
    /// material list.
    #[error("face {face} references material slot {material}, but mesh has {material_count}")]
    UnresolvedMaterial {
        face: usize,
        material: usize,
        material_count: usize,
    },
}
