// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Meshframe Team.

//! Rendering-backend interface
//!
//! The GPU lives behind [`RenderBackend`]: the engine only creates buffers
//! and uploads bytes. Handle lifetime is the backend's problem; the engine
//! returns and replaces handles but never frees them.

use ahash::AHashMap;

use super::vbo::ElementRange;
use crate::geometry::bbox::BoundingBox;

/// Opaque buffer handle issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Element / line-element indices
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Uploaded once at preparation time
    Static,
    /// Re-uploaded per frame by the dynamic update path
    Dynamic,
}

/// Buffer creation/upload surface of the renderer
pub trait RenderBackend {
    fn create_buffer(&mut self) -> BufferId;
    fn buffer_data(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8], usage: BufferUsage);
}

/// Compiled, GPU-resident mesh: attribute and index buffer handles plus
/// the per-(material, segment) draw ranges the renderer walks each frame.
#[derive(Debug, Clone)]
pub struct MeshBuffer {
    pub points: Option<BufferId>,
    pub normals: Option<BufferId>,
    pub uvs: Option<BufferId>,
    pub colors: Option<BufferId>,
    pub elements: Option<BufferId>,
    pub element_ranges: Vec<ElementRange>,
    pub line_elements: Option<BufferId>,
    pub line_ranges: Vec<ElementRange>,
    pub segments: Vec<i32>,
    pub bounds: Option<BoundingBox>,
}

/// One recorded upload, kept by [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub target: BufferTarget,
    pub data: Vec<u8>,
    pub usage: BufferUsage,
}

/// In-memory backend that records uploads byte-for-byte; used by the test
/// suite and by headless tooling that wants compiled output without a GPU.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    next_id: u64,
    pub buffers: AHashMap<BufferId, UploadRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|r| r.data.as_slice())
    }
}

impl RenderBackend for MemoryBackend {
    fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        id
    }

    fn buffer_data(&mut self, buffer: BufferId, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.buffers.insert(
            buffer,
            UploadRecord {
                target,
                data: data.to_vec(),
                usage,
            },
        );
    }
}
