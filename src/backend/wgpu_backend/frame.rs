//! Per-frame recording state for the wgpu backend

use std::ops::Range;

use crate::backend::types::DrawMode;

/// Uniform values for every draw of a frame, packed at aligned offsets and
/// uploaded in one write when the frame ends.
pub(super) struct UniformArena {
    data: Vec<u8>,
    alignment: usize,
}

impl UniformArena {
    pub fn new(alignment: u32) -> Self {
        Self {
            data: Vec::new(),
            alignment: alignment.max(16) as usize,
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append `bytes` padded or truncated to `slot_size`, returning its offset
    pub fn push(&mut self, bytes: &[u8], slot_size: usize) -> u32 {
        let offset = self.data.len().div_ceil(self.alignment) * self.alignment;
        self.data.resize(offset, 0);
        let take = bytes.len().min(slot_size);
        self.data.extend_from_slice(&bytes[..take]);
        self.data.resize(offset + slot_size, 0);
        offset as u32
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Identifies a cached render pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub program: u64,
    pub topology: wgpu::PrimitiveTopology,
    /// (shader location, format, stride) per vertex buffer slot
    pub vertex: Vec<(u32, wgpu::VertexFormat, u64)>,
    pub depth: bool,
}

/// Where an indexed draw reads its indices from
#[derive(Debug, Clone, Copy)]
pub(super) enum IndexSource {
    /// A buffer created through the backend
    Buffer(u64, wgpu::IndexFormat),
    /// The frame's expanded-index arena (always `u32`)
    Expanded,
}

/// One draw call captured between `begin_frame` and `end_frame`
#[derive(Debug, Clone)]
pub(super) struct RecordedDraw {
    pub pipeline: u64,
    pub program: u64,
    pub uniform_offsets: Vec<u32>,
    /// (buffer id, byte offset) per vertex buffer slot
    pub vertex_buffers: Vec<(u64, u64)>,
    pub index: Option<IndexSource>,
    pub range: Range<u32>,
}

/// Draw mode after topology expansion and whether indices had to be rewritten
pub(super) fn native_mode(mode: DrawMode) -> (DrawMode, bool) {
    match crate::backend::topology::expanded_mode(mode) {
        Some(expanded) => (expanded, true),
        None => (mode, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_offsets_are_aligned() {
        let mut arena = UniformArena::new(256);
        assert_eq!(arena.push(&[1u8; 64], 64), 0);
        assert_eq!(arena.push(&[2u8; 16], 16), 256);
        assert_eq!(arena.bytes().len(), 272);
    }

    #[test]
    fn test_arena_pads_and_truncates_to_slot() {
        let mut arena = UniformArena::new(256);
        arena.push(&[7u8; 4], 16);
        assert_eq!(&arena.bytes()[..16], &[7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        arena.clear();
        arena.push(&[9u8; 32], 16);
        assert_eq!(arena.bytes().len(), 16);
    }

    #[test]
    fn test_native_mode() {
        assert_eq!(native_mode(DrawMode::TriangleFan), (DrawMode::Triangles, true));
        assert_eq!(native_mode(DrawMode::LineStrip), (DrawMode::LineStrip, false));
    }
}
