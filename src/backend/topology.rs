//! Index expansion for topologies the GPU cannot draw natively
//!
//! Line loops become line lists and triangle fans become triangle lists.

use crate::backend::types::DrawMode;

/// Topology the expanded indices are drawn with, `None` when `mode` is native
pub fn expanded_mode(mode: DrawMode) -> Option<DrawMode> {
    match mode {
        DrawMode::LineLoop => Some(DrawMode::Lines),
        DrawMode::TriangleFan => Some(DrawMode::Triangles),
        _ => None,
    }
}

/// Expand a line loop over `indices` into a line list.
pub fn expand_line_loop(indices: &[u32]) -> Vec<u32> {
    if indices.len() < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(indices.len() * 2);
    for pair in indices.windows(2) {
        out.extend_from_slice(pair);
    }
    out.push(indices[indices.len() - 1]);
    out.push(indices[0]);
    out
}

/// Expand a triangle fan over `indices` into a triangle list.
pub fn expand_triangle_fan(indices: &[u32]) -> Vec<u32> {
    if indices.len() < 3 {
        return Vec::new();
    }
    let hub = indices[0];
    let mut out = Vec::with_capacity((indices.len() - 2) * 3);
    for pair in indices[1..].windows(2) {
        out.extend_from_slice(&[hub, pair[0], pair[1]]);
    }
    out
}

/// Expand `indices` for `mode`, or `None` if the mode needs no expansion.
pub fn expand(mode: DrawMode, indices: &[u32]) -> Option<Vec<u32>> {
    match mode {
        DrawMode::LineLoop => Some(expand_line_loop(indices)),
        DrawMode::TriangleFan => Some(expand_triangle_fan(indices)),
        _ => None,
    }
}
