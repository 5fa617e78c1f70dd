//! Conversions from backend types to wgpu types

use crate::backend::traits::{BackendError, BackendResult};
use crate::backend::types::*;

pub(super) fn vertex_format(layout: &VertexAttributeLayout) -> BackendResult<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;

    let format = match (layout.data_type, layout.size, layout.normalized) {
        (DataType::F32, 1, _) => F::Float32,
        (DataType::F32, 2, _) => F::Float32x2,
        (DataType::F32, 3, _) => F::Float32x3,
        (DataType::F32, 4, _) => F::Float32x4,
        (DataType::I32, 1, false) => F::Sint32,
        (DataType::I32, 2, false) => F::Sint32x2,
        (DataType::I32, 3, false) => F::Sint32x3,
        (DataType::I32, 4, false) => F::Sint32x4,
        (DataType::U32, 1, false) => F::Uint32,
        (DataType::U32, 2, false) => F::Uint32x2,
        (DataType::U32, 3, false) => F::Uint32x3,
        (DataType::U32, 4, false) => F::Uint32x4,
        (DataType::I16, 2, false) => F::Sint16x2,
        (DataType::I16, 4, false) => F::Sint16x4,
        (DataType::I16, 2, true) => F::Snorm16x2,
        (DataType::I16, 4, true) => F::Snorm16x4,
        (DataType::U16, 2, false) => F::Uint16x2,
        (DataType::U16, 4, false) => F::Uint16x4,
        (DataType::U16, 2, true) => F::Unorm16x2,
        (DataType::U16, 4, true) => F::Unorm16x4,
        (DataType::I8, 2, false) => F::Sint8x2,
        (DataType::I8, 4, false) => F::Sint8x4,
        (DataType::I8, 2, true) => F::Snorm8x2,
        (DataType::I8, 4, true) => F::Snorm8x4,
        (DataType::U8, 2, false) => F::Uint8x2,
        (DataType::U8, 4, false) => F::Uint8x4,
        (DataType::U8, 2, true) => F::Unorm8x2,
        (DataType::U8, 4, true) => F::Unorm8x4,
        (data_type, size, normalized) => {
            return Err(BackendError::Unsupported(format!(
                "vertex format {:?}x{} (normalized: {})",
                data_type, size, normalized
            )))
        }
    };
    Ok(format)
}

/// Topology for a draw mode the GPU supports natively
pub(super) fn topology(mode: DrawMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawMode::Points => wgpu::PrimitiveTopology::PointList,
        DrawMode::Lines | DrawMode::LineLoop => wgpu::PrimitiveTopology::LineList,
        DrawMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        DrawMode::Triangles | DrawMode::TriangleFan => wgpu::PrimitiveTopology::TriangleList,
        DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub(super) fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

pub(super) fn buffer_usages(target: BufferTarget) -> wgpu::BufferUsages {
    let usage = match target {
        BufferTarget::Array => wgpu::BufferUsages::VERTEX,
        BufferTarget::ElementArray => wgpu::BufferUsages::INDEX,
        BufferTarget::Uniform => wgpu::BufferUsages::UNIFORM,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

pub(super) fn clear_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: color[0] as f64,
        g: color[1] as f64,
        b: color[2] as f64,
        a: color[3] as f64,
    }
}

/// Clamp to device limits while maintaining aspect ratio
pub(super) fn clamp_surface_size(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > max_size || height > max_size {
        let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        (new_width, new_height)
    } else {
        (width.max(1), height.max(1))
    }
}

pub(super) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Read `count` indices starting at index `first` out of raw index data
pub(super) fn decode_indices(bytes: &[u8], format: IndexFormat, first: u32, count: u32) -> Vec<u32> {
    let size = format.byte_size() as usize;
    let start = (first as usize * size).min(bytes.len());
    let end = (start + count as usize * size).min(bytes.len());
    let bytes = &bytes[start..end];
    match format {
        IndexFormat::Uint16 => bytes
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]) as u32)
            .collect(),
        IndexFormat::Uint32 => bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(data_type: DataType, size: u32, normalized: bool) -> VertexAttributeLayout {
        VertexAttributeLayout {
            data_type,
            size,
            normalized,
            stride: 0,
            offset: 0,
        }
    }

    #[test]
    fn test_vertex_formats() {
        assert_eq!(
            vertex_format(&layout(DataType::F32, 3, false)).unwrap(),
            wgpu::VertexFormat::Float32x3
        );
        assert_eq!(
            vertex_format(&layout(DataType::U8, 4, true)).unwrap(),
            wgpu::VertexFormat::Unorm8x4
        );
        assert!(matches!(
            vertex_format(&layout(DataType::I16, 3, false)),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_clamp_keeps_aspect_ratio() {
        assert_eq!(clamp_surface_size(800, 600, 8192), (800, 600));
        assert_eq!(clamp_surface_size(16384, 8192, 8192), (8192, 4096));
        assert_eq!(clamp_surface_size(0, 0, 8192), (1, 1));
    }

    #[test]
    fn test_decode_indices_honours_first_and_count() {
        let data: Vec<u16> = vec![0, 1, 2, 3, 4];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        assert_eq!(decode_indices(bytes, IndexFormat::Uint16, 1, 3), vec![1, 2, 3]);
        assert_eq!(decode_indices(bytes, IndexFormat::Uint16, 4, 10), vec![4]);
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(512, 256), 512);
    }
}
