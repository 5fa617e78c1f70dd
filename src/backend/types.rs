//! Common types shared between backends

/// Element data type of vertex, index and uniform data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl DataType {
    pub fn byte_size(&self) -> u64 {
        match self {
            DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
        }
    }
}

/// Binding point a buffer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Per-vertex attribute data
    Array,
    /// Index data for indexed draws
    ElementArray,
    /// Uniform block data
    Uniform,
}

/// How often the contents of a buffer are expected to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsageHint {
    /// Uploaded once, drawn many times
    #[default]
    StaticDraw,
    /// Modified repeatedly, drawn many times
    DynamicDraw,
    /// Modified once, drawn a few times
    StreamDraw,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub target: BufferTarget,
    pub usage: BufferUsageHint,
    pub data_type: DataType,
}

/// Primitive topology used to interpret vertices during a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn from_data_type(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::U16 => Some(IndexFormat::Uint16),
            DataType::U32 => Some(IndexFormat::Uint32),
            _ => None,
        }
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// How a vertex attribute reads from its bound buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeLayout {
    pub data_type: DataType,
    /// Components per vertex (1-4)
    pub size: u32,
    pub normalized: bool,
    /// Bytes between consecutive vertices; 0 means tightly packed
    pub stride: u64,
    /// Byte offset of the first component
    pub offset: u64,
}

impl VertexAttributeLayout {
    /// Stride with the tightly-packed default resolved
    pub fn effective_stride(&self) -> u64 {
        if self.stride == 0 {
            self.data_type.byte_size() * self.size as u64
        } else {
            self.stride
        }
    }
}

/// Per-frame clear state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    pub color: [f32; 4],
    /// Depth clear value, `None` when depth testing is disabled
    pub depth: Option<f32>,
}

/// Program (vertex + fragment shader) descriptor
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: String,
    pub vertex_source: String,
    pub fragment_source: String,
}

/// Frame information returned when beginning a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
}
