//! Vertex attribute data and GPU buffer descriptors

use crate::backend::{BufferDescriptor, BufferTarget, BufferUsageHint, DataType, VertexAttributeLayout};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ATTRIBUTE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`Attribute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(u64);

impl AttributeId {
    fn next() -> Self {
        Self(NEXT_ATTRIBUTE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Typed attribute contents
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AttributeData {
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeData::I8(_) => DataType::I8,
            AttributeData::U8(_) => DataType::U8,
            AttributeData::I16(_) => DataType::I16,
            AttributeData::U16(_) => DataType::U16,
            AttributeData::I32(_) => DataType::I32,
            AttributeData::U32(_) => DataType::U32,
            AttributeData::F32(_) => DataType::F32,
        }
    }

    /// Number of scalar components
    pub fn len(&self) -> usize {
        match self {
            AttributeData::I8(v) => v.len(),
            AttributeData::U8(v) => v.len(),
            AttributeData::I16(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::I32(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::I8(v) => bytemuck::cast_slice(v),
            AttributeData::U8(v) => v,
            AttributeData::I16(v) => bytemuck::cast_slice(v),
            AttributeData::U16(v) => bytemuck::cast_slice(v),
            AttributeData::I32(v) => bytemuck::cast_slice(v),
            AttributeData::U32(v) => bytemuck::cast_slice(v),
            AttributeData::F32(v) => bytemuck::cast_slice(v),
        }
    }
}

macro_rules! impl_attribute_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for AttributeData {
                fn from(data: Vec<$ty>) -> Self {
                    AttributeData::$variant(data)
                }
            }
        )*
    };
}

impl_attribute_data_from!(
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    f32 => F32,
);

/// A typed view over vertex (or index) data plus the hints used to create its
/// GPU buffer.
///
/// An attribute either owns its data, or is a view into a named shared buffer
/// owned by another attribute (interleaved layouts). The owner of a shared
/// buffer carries the data together with [`Attribute::with_buffer_name`].
#[derive(Debug)]
pub struct Attribute {
    id: AttributeId,
    data: Option<AttributeData>,
    data_type: DataType,
    size: u32,
    normalized: bool,
    stride: u64,
    offset: u64,
    target: BufferTarget,
    usage: BufferUsageHint,
    buffer_name: Option<String>,
    updated: bool,
}

impl Attribute {
    /// Per-vertex data with `size` components per vertex
    pub fn new(data: impl Into<AttributeData>, size: u32) -> Self {
        let data = data.into();
        Self {
            id: AttributeId::next(),
            data_type: data.data_type(),
            data: Some(data),
            size,
            normalized: false,
            stride: 0,
            offset: 0,
            target: BufferTarget::Array,
            usage: BufferUsageHint::StaticDraw,
            buffer_name: None,
            updated: false,
        }
    }

    /// Index data for indexed draws
    pub fn indices(data: impl Into<AttributeData>) -> Self {
        Self::new(data, 1).with_target(BufferTarget::ElementArray)
    }

    /// A data-less view reading from the shared buffer called `buffer_name`
    pub fn shared(buffer_name: impl Into<String>, data_type: DataType, size: u32) -> Self {
        Self {
            id: AttributeId::next(),
            data: None,
            data_type,
            size,
            normalized: false,
            stride: 0,
            offset: 0,
            target: BufferTarget::Array,
            usage: BufferUsageHint::StaticDraw,
            buffer_name: Some(buffer_name.into()),
            updated: false,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_target(mut self, target: BufferTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_usage(mut self, usage: BufferUsageHint) -> Self {
        self.usage = usage;
        self
    }

    /// Publish this attribute's data as the shared buffer `name`
    pub fn with_buffer_name(mut self, name: impl Into<String>) -> Self {
        self.buffer_name = Some(name.into());
        self
    }

    pub fn id(&self) -> AttributeId {
        self.id
    }

    pub fn data(&self) -> Option<&AttributeData> {
        self.data.as_ref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }

    pub fn usage(&self) -> BufferUsageHint {
        self.usage
    }

    pub fn buffer_name(&self) -> Option<&str> {
        self.buffer_name.as_deref()
    }

    /// True for views that reuse another attribute's shared buffer
    pub fn is_shared_view(&self) -> bool {
        self.data.is_none() && self.buffer_name.is_some()
    }

    /// Replace the contents and request a re-upload on the next bind
    pub fn set_data(&mut self, data: impl Into<AttributeData>) {
        let data = data.into();
        self.data_type = data.data_type();
        self.data = Some(data);
        self.updated = true;
    }

    /// Mutable access to the contents; call [`Attribute::mark_updated`] after
    /// editing in place.
    pub fn data_mut(&mut self) -> Option<&mut AttributeData> {
        self.data.as_mut()
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub(crate) fn clear_updated(&mut self) {
        self.updated = false;
    }

    pub fn byte_len(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.as_bytes().len() as u64)
    }

    /// Number of vertices (or indices) the data describes
    pub fn element_count(&self) -> u32 {
        match &self.data {
            Some(data) if self.size > 0 => (data.len() / self.size as usize) as u32,
            _ => 0,
        }
    }

    pub fn layout(&self) -> VertexAttributeLayout {
        VertexAttributeLayout {
            data_type: self.data_type,
            size: self.size,
            normalized: self.normalized,
            stride: self.stride,
            offset: self.offset,
        }
    }

    pub(crate) fn buffer_descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            label: self.buffer_name.clone(),
            target: self.target,
            usage: self.usage,
            data_type: self.data_type,
        }
    }
}

impl Clone for Attribute {
    /// Clones get a fresh identity and therefore their own GPU buffer.
    fn clone(&self) -> Self {
        Self {
            id: AttributeId::next(),
            data: self.data.clone(),
            buffer_name: self.buffer_name.clone(),
            ..*self
        }
    }
}
