//! Uniform values bound to program uniform slots

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Shader-side type of a uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformType {
    /// Number of scalar components in one value of this type
    pub fn components(&self) -> usize {
        match self {
            UniformType::Float | UniformType::Int => 1,
            UniformType::Vec2 | UniformType::IVec2 => 2,
            UniformType::Vec3 | UniformType::IVec3 => 3,
            UniformType::Vec4 | UniformType::IVec4 | UniformType::Mat2 => 4,
            UniformType::Mat3 => 9,
            UniformType::Mat4 => 16,
        }
    }

    /// Column/row count for square matrix types
    pub fn matrix_order(&self) -> Option<usize> {
        match self {
            UniformType::Mat2 => Some(2),
            UniformType::Mat3 => Some(3),
            UniformType::Mat4 => Some(4),
            _ => None,
        }
    }
}

/// Raw uniform storage
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

impl UniformData {
    pub fn len(&self) -> usize {
        match self {
            UniformData::Float(v) => v.len(),
            UniformData::Int(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A typed uniform value.
///
/// Matrices are stored column-major; set `transpose` when the source data is
/// row-major. `src_offset`/`src_length` select the scalar range that is
/// uploaded, allowing one array to feed a partial upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    data: UniformData,
    ty: UniformType,
    transpose: bool,
    src_offset: usize,
    src_length: Option<usize>,
}

impl Uniform {
    pub fn floats(ty: UniformType, data: Vec<f32>) -> Self {
        Self {
            data: UniformData::Float(data),
            ty,
            transpose: false,
            src_offset: 0,
            src_length: None,
        }
    }

    pub fn ints(ty: UniformType, data: Vec<i32>) -> Self {
        Self {
            data: UniformData::Int(data),
            ty,
            transpose: false,
            src_offset: 0,
            src_length: None,
        }
    }

    pub fn float(value: f32) -> Self {
        Self::floats(UniformType::Float, vec![value])
    }

    pub fn int(value: i32) -> Self {
        Self::ints(UniformType::Int, vec![value])
    }

    pub fn vec2(value: Vec2) -> Self {
        Self::floats(UniformType::Vec2, value.to_array().to_vec())
    }

    pub fn vec3(value: Vec3) -> Self {
        Self::floats(UniformType::Vec3, value.to_array().to_vec())
    }

    pub fn vec4(value: Vec4) -> Self {
        Self::floats(UniformType::Vec4, value.to_array().to_vec())
    }

    pub fn mat2(value: Mat2) -> Self {
        Self::floats(UniformType::Mat2, value.to_cols_array().to_vec())
    }

    pub fn mat3(value: Mat3) -> Self {
        Self::floats(UniformType::Mat3, value.to_cols_array().to_vec())
    }

    pub fn mat4(value: Mat4) -> Self {
        Self::floats(UniformType::Mat4, value.to_cols_array().to_vec())
    }

    /// Mark the source data as row-major (matrices only)
    pub fn transposed(mut self) -> Self {
        self.transpose = self.ty.matrix_order().is_some();
        self
    }

    /// Upload only `length` scalars starting at `offset`
    pub fn with_range(mut self, offset: usize, length: usize) -> Self {
        self.src_offset = offset;
        self.src_length = Some(length);
        self
    }

    pub fn data(&self) -> &UniformData {
        &self.data
    }

    pub fn ty(&self) -> UniformType {
        self.ty
    }

    pub fn transpose(&self) -> bool {
        self.transpose
    }

    pub fn src_offset(&self) -> usize {
        self.src_offset
    }

    pub fn src_length(&self) -> Option<usize> {
        self.src_length
    }

    /// Replace the stored data, keeping type, flags and range
    pub fn set_data(&mut self, data: UniformData) {
        self.data = data;
    }

    pub fn set_mat4(&mut self, value: Mat4) {
        self.ty = UniformType::Mat4;
        self.data = UniformData::Float(value.to_cols_array().to_vec());
    }

    pub fn set_vec3(&mut self, value: Vec3) {
        self.ty = UniformType::Vec3;
        self.data = UniformData::Float(value.to_array().to_vec());
    }

    pub fn set_float(&mut self, value: f32) {
        self.ty = UniformType::Float;
        self.data = UniformData::Float(vec![value]);
    }

    fn selected_range(&self) -> std::ops::Range<usize> {
        let len = self.data.len();
        let start = self.src_offset.min(len);
        let end = match self.src_length {
            Some(length) => start.saturating_add(length).min(len),
            None => len,
        };
        start..end
    }

    /// Scalars selected by the source range, with transposition applied
    pub fn selected_floats(&self) -> Vec<f32> {
        let range = self.selected_range();
        let values: Vec<f32> = match &self.data {
            UniformData::Float(v) => v[range].to_vec(),
            UniformData::Int(v) => v[range].iter().map(|x| *x as f32).collect(),
        };
        match self.ty.matrix_order() {
            Some(order) if self.transpose => transpose_matrices(&values, order),
            _ => values,
        }
    }

    /// Bytes uploaded to the GPU.
    ///
    /// `mat3` columns are padded to 16 bytes to match the WGSL layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        if let UniformData::Int(v) = &self.data {
            return bytemuck::cast_slice(&v[self.selected_range()]).to_vec();
        }

        let values = self.selected_floats();
        if self.ty == UniformType::Mat3 {
            let mut padded = Vec::with_capacity(values.len() / 3 * 4);
            for column in values.chunks(3) {
                padded.extend_from_slice(column);
                padded.resize(padded.len() + 4 - column.len(), 0.0);
            }
            return bytemuck::cast_slice(&padded).to_vec();
        }
        bytemuck::cast_slice(&values).to_vec()
    }

    /// Interpret the uploaded value as a column-major 4x4 matrix
    pub fn as_mat4(&self) -> Option<Mat4> {
        let values = self.selected_floats();
        (self.ty == UniformType::Mat4 && values.len() >= 16)
            .then(|| Mat4::from_cols_slice(&values[..16]))
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        let values = self.selected_floats();
        (values.len() >= 3).then(|| Vec3::from_slice(&values[..3]))
    }
}

fn transpose_matrices(values: &[f32], order: usize) -> Vec<f32> {
    let stride = order * order;
    let mut out = values.to_vec();
    for (matrix, source) in out.chunks_mut(stride).zip(values.chunks(stride)) {
        if source.len() < stride {
            break;
        }
        for row in 0..order {
            for col in 0..order {
                matrix[col * order + row] = source[row * order + col];
            }
        }
    }
    out
}

impl From<f32> for Uniform {
    fn from(value: f32) -> Self {
        Self::float(value)
    }
}

impl From<i32> for Uniform {
    fn from(value: i32) -> Self {
        Self::int(value)
    }
}

impl From<Vec2> for Uniform {
    fn from(value: Vec2) -> Self {
        Self::vec2(value)
    }
}

impl From<Vec3> for Uniform {
    fn from(value: Vec3) -> Self {
        Self::vec3(value)
    }
}

impl From<Vec4> for Uniform {
    fn from(value: Vec4) -> Self {
        Self::vec4(value)
    }
}

impl From<Mat3> for Uniform {
    fn from(value: Mat3) -> Self {
        Self::mat3(value)
    }
}

impl From<Mat4> for Uniform {
    fn from(value: Mat4) -> Self {
        Self::mat4(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_flag_converts_row_major_source() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let row_major = m.transpose().to_cols_array().to_vec();
        let uniform = Uniform::floats(UniformType::Mat4, row_major).transposed();

        assert!(uniform.transpose());
        assert_eq!(uniform.as_mat4(), Some(m));
    }

    #[test]
    fn test_transpose_ignored_for_vectors() {
        let uniform = Uniform::vec3(Vec3::X).transposed();
        assert!(!uniform.transpose());
    }

    #[test]
    fn test_sub_range_selects_partial_upload() {
        let uniform = Uniform::floats(UniformType::Vec2, vec![0.0, 1.0, 2.0, 3.0]).with_range(1, 2);
        assert_eq!(uniform.selected_floats(), vec![1.0, 2.0]);
        assert_eq!(uniform.to_bytes().len(), 8);

        let clamped = Uniform::floats(UniformType::Vec2, vec![0.0, 1.0]).with_range(1, 10);
        assert_eq!(clamped.selected_floats(), vec![1.0]);
    }

    #[test]
    fn test_unbounded_length_selects_to_the_end() {
        let uniform =
            Uniform::floats(UniformType::Float, vec![0.0, 1.0, 2.0]).with_range(1, usize::MAX);
        assert_eq!(uniform.selected_floats(), vec![1.0, 2.0]);
        assert_eq!(uniform.to_bytes().len(), 8);
    }

    #[test]
    fn test_mat3_columns_are_padded() {
        let bytes = Uniform::mat3(Mat3::IDENTITY).to_bytes();
        assert_eq!(bytes.len(), 48);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(&floats[..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
    }
}
