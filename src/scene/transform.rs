//! Node transforms: local TRS plus the composed matrices derived from it

use glam::{Mat4, Quat, Vec3};

use crate::scene::SceneError;

/// When a setter recomputes the local matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Recompute the local matrix right away
    Immediate,
    /// Only mark dirty; the next frame-state walk recomputes it
    #[default]
    Deferred,
}

/// Relative tolerance used when checking that a matrix is a TRS composition
const DECOMPOSE_EPSILON: f32 = 1e-4;

/// Local translation/rotation/scale and the matrices composed from it.
///
/// The local matrix is always `T * R * S`. The world, normal and MVP
/// matrices are written by the frame-state walk.
#[derive(Debug, Clone)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    local_matrix: Mat4,
    world_matrix: Mat4,
    normal_matrix: Mat4,
    mvp_matrix: Mat4,
    /// Local matrix lags behind T/R/S
    local_stale: bool,
    /// Composed matrices must be recomputed
    dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            mvp_matrix: Mat4::IDENTITY,
            local_stale: false,
            dirty: true,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_translation(translation: Vec3) -> Self {
        let mut transform = Self::default();
        transform.set_translation(translation, UpdateMode::Immediate);
        transform
    }

    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let mut transform = Self {
            translation,
            rotation,
            scale,
            ..Default::default()
        };
        transform.recompute_local();
        transform
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local model matrix as of the last recompute
    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    /// Parent's world matrix times the local matrix
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    /// Inverse-transpose of the world matrix
    pub fn normal_matrix(&self) -> Mat4 {
        self.normal_matrix
    }

    /// Camera view-projection times the world matrix
    pub fn mvp_matrix(&self) -> Mat4 {
        self.mvp_matrix
    }

    /// Whether the composed matrices are stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the next frame-state walk to recompute this node
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn set_translation(&mut self, translation: Vec3, mode: UpdateMode) {
        self.translation = translation;
        self.changed(mode);
    }

    pub fn set_rotation(&mut self, rotation: Quat, mode: UpdateMode) {
        self.rotation = rotation.normalize();
        self.changed(mode);
    }

    pub fn set_scale(&mut self, scale: Vec3, mode: UpdateMode) {
        self.scale = scale;
        self.changed(mode);
    }

    /// Move by `offset` in parent space
    pub fn translate(&mut self, offset: Vec3, mode: UpdateMode) {
        self.set_translation(self.translation + offset, mode);
    }

    /// Apply `delta` on top of the current rotation
    pub fn rotate(&mut self, delta: Quat, mode: UpdateMode) {
        self.set_rotation(delta * self.rotation, mode);
    }

    /// Rotate around an axis
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32, mode: UpdateMode) {
        self.rotate(Quat::from_axis_angle(axis.normalize(), angle), mode);
    }

    /// Set the local matrix directly and decompose it back into T/R/S.
    ///
    /// Matrices that are not a translate-rotate-scale composition (shear,
    /// projection, zero scale) are rejected and leave the transform untouched.
    pub fn set_model_matrix(&mut self, matrix: Mat4) -> Result<(), SceneError> {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let recomposed = Mat4::from_scale_rotation_translation(scale, rotation, translation);

        let magnitude = matrix
            .to_cols_array()
            .iter()
            .fold(1.0f32, |max, v| max.max(v.abs()));
        if !recomposed.is_finite() || !recomposed.abs_diff_eq(matrix, DECOMPOSE_EPSILON * magnitude) {
            return Err(SceneError::NotDecomposable);
        }

        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.local_matrix = matrix;
        self.local_stale = false;
        self.dirty = true;
        Ok(())
    }

    /// Forward direction (local -Z in parent space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Right direction (local +X in parent space)
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Up direction (local +Y in parent space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    fn changed(&mut self, mode: UpdateMode) {
        self.dirty = true;
        match mode {
            UpdateMode::Immediate => self.recompute_local(),
            UpdateMode::Deferred => self.local_stale = true,
        }
    }

    fn recompute_local(&mut self) {
        self.local_matrix =
            Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
        self.local_stale = false;
    }

    /// Recompute the composed matrices from the parent's world matrix
    pub(crate) fn update_composed(&mut self, parent_world: Mat4, view_projection: Mat4) {
        if self.local_stale {
            self.recompute_local();
        }
        self.world_matrix = parent_world * self.local_matrix;

        // Only an exactly singular matrix falls back to identity
        let inverse = self.world_matrix.inverse();
        self.normal_matrix = if self.world_matrix.determinant() != 0.0 && inverse.is_finite() {
            inverse.transpose()
        } else {
            log::trace!("Singular world matrix, normal matrix falls back to identity");
            Mat4::IDENTITY
        };

        self.mvp_matrix = view_projection * self.world_matrix;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_deferred_setter_keeps_old_local_matrix() {
        let mut transform = Transform::new();
        transform.set_translation(Vec3::X, UpdateMode::Deferred);
        assert_eq!(transform.local_matrix(), Mat4::IDENTITY);
        assert!(transform.is_dirty());

        transform.update_composed(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(transform.local_matrix(), Mat4::from_translation(Vec3::X));
        assert!(!transform.is_dirty());
    }

    #[test]
    fn test_immediate_setter_uses_trs_order() {
        let mut transform = Transform::new();
        transform.set_scale(Vec3::splat(2.0), UpdateMode::Immediate);
        transform.set_rotation(Quat::from_rotation_z(FRAC_PI_2), UpdateMode::Immediate);
        transform.set_translation(Vec3::new(1.0, 0.0, 0.0), UpdateMode::Immediate);

        let expected = Mat4::from_translation(Vec3::X)
            * Mat4::from_quat(Quat::from_rotation_z(FRAC_PI_2))
            * Mat4::from_scale(Vec3::splat(2.0));
        assert!(transform.local_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_set_model_matrix_decomposes() {
        let mut transform = Transform::new();
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(4.0, 5.0, 6.0),
        );
        transform.set_model_matrix(matrix).unwrap();

        assert!(transform.translation().abs_diff_eq(Vec3::new(4.0, 5.0, 6.0), 1e-5));
        assert!(transform.scale().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));

        transform.translate(Vec3::X, UpdateMode::Immediate);
        assert!(transform
            .local_matrix()
            .abs_diff_eq(Mat4::from_translation(Vec3::X) * matrix, 1e-4));
    }

    #[test]
    fn test_set_model_matrix_rejects_shear() {
        let mut transform = Transform::new();
        let mut shear = Mat4::IDENTITY;
        shear.y_axis.x = 0.5;

        assert_eq!(transform.set_model_matrix(shear), Err(SceneError::NotDecomposable));
        assert_eq!(transform.local_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_singular_world_matrix_gives_identity_normal_matrix() {
        let mut transform = Transform::new();
        transform.set_scale(Vec3::new(1.0, 0.0, 1.0), UpdateMode::Immediate);
        transform.update_composed(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(transform.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_direction_vectors_follow_rotation() {
        let mut transform = Transform::new();
        assert_eq!(transform.forward(), -Vec3::Z);

        transform.set_rotation(Quat::from_rotation_y(FRAC_PI_2), UpdateMode::Deferred);
        assert!(transform.forward().abs_diff_eq(-Vec3::X, 1e-6));
        assert!(transform.right().abs_diff_eq(-Vec3::Z, 1e-6));
        assert!(transform.up().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_tiny_scale_keeps_rotation_in_normal_matrix() {
        let mut transform = Transform::new();
        transform.set_scale(Vec3::splat(0.001), UpdateMode::Immediate);
        transform.set_rotation(Quat::from_rotation_y(FRAC_PI_2), UpdateMode::Immediate);
        transform.update_composed(Mat4::IDENTITY, Mat4::IDENTITY);

        let expected = transform.world_matrix().inverse().transpose();
        assert!(transform.normal_matrix().abs_diff_eq(expected, 1e-2));

        let normal = transform.normal_matrix().transform_vector3(Vec3::X).normalize();
        assert!(normal.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }
}
