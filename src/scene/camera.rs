//! Camera system

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::resources::Uniform;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        /// `None` for an infinite far plane
        far: Option<f32>,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: Some(1000.0),
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: Option<f32>) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far: Some(far),
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far: None,
            } => Mat4::perspective_infinite_rh(fov_y, aspect, near),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> Option<f32> {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => Some(*far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera for viewing the scene.
///
/// Setters recompute the cached matrices and raise the dirty flag; the
/// renderer clears the flag once every node has seen the change.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    projection: Projection,
    view: Mat4,
    projection_matrix: Mat4,
    view_projection: Mat4,
    uniforms: HashMap<String, Uniform>,
    dirty: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self::with_projection(position, target, Projection::default())
    }

    pub fn with_projection(position: Vec3, target: Vec3, projection: Projection) -> Self {
        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            projection,
            view: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            uniforms: HashMap::new(),
            dirty: true,
        };
        camera.recompute();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.recompute();
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        self.recompute();
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
        self.recompute();
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.recompute();
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.projection.set_aspect(width / height);
            self.recompute();
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    /// Projection times view
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.view_projection
    }

    /// Get the forward direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Get the right direction
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or_zero()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called once the frame walk has consumed the change
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Extra value exposed through the camera uniform source
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<Uniform>) {
        self.uniforms.insert(name.into(), value.into());
    }

    /// Resolve a camera-sourced uniform.
    ///
    /// Built-ins: `view_matrix`, `projection_matrix`, `view_projection_matrix`
    /// and `camera_position`.
    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        match name {
            "view_matrix" => Some(Uniform::mat4(self.view)),
            "projection_matrix" => Some(Uniform::mat4(self.projection_matrix)),
            "view_projection_matrix" => Some(Uniform::mat4(self.view_projection)),
            "camera_position" => Some(Uniform::vec3(self.position)),
            _ => self.uniforms.get(name).cloned(),
        }
    }

    fn recompute(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.target, self.up);
        self.projection_matrix = self.projection.matrix();
        self.view_projection = self.projection_matrix * self.view;
        self.dirty = true;
    }
}
