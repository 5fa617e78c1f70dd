//! Ready-made materials

use crate::backend::DrawMode;
use crate::resources::material::{
    AttributeBinding, DrawContext, Material, MaterialState, UniformBinding,
};
use crate::resources::Uniform;
use glam::{Vec3, Vec4};

/// A material described entirely by data.
///
/// Useful for one-off effects that need no hooks:
///
/// ```ignore
/// let material = ShaderMaterial::new("outline", VERTEX, FRAGMENT)
///     .with_attribute(AttributeBinding::entity("position"))
///     .with_uniform(UniformBinding::entity("mvp_matrix"))
///     .with_draw_mode(DrawMode::LineLoop);
/// ```
#[derive(Debug, Clone)]
pub struct ShaderMaterial {
    name: String,
    vertex_source: String,
    fragment_source: String,
    attributes: Vec<AttributeBinding>,
    uniforms: Vec<UniformBinding>,
    draw_mode: Option<DrawMode>,
    state: MaterialState,
}

impl ShaderMaterial {
    pub fn new(
        name: impl Into<String>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            attributes: Vec::new(),
            uniforms: Vec::new(),
            draw_mode: None,
            state: MaterialState::new(),
        }
    }

    pub fn with_attribute(mut self, binding: AttributeBinding) -> Self {
        self.attributes.push(binding);
        self
    }

    pub fn with_uniform(mut self, binding: UniformBinding) -> Self {
        self.uniforms.push(binding);
        self
    }

    pub fn with_draw_mode(mut self, mode: DrawMode) -> Self {
        self.draw_mode = Some(mode);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Uniform>) -> Self {
        self.state.set_uniform(name, value);
        self
    }
}

impl Material for ShaderMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn vertex_shader_source(&self) -> &str {
        &self.vertex_source
    }

    fn fragment_shader_source(&self) -> &str {
        &self.fragment_source
    }

    fn attribute_bindings(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    fn uniform_bindings(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    fn draw_mode(&self) -> Option<DrawMode> {
        self.draw_mode
    }

    fn state(&self) -> &MaterialState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MaterialState {
        &mut self.state
    }
}

const COLOR_VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> mvp_matrix: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return mvp_matrix * vec4<f32>(position, 1.0);
}
"#;

const COLOR_FRAGMENT: &str = r#"
@group(0) @binding(1) var<uniform> color: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return color;
}
"#;

/// Flat, unlit color
#[derive(Debug, Clone)]
pub struct ColorMaterial {
    attributes: Vec<AttributeBinding>,
    uniforms: Vec<UniformBinding>,
    state: MaterialState,
}

impl ColorMaterial {
    pub const NAME: &'static str = "color";

    pub fn new(color: Vec4) -> Self {
        let mut state = MaterialState::new();
        state.set_uniform("color", color);
        Self {
            attributes: vec![AttributeBinding::entity("position")],
            uniforms: vec![
                UniformBinding::entity("mvp_matrix"),
                UniformBinding::material("color"),
            ],
            state,
        }
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.state.set_uniform("color", color);
    }
}

impl Material for ColorMaterial {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn vertex_shader_source(&self) -> &str {
        COLOR_VERTEX
    }

    fn fragment_shader_source(&self) -> &str {
        COLOR_FRAGMENT
    }

    fn attribute_bindings(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    fn uniform_bindings(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    fn state(&self) -> &MaterialState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MaterialState {
        &mut self.state
    }
}

const LAMBERT_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
}

@group(0) @binding(0) var<uniform> mvp_matrix: mat4x4<f32>;
@group(0) @binding(1) var<uniform> model_matrix: mat4x4<f32>;
@group(0) @binding(2) var<uniform> normal_matrix: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = mvp_matrix * vec4<f32>(position, 1.0);
    out.world_normal = (normal_matrix * vec4<f32>(normal, 0.0)).xyz;
    out.world_position = (model_matrix * vec4<f32>(position, 1.0)).xyz;
    return out;
}
"#;

const LAMBERT_FRAGMENT: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
}

@group(0) @binding(3) var<uniform> color: vec4<f32>;
@group(0) @binding(4) var<uniform> light_direction: vec3<f32>;
@group(0) @binding(5) var<uniform> light_color: vec3<f32>;
@group(0) @binding(6) var<uniform> ambient: vec3<f32>;
@group(0) @binding(7) var<uniform> camera_position: vec3<f32>;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.world_normal);
    let l = -light_direction;
    let diffuse = max(dot(n, l), 0.0) * light_color;
    let v = normalize(camera_position - in.world_position);
    let rim = pow(1.0 - max(dot(n, v), 0.0), 4.0) * 0.1;
    return vec4<f32>(color.rgb * (ambient + diffuse) + vec3<f32>(rim), color.a);
}
"#;

/// Diffuse lighting from a single directional light
#[derive(Debug, Clone)]
pub struct LambertMaterial {
    attributes: Vec<AttributeBinding>,
    uniforms: Vec<UniformBinding>,
    state: MaterialState,
}

impl LambertMaterial {
    pub const NAME: &'static str = "lambert";

    pub fn new(color: Vec4) -> Self {
        let mut state = MaterialState::new();
        state.set_uniform("color", color);
        state.set_uniform("light_direction", Vec3::new(-0.4, -1.0, -0.3).normalize());
        state.set_uniform("light_color", Vec3::ONE);
        state.set_uniform("ambient", Vec3::splat(0.1));
        Self {
            attributes: vec![
                AttributeBinding::entity("position"),
                AttributeBinding::entity("normal"),
            ],
            uniforms: vec![
                UniformBinding::entity("mvp_matrix"),
                UniformBinding::entity("model_matrix"),
                UniformBinding::entity("normal_matrix"),
                UniformBinding::material("color"),
                UniformBinding::material("light_direction"),
                UniformBinding::material("light_color"),
                UniformBinding::material("ambient"),
                UniformBinding::camera("camera_position"),
            ],
            state,
        }
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.state.set_uniform("color", color);
    }

    /// Direction the light travels in; normalized before the next draw
    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.state.set_uniform("light_direction", direction);
    }

    pub fn set_light_color(&mut self, color: Vec3) {
        self.state.set_uniform("light_color", color);
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.state.set_uniform("ambient", ambient);
    }

    pub fn light_direction(&self) -> Option<Vec3> {
        self.state.uniform("light_direction").and_then(Uniform::as_vec3)
    }
}

impl Material for LambertMaterial {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn vertex_shader_source(&self) -> &str {
        LAMBERT_VERTEX
    }

    fn fragment_shader_source(&self) -> &str {
        LAMBERT_FRAGMENT
    }

    fn attribute_bindings(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    fn uniform_bindings(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    fn state(&self) -> &MaterialState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MaterialState {
        &mut self.state
    }

    fn prerender(&mut self, ctx: &mut DrawContext<'_>) {
        let Some(direction) = self.light_direction() else {
            return;
        };
        let normalized = direction.normalize_or_zero();
        if direction.abs_diff_eq(normalized, 1e-6) {
            return;
        }

        let uniform = Uniform::vec3(normalized);
        if let Some(location) = ctx.backend.uniform_location(ctx.program, "light_direction") {
            ctx.backend.set_uniform(location, &uniform);
        }
        self.state.set_uniform("light_direction", uniform);
    }
}
