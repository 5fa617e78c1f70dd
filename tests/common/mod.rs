//! Shared helpers for the headless integration tests.

#![allow(dead_code)]

use glam::{Mat4, Vec3, Vec4};
use scene_renderer::backend::{Command, DrawMode, HeadlessBackend};
use scene_renderer::resources::{shared, ColorMaterial, SharedMaterial, ShaderMaterial};
use scene_renderer::{
    Attribute, AttributeBinding, Camera, Node, Renderable, Renderer, RendererConfig, Scene,
    Uniform, UniformBinding,
};

pub const TRIANGLE: [f32; 9] = [0.0, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0];

pub const PLAIN_VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> mvp_matrix: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return mvp_matrix * vec4<f32>(position, 1.0);
}
"#;

pub const PLAIN_FRAGMENT: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.5, 0.0, 1.0);
}
"#;

pub const TINTED_FRAGMENT: &str = r#"
@group(0) @binding(1) var<uniform> tint: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint;
}
"#;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Camera on +Z looking at the origin with a fixed square projection
pub fn test_camera() -> Camera {
    let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
    camera.set_aspect(1.0, 1.0);
    camera
}

pub fn renderer(config: RendererConfig) -> Renderer<HeadlessBackend> {
    Renderer::new(HeadlessBackend::new(256, 256), config)
}

pub fn scene() -> Scene<HeadlessBackend> {
    scene_with(RendererConfig::default())
}

pub fn scene_with(config: RendererConfig) -> Scene<HeadlessBackend> {
    init_logger();
    Scene::with_camera(renderer(config), test_camera())
}

/// Material with one position attribute and one MVP uniform
pub fn plain_material(name: &str) -> SharedMaterial {
    shared(
        ShaderMaterial::new(name, PLAIN_VERTEX, PLAIN_FRAGMENT)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix")),
    )
}

pub fn color_material() -> SharedMaterial {
    shared(ColorMaterial::new(Vec4::new(0.2, 0.8, 0.2, 1.0)))
}

pub fn triangle(name: &str, material: SharedMaterial) -> Node {
    Node::entity(
        name,
        Renderable::new()
            .with_material(material)
            .with_attribute("position", Attribute::new(TRIANGLE.to_vec(), 3))
            .with_vertex_count(3),
    )
}

/// `(mode, first, count, indexed)` of every draw call in the log
pub fn draws(backend: &HeadlessBackend) -> Vec<(DrawMode, u32, u32, bool)> {
    backend
        .commands()
        .iter()
        .filter_map(|command| match *command {
            Command::Draw { mode, first, count } => Some((mode, first, count, false)),
            Command::DrawIndexed { mode, first, count } => Some((mode, first, count, true)),
            _ => None,
        })
        .collect()
}

/// Every value uploaded to the uniform called `name`, in order
pub fn uniform_uploads(backend: &HeadlessBackend, name: &str) -> Vec<Uniform> {
    backend
        .commands()
        .iter()
        .filter_map(|command| match command {
            Command::SetUniform {
                name: uploaded,
                value,
                ..
            } if uploaded == name => Some(value.clone()),
            _ => None,
        })
        .collect()
}

pub fn mat4_uploads(backend: &HeadlessBackend, name: &str) -> Vec<Mat4> {
    uniform_uploads(backend, name)
        .iter()
        .filter_map(Uniform::as_mat4)
        .collect()
}

pub fn count_commands(backend: &HeadlessBackend, pred: impl Fn(&Command) -> bool) -> usize {
    backend.commands().iter().filter(|c| pred(c)).count()
}
