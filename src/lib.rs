//! Scene Renderer - a scene-graph renderer over an immediate graphics API
//!
//! The crate keeps the rendering core small and explicit:
//! - **Scene graph**: transform nodes composing local and world matrices top-down
//! - **Materials**: named shader programs with declared attribute/uniform bindings
//! - **Pools**: GPU buffers keyed by attribute identity, programs keyed by material name
//! - **Renderer**: batches draw calls by material and streams per-frame state
//!
//! Two backends implement the [`backend::GraphicsBackend`] seam:
//! - **wgpu**: real GPU rendering (native and web via WebGL2/WebGPU)
//! - **Headless**: records every call, used by tests and tooling

pub mod backend;
pub mod logging;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use backend::{GraphicsBackend, HeadlessBackend, WgpuBackend};
pub use renderer::{
    BufferPool, FrameStats, MaterialPool, MissingBinding, MissingBindingPolicy, RenderError,
    RenderResult, Renderer,
};
pub use resources::{
    Attribute, AttributeBinding, AttributeSource, Material, SharedMaterial, Uniform,
    UniformBinding, UniformSource,
};
pub use scene::{
    Camera, FrameClock, FrameScheduler, FrameState, FrameTime, Node, Projection, Renderable, Scene,
    SceneError, Transform, UpdateMode,
};

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Label used in logs and backend debug names
    pub label: String,
    /// Color the frame is cleared to
    pub clear_color: [f32; 4],
    /// Clear and test against a depth buffer
    pub depth_test: bool,
    /// How draw-time missing uniform/attribute values are reported
    pub missing_bindings: MissingBindingPolicy,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            label: "Scene Renderer".to_string(),
            clear_color: [0.1, 0.1, 0.15, 1.0],
            depth_test: true,
            missing_bindings: MissingBindingPolicy::Strict,
        }
    }
}
