//! Scene management

mod camera;
mod clock;
mod node;
mod renderable;
mod transform;

pub use camera::*;
pub use clock::*;
pub use node::*;
pub use renderable::*;
pub use transform::*;

use std::sync::Arc;

use thiserror::Error;
use winit::window::Window;

use crate::backend::GraphicsBackend;
use crate::renderer::{FrameStats, RenderResult, Renderer};

/// Scene graph error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Node '{parent}' already has a child named '{child}'")]
    DuplicateChild { parent: String, child: String },
    #[error("Matrix is not a translation-rotation-scale composition")]
    NotDecomposable,
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Moving '{node}' under '{parent}' would create a cycle")]
    WouldCreateCycle { node: String, parent: String },
}

/// Host hook that asks for the next frame callback
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

impl FrameScheduler for Arc<Window> {
    fn request_frame(&mut self) {
        self.request_redraw();
    }
}

/// A scene tree, its camera and the renderer that draws them.
///
/// Frames are either rendered one at a time with [`Scene::render_frame`], or
/// driven by the host: after [`Scene::start_rendering`] every call to
/// [`Scene::on_frame`] renders and asks the scheduler for the next callback.
pub struct Scene<B: GraphicsBackend> {
    root: Node,
    camera: Camera,
    renderer: Renderer<B>,
    clock: FrameClock,
    last_frame: Option<FrameTime>,
    scheduler: Option<Box<dyn FrameScheduler>>,
    rendering: bool,
}

impl<B: GraphicsBackend> Scene<B> {
    pub fn new(renderer: Renderer<B>) -> Self {
        let (width, height) = renderer.backend().surface_size();
        let mut camera = Camera::default();
        camera.set_aspect(width as f32, height as f32);
        Self::with_camera(renderer, camera)
    }

    pub fn with_camera(renderer: Renderer<B>, camera: Camera) -> Self {
        Self {
            root: Node::new("root"),
            camera,
            renderer,
            clock: FrameClock::new(),
            last_frame: None,
            scheduler: None,
            rendering: false,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    /// Timing of the most recent frame
    pub fn frame_time(&self) -> Option<FrameTime> {
        self.last_frame
    }

    /// Resize the surface and keep the camera aspect in sync
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = self.renderer.resize(width, height);
        self.camera.set_aspect(width as f32, height as f32);
    }

    /// Render exactly one frame at the wall-clock time
    pub fn render_frame(&mut self) -> RenderResult<FrameStats> {
        let time = self.clock.tick();
        self.last_frame = Some(time);
        self.renderer.render(&mut self.root, &mut self.camera, time)
    }

    /// Render exactly one frame at `seconds` since the clock started
    pub fn render_frame_at(&mut self, seconds: f64) -> RenderResult<FrameStats> {
        let time = self.clock.tick_at(seconds);
        self.last_frame = Some(time);
        self.renderer.render(&mut self.root, &mut self.camera, time)
    }

    pub fn set_scheduler(&mut self, scheduler: Box<dyn FrameScheduler>) {
        self.scheduler = Some(scheduler);
    }

    /// Begin the frame loop by requesting the first callback
    pub fn start_rendering(&mut self) {
        if self.rendering {
            return;
        }
        self.rendering = true;
        match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.request_frame(),
            None => log::warn!("start_rendering without a scheduler; the host must call on_frame"),
        }
    }

    /// No further callbacks are requested; a frame in flight still completes
    pub fn stop_rendering(&mut self) {
        self.rendering = false;
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Host frame callback.
    ///
    /// Renders when the loop is running and requests the next callback.
    /// A failed frame stops the loop and returns the error.
    pub fn on_frame(&mut self) -> RenderResult<Option<FrameStats>> {
        if !self.rendering {
            return Ok(None);
        }

        let stats = match self.render_frame() {
            Ok(stats) => stats,
            Err(err) => {
                log::error!("Frame failed, stopping the render loop: {}", err);
                self.rendering = false;
                return Err(err);
            }
        };

        if self.rendering {
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.request_frame();
            }
        }
        Ok(Some(stats))
    }

    /// Detach the node `name` and release the GPU buffers of its subtree
    pub fn release_node(&mut self, name: &str) -> Result<Node, SceneError> {
        let node = self
            .root
            .detach(name)
            .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))?;
        let released = self.renderer.release_node(&node);
        log::debug!("Released node '{}' ({} buffers)", name, released);
        Ok(node)
    }
}
