//! A coloured triangle parented to a Lambert-shaded quad.
//!
//! The quad turns slowly about Y and carries the triangle with it; the
//! triangle also spins about its own Z axis. Space pauses the frame loop.
//!
//! ```bash
//! RUST_LOG=scene_renderer=debug cargo run --example spinning_triangle
//! ```

use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use scene_renderer::backend::{WgpuBackend, WgpuBackendConfig};
use scene_renderer::logging::{init_logging, LoggingConfig};
use scene_renderer::resources::{shared, ColorMaterial, LambertMaterial};
use scene_renderer::{
    Attribute, Node, Renderable, Renderer, RendererConfig, Scene, Transform, UpdateMode,
};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

/// Radians per second
const QUAD_SPEED: f32 = 0.4;
const TRIANGLE_SPEED: f32 = 1.5;

fn quad() -> Renderable {
    let positions = vec![
        -1.0f32, -1.0, 0.0, //
        1.0, -1.0, 0.0, //
        1.0, 1.0, 0.0, //
        -1.0, 1.0, 0.0,
    ];
    let normals = [0.0f32, 0.0, 1.0].repeat(4);

    Renderable::new()
        .with_material(shared(LambertMaterial::new(Vec4::new(0.8, 0.8, 0.85, 1.0))))
        .with_attribute("position", Attribute::new(positions, 3))
        .with_attribute("normal", Attribute::new(normals, 3))
        .with_indices(Attribute::indices(vec![0u16, 1, 2, 0, 2, 3]))
        .with_vertex_count(6)
}

fn triangle() -> Renderable {
    let positions = vec![
        0.0f32, 0.5, 0.0, //
        -0.45, -0.35, 0.0, //
        0.45, -0.35, 0.0,
    ];

    Renderable::new()
        .with_material(shared(ColorMaterial::new(Vec4::new(0.95, 0.35, 0.2, 1.0))))
        .with_attribute("position", Attribute::new(positions, 3))
        .with_vertex_count(3)
}

fn spin(node: Option<&mut Node>, speed: f32, axis: Vec3, delta: f32) {
    if let Some(node) = node {
        node.transform_mut()
            .rotate(Quat::from_axis_angle(axis, speed * delta), UpdateMode::Deferred);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Spinning triangle")
            .with_inner_size(LogicalSize::new(960, 640))
            .build(&event_loop)?,
    );

    let backend = WgpuBackend::new(window.clone(), WgpuBackendConfig::default())?;
    log::info!("Surface format: {:?}", backend.surface_format());

    let mut scene = Scene::new(Renderer::new(backend, RendererConfig::default()));
    scene.camera_mut().set_position(Vec3::new(0.0, 1.0, 4.0));

    let quad = scene.root_mut().add_child(Node::entity("quad", quad()))?;
    quad.add_child(
        Node::entity("triangle", triangle())
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 0.3))),
    )?;

    scene.set_scheduler(Box::new(window.clone()));
    scene.start_rendering();

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        let Event::WindowEvent { event, .. } = event else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => scene.resize(size.width, size.height),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Space),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if scene.is_rendering() {
                    scene.stop_rendering();
                } else {
                    scene.clock_mut().reset();
                    scene.start_rendering();
                }
            }
            WindowEvent::RedrawRequested => {
                let delta = scene
                    .frame_time()
                    .map(|t| (t.time - t.previous_time) as f32)
                    .unwrap_or(0.0);
                spin(scene.root_mut().find_mut("quad"), QUAD_SPEED, Vec3::Y, delta);
                spin(
                    scene.root_mut().find_mut("triangle"),
                    TRIANGLE_SPEED,
                    Vec3::Z,
                    delta,
                );

                match scene.on_frame() {
                    Ok(Some(stats)) => log::trace!("{:?}", stats),
                    Ok(None) => {}
                    Err(err) => {
                        log::error!("Render failed: {}", err);
                        elwt.exit();
                    }
                }
            }
            _ => {}
        }
    })?;

    Ok(())
}
