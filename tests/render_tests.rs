//! End-to-end frame tests against the headless backend.

mod common;

use glam::{Mat4, Quat, Vec3, Vec4};
use rstest::rstest;

use common::*;
use scene_renderer::backend::{BackendError, BufferTarget, Command, DataType, DrawMode};
use scene_renderer::resources::{shared, LambertMaterial, ShaderMaterial};
use scene_renderer::{
    Attribute, AttributeBinding, MissingBindingPolicy, Node, RenderError, Renderable,
    RendererConfig, UniformBinding, UpdateMode,
};

#[test]
fn test_single_triangle_issues_one_draw_with_camera_mvp() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("triangle", plain_material("plain")))
        .unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.groups, 1);
    let backend = scene.renderer().backend();
    assert_eq!(draws(backend), vec![(DrawMode::Triangles, 0, 3, false)]);

    let camera = scene.camera();
    let expected = camera.projection_matrix() * camera.view_matrix() * Mat4::IDENTITY;
    let uploaded = mat4_uploads(backend, "mvp_matrix");
    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].abs_diff_eq(expected, 1e-6));
}

#[test]
fn test_frame_is_bracketed_by_begin_and_end() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("triangle", color_material()))
        .unwrap();
    scene.render_frame_at(0.0).unwrap();

    let commands = scene.renderer().backend().commands();
    assert!(matches!(commands.first(), Some(Command::BeginFrame { clear }) if clear.depth == Some(1.0)));
    assert_eq!(commands.last(), Some(&Command::EndFrame));
}

#[test]
fn test_depth_clear_follows_config() {
    let mut scene = scene_with(RendererConfig {
        depth_test: false,
        ..RendererConfig::default()
    });
    scene.render_frame_at(0.0).unwrap();

    let commands = scene.renderer().backend().commands();
    assert!(matches!(commands.first(), Some(Command::BeginFrame { clear }) if clear.depth.is_none()));
}

#[rstest]
#[case::no_material(None, 3)]
#[case::no_vertices(Some(()), 0)]
fn test_empty_entities_are_skipped(#[case] material: Option<()>, #[case] vertex_count: u32) {
    let mut scene = scene();
    let mut renderable = Renderable::new()
        .with_attribute("position", Attribute::new(TRIANGLE.to_vec(), 3))
        .with_vertex_count(vertex_count);
    if material.is_some() {
        renderable = renderable.with_material(plain_material("plain"));
    }
    scene
        .root_mut()
        .add_child(Node::entity("empty", renderable))
        .unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();

    assert_eq!(stats.entities_visited, 1);
    assert_eq!(stats.entities_skipped, 1);
    assert_eq!(stats.draw_calls, 0);
    assert!(scene.renderer().buffer_pool().is_empty());
    assert!(scene.renderer().material_pool().is_empty());
    assert_eq!(scene.renderer().backend().stats().programs_compiled, 0);
}

#[test]
fn test_entities_are_grouped_by_material_name() {
    let mut scene = scene();
    let plain = plain_material("plain");
    let root = scene.root_mut();
    root.add_child(triangle("a", plain.clone())).unwrap();
    root.add_child(triangle("b", color_material())).unwrap();
    root.add_child(triangle("c", plain)).unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();
    assert_eq!(stats.groups, 2);
    assert_eq!(stats.draw_calls, 3);

    // Entities of one group are drawn back to back with a single program switch
    let backend = scene.renderer().backend();
    let programs: Vec<_> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::UseProgram { program } => Some(*program),
            _ => None,
        })
        .collect();
    assert_eq!(programs.len(), 2);
    assert_ne!(programs[0], programs[1]);
}

#[test]
fn test_child_inherits_parent_transform() {
    let mut scene = scene();
    let parent = scene.root_mut().add_child(Node::new("parent")).unwrap();
    parent.set_translation(Vec3::new(2.0, 0.0, 0.0), UpdateMode::Immediate);
    let child = parent
        .add_child(triangle("child", plain_material("plain")))
        .unwrap();
    child.set_scale(Vec3::splat(0.5), UpdateMode::Deferred);

    scene.render_frame_at(0.0).unwrap();

    let parent = scene.root().child("parent").unwrap();
    let child = parent.child("child").unwrap();
    let expected = parent.transform().world_matrix() * child.transform().local_matrix();
    assert!(child.transform().world_matrix().abs_diff_eq(expected, 1e-6));
    assert!(child
        .transform()
        .world_matrix()
        .abs_diff_eq(Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(0.5)), 1e-6));
}

#[test]
fn test_rotating_child_changes_only_its_normal_matrix() {
    let mut scene = scene();
    let parent = scene
        .root_mut()
        .add_child(Node::new("parent").with_transform(scene_renderer::Transform::from_translation(
            Vec3::new(0.0, 1.0, 0.0),
        )))
        .unwrap();
    parent
        .add_child(triangle("child", plain_material("plain")))
        .unwrap();
    scene.render_frame_at(0.0).unwrap();

    let parent_before = scene.root().child("parent").unwrap().transform().normal_matrix();
    let child_before = scene.root().find("child").unwrap().transform().normal_matrix();

    scene.root_mut().find_mut("child").unwrap().set_rotation(
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        UpdateMode::Deferred,
    );
    scene.render_frame_at(0.016).unwrap();

    let parent_after = scene.root().child("parent").unwrap().transform().normal_matrix();
    let child_after = scene.root().find("child").unwrap().transform().normal_matrix();
    assert_eq!(parent_before, parent_after);
    assert!(!child_before.abs_diff_eq(child_after, 1e-3));
}

#[test]
fn test_camera_change_recomputes_every_node() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("triangle", plain_material("plain")))
        .unwrap();

    let first = scene.render_frame_at(0.0).unwrap();
    assert_eq!(first.nodes_updated, 2);
    assert!(!scene.camera().is_dirty());

    let idle = scene.render_frame_at(0.1).unwrap();
    assert_eq!(idle.nodes_updated, 0);

    scene.camera_mut().set_position(Vec3::new(0.0, 1.0, 4.0));
    let moved = scene.render_frame_at(0.2).unwrap();
    assert_eq!(moved.nodes_updated, 2);
    assert!(!scene.camera().is_dirty());

    let camera = scene.camera();
    let uploaded = mat4_uploads(scene.renderer().backend(), "mvp_matrix");
    assert!(uploaded
        .last()
        .unwrap()
        .abs_diff_eq(camera.view_projection_matrix(), 1e-6));
}

#[test]
fn test_indexed_draw_binds_element_buffer() {
    let mut scene = scene();
    let quad = Renderable::new()
        .with_material(plain_material("plain"))
        .with_attribute(
            "position",
            Attribute::new(
                vec![-0.5f32, -0.5, 0.0, 0.5, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0],
                3,
            ),
        )
        .with_indices(Attribute::indices(vec![0u16, 1, 2, 0, 2, 3]))
        .with_vertex_count(6);
    scene.root_mut().add_child(Node::entity("quad", quad)).unwrap();

    scene.render_frame_at(0.0).unwrap();

    let backend = scene.renderer().backend();
    assert_eq!(draws(backend), vec![(DrawMode::Triangles, 0, 6, true)]);
    assert_eq!(
        count_commands(backend, |c| matches!(c, Command::SetIndexBuffer { .. })),
        1
    );
    // Binding points are released after the draw
    assert_eq!(backend.bound_buffer(BufferTarget::ElementArray), None);
    assert_eq!(backend.bound_buffer(BufferTarget::Array), None);
}

#[test]
fn test_byte_indices_are_rejected_but_frame_completes() {
    let mut scene = scene();
    let entity = Renderable::new()
        .with_material(plain_material("plain"))
        .with_attribute("position", Attribute::new(TRIANGLE.to_vec(), 3))
        .with_indices(Attribute::indices(vec![0u8, 1, 2]))
        .with_vertex_count(3);
    scene.root_mut().add_child(Node::entity("bytes", entity)).unwrap();

    let err = scene.render_frame_at(0.0).unwrap_err();
    assert!(matches!(err, RenderError::Backend(BackendError::Unsupported(_))));
    let backend = scene.renderer().backend();
    assert_eq!(backend.commands().last(), Some(&Command::EndFrame));

    // Attributes bound before the failure are released again
    let enabled = count_commands(backend, |c| matches!(c, Command::SetVertexAttribute { .. }));
    let disabled =
        count_commands(backend, |c| matches!(c, Command::DisableVertexAttribute { .. }));
    assert_eq!(enabled, 1);
    assert_eq!(disabled, enabled);
    assert_eq!(backend.bound_buffer(BufferTarget::Array), None);
    assert!(draws(backend).is_empty());
}

#[test]
fn test_borrowed_material_fails_the_frame() {
    let mut scene = scene();
    let material = plain_material("plain");
    scene
        .root_mut()
        .add_child(triangle("held", material.clone()))
        .unwrap();

    let guard = material.borrow_mut();
    let err = scene.render_frame_at(0.0).unwrap_err();
    drop(guard);

    assert_eq!(
        err,
        RenderError::MaterialInUse {
            entity: "held".to_string()
        }
    );
    let backend = scene.renderer().backend();
    assert!(draws(backend).is_empty());
    assert_eq!(backend.commands().last(), Some(&Command::EndFrame));

    // Released again, the next frame draws normally
    assert_eq!(scene.render_frame_at(0.1).unwrap().draw_calls, 1);
}

#[test]
fn test_material_draw_mode_overrides_entity() {
    let mut scene = scene();
    let outline = shared(
        ShaderMaterial::new("outline", PLAIN_VERTEX, PLAIN_FRAGMENT)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix"))
            .with_draw_mode(DrawMode::LineLoop),
    );
    scene
        .root_mut()
        .add_child(triangle("outline", outline))
        .unwrap();

    scene.render_frame_at(0.0).unwrap();
    assert_eq!(
        draws(scene.renderer().backend()),
        vec![(DrawMode::LineLoop, 0, 3, false)]
    );
}

#[test]
fn test_material_and_camera_sources_feed_uniforms() {
    let mut scene = scene();
    let lambert = shared(LambertMaterial::new(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let entity = Renderable::new()
        .with_material(lambert)
        .with_attribute("position", Attribute::new(TRIANGLE.to_vec(), 3))
        .with_attribute("normal", Attribute::new(vec![0.0f32, 0.0, 1.0].repeat(3), 3))
        .with_vertex_count(3);
    scene.root_mut().add_child(Node::entity("lit", entity)).unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();
    assert_eq!(stats.missing_bindings, 0);

    let backend = scene.renderer().backend();
    let camera_position = uniform_uploads(backend, "camera_position");
    assert_eq!(
        camera_position[0].as_vec3(),
        Some(scene.camera().position())
    );
    let color = uniform_uploads(backend, "color");
    assert_eq!(color[0].selected_floats(), vec![1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_shared_buffer_views_bind_owner_buffer() {
    let mut scene = scene();
    // Interleaved position (3) + padding (1) per vertex
    let interleaved: Vec<f32> = TRIANGLE
        .chunks(3)
        .flat_map(|p| [p[0], p[1], p[2], 0.0])
        .collect();
    let entity = Renderable::new()
        .with_material(plain_material("plain"))
        .with_attribute(
            "vertices",
            Attribute::new(interleaved, 4).with_buffer_name("tri-interleaved"),
        )
        .with_attribute(
            "position",
            Attribute::shared("tri-interleaved", DataType::F32, 3).with_stride(16),
        )
        .with_vertex_count(3);
    scene.root_mut().add_child(Node::entity("tri", entity)).unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();
    assert_eq!(stats.missing_bindings, 0);

    let pool = scene.renderer().buffer_pool();
    let owner = pool.shared_buffer("tri-interleaved").unwrap();
    assert_eq!(pool.len(), 1);
    let backend = scene.renderer().backend();
    assert!(backend.commands().iter().any(|c| matches!(
        c,
        Command::SetVertexAttribute { location: 0, buffer, layout } if *buffer == owner && layout.stride == 16
    )));
}

#[rstest]
#[case::warn(MissingBindingPolicy::Warn)]
#[case::strict(MissingBindingPolicy::Strict)]
fn test_missing_binding_policy(#[case] policy: MissingBindingPolicy) {
    let mut scene = scene_with(RendererConfig {
        missing_bindings: policy,
        ..RendererConfig::default()
    });
    let tinted = shared(
        ShaderMaterial::new("tinted", PLAIN_VERTEX, TINTED_FRAGMENT)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix"))
            .with_uniform(UniformBinding::material("tint")),
    );
    scene
        .root_mut()
        .add_child(triangle("triangle", tinted))
        .unwrap();

    let result = scene.render_frame_at(0.0);

    // The draw happens either way
    assert_eq!(draws(scene.renderer().backend()).len(), 1);
    match policy {
        MissingBindingPolicy::Warn => {
            assert_eq!(result.unwrap().missing_bindings, 1);
        }
        MissingBindingPolicy::Strict => match result.unwrap_err() {
            RenderError::MissingBindings(missing) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].entity, "triangle");
                assert_eq!(missing[0].variable, "tint");
            }
            other => panic!("unexpected error: {other}"),
        },
    }
}

#[test]
fn test_material_hooks_run_around_draw() {
    let mut scene = scene();
    let lambert = shared(LambertMaterial::new(Vec4::ONE));
    let entity = Renderable::new()
        .with_material(lambert.clone())
        .with_attribute("position", Attribute::new(TRIANGLE.to_vec(), 3))
        .with_attribute("normal", Attribute::new(vec![0.0f32, 1.0, 0.0].repeat(3), 3))
        .with_vertex_count(3);
    scene.root_mut().add_child(Node::entity("lit", entity)).unwrap();

    {
        let mut material = lambert.borrow_mut();
        material
            .state_mut()
            .set_uniform("light_direction", Vec3::new(0.0, -4.0, 0.0));
    }
    scene.render_frame_at(0.0).unwrap();

    // prerender normalizes and re-uploads the light direction
    let uploads = uniform_uploads(scene.renderer().backend(), "light_direction");
    assert_eq!(uploads.len(), 2);
    let normalized = uploads[1].as_vec3().unwrap();
    assert!(normalized.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-6));
}

#[test]
fn test_instances_sharing_a_name_keep_their_own_values() {
    let mut scene = scene();
    let red = shared(scene_renderer::resources::ColorMaterial::new(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let blue = shared(scene_renderer::resources::ColorMaterial::new(Vec4::new(0.0, 0.0, 1.0, 1.0)));
    scene.root_mut().add_child(triangle("red", red)).unwrap();
    scene.root_mut().add_child(triangle("blue", blue)).unwrap();

    let stats = scene.render_frame_at(0.0).unwrap();
    assert_eq!(stats.groups, 1);
    assert_eq!(scene.renderer().material_pool().stats().compilations, 1);

    let colors: Vec<Vec<f32>> = uniform_uploads(scene.renderer().backend(), "color")
        .iter()
        .map(|u| u.selected_floats())
        .collect();
    assert_eq!(colors, vec![vec![1.0, 0.0, 0.0, 1.0], vec![0.0, 0.0, 1.0, 1.0]]);
}
