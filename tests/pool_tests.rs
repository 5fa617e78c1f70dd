//! Buffer and material pool behavior across frames.

mod common;

use rstest::rstest;

use common::*;
use scene_renderer::backend::{Command, HeadlessBackend};
use scene_renderer::renderer::{BufferOp, MaterialPool};
use scene_renderer::resources::ShaderMaterial;
use scene_renderer::{
    Attribute, AttributeBinding, BufferPool, RenderError, UniformBinding,
};

fn creates(backend: &HeadlessBackend) -> usize {
    count_commands(backend, |c| matches!(c, Command::CreateBuffer { .. }))
}

#[test]
fn test_unchanged_attribute_allocates_once_across_frames() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("triangle", plain_material("plain")))
        .unwrap();

    scene.render_frame_at(0.0).unwrap();
    scene.render_frame_at(0.1).unwrap();

    let backend = scene.renderer().backend();
    assert_eq!(creates(backend), 1);
    assert_eq!(
        count_commands(backend, |c| matches!(c, Command::WriteBuffer { .. })),
        0
    );
    assert_eq!(scene.renderer().buffer_pool().stats().rebinds, 1);
}

#[rstest]
#[case::shrink(6, BufferOp::Updated)]
#[case::same_size(9, BufferOp::Updated)]
#[case::grow(12, BufferOp::Reallocated)]
fn test_updated_attribute_resizes_or_writes(#[case] len: usize, #[case] expected: BufferOp) {
    let mut backend = HeadlessBackend::default();
    let mut pool = BufferPool::new();
    let mut attribute = Attribute::new(vec![1.0f32; 9], 3);

    let first = pool.bind(&mut backend, &mut attribute).unwrap();
    attribute.set_data(vec![2.0f32; len]);
    let second = pool.bind(&mut backend, &mut attribute).unwrap();

    assert_eq!(second.op, expected);
    match expected {
        BufferOp::Updated => {
            assert_eq!(second.handle, first.handle);
            assert_eq!(backend.buffer_capacity(first.handle), Some(36));
            let contents = backend.buffer_contents(first.handle).unwrap();
            assert_eq!(&contents[..4], &2.0f32.to_ne_bytes());
        }
        _ => {
            assert_ne!(second.handle, first.handle);
            assert_eq!(backend.buffer_capacity(second.handle), Some(len as u64 * 4));
            assert_eq!(backend.buffer_capacity(first.handle), None);
            assert_eq!(pool.stats().reallocations, 1);
        }
    }
    assert!(!attribute.is_updated());
}

#[test]
fn test_entity_edit_between_frames_is_uploaded() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("triangle", plain_material("plain")))
        .unwrap();
    scene.render_frame_at(0.0).unwrap();

    let positions = scene
        .root_mut()
        .find_mut("triangle")
        .and_then(|n| n.renderable_mut())
        .and_then(|r| r.attribute_mut("position"))
        .unwrap();
    positions.set_data(vec![0.0f32; 9]);
    scene.render_frame_at(0.1).unwrap();

    let backend = scene.renderer().backend();
    assert_eq!(creates(backend), 1);
    assert_eq!(
        count_commands(backend, |c| matches!(c, Command::WriteBuffer { size: 36, .. })),
        1
    );
}

#[test]
fn test_material_compiles_once_for_k_uses() {
    let mut backend = HeadlessBackend::default();
    let mut pool = MaterialPool::new();
    let material = ShaderMaterial::new("plain", PLAIN_VERTEX, PLAIN_FRAGMENT)
        .with_attribute(AttributeBinding::entity("position"))
        .with_uniform(UniformBinding::entity("mvp_matrix"));

    let k = 5;
    for _ in 0..k {
        pool.use_material(&mut backend, &material).unwrap();
    }

    assert_eq!(pool.stats().compilations, 1);
    assert_eq!(pool.stats().cache_hits, k - 1);
    assert_eq!(backend.stats().programs_compiled, 1);
}

#[test]
fn test_material_shared_by_many_entities_compiles_once() {
    let mut scene = scene();
    let material = plain_material("plain");
    for i in 0..4 {
        scene
            .root_mut()
            .add_child(triangle(&format!("t{i}"), material.clone()))
            .unwrap();
    }

    scene.render_frame_at(0.0).unwrap();
    scene.render_frame_at(0.1).unwrap();

    let stats = scene.renderer().material_pool().stats();
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(scene.renderer().last_stats().draw_calls, 4);
}

#[test]
fn test_aliased_material_names_are_detected() {
    let mut scene = scene();
    let plain = plain_material("effect");
    let impostor = scene_renderer::resources::shared(
        ShaderMaterial::new("effect", PLAIN_VERTEX, TINTED_FRAGMENT)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix")),
    );
    scene.root_mut().add_child(triangle("a", plain)).unwrap();
    scene.render_frame_at(0.0).unwrap();

    scene.root_mut().add_child(triangle("b", impostor)).unwrap();
    let err = scene.render_frame_at(0.1).unwrap_err();
    assert_eq!(
        err,
        RenderError::MaterialAliased {
            name: "effect".into()
        }
    );
}

#[test]
fn test_release_node_frees_its_buffers() {
    let mut scene = scene();
    scene
        .root_mut()
        .add_child(triangle("keep", plain_material("plain")))
        .unwrap();
    scene
        .root_mut()
        .add_child(triangle("drop", plain_material("plain")))
        .unwrap();
    scene.render_frame_at(0.0).unwrap();
    assert_eq!(scene.renderer().backend().live_buffers(), 2);

    let node = scene.release_node("drop").unwrap();
    assert_eq!(node.name(), "drop");
    assert!(scene.root().find("drop").is_none());
    assert_eq!(scene.renderer().backend().live_buffers(), 1);
    assert_eq!(scene.renderer().buffer_pool().len(), 1);

    assert!(scene.release_node("drop").is_err());
}
