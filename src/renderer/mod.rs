//! Frame orchestration: tree walk, material grouping and draw submission

mod buffer_pool;
mod error;
mod material_pool;

pub use buffer_pool::*;
pub use error::*;
pub use material_pool::*;

use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{BackendError, BufferTarget, ClearState, GraphicsBackend, IndexFormat};
use crate::resources::{
    AttributeId, AttributeSource, DrawContext, Material, SharedMaterial, Uniform, UniformSource,
};
use crate::scene::{Camera, FrameState, FrameTime, Node, Renderable, Transform};
use crate::RendererConfig;

/// What happens when a declared binding has no value at draw time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingBindingPolicy {
    /// Log each miss and keep drawing
    Warn,
    /// Finish the frame, then return [`RenderError::MissingBindings`]
    #[default]
    Strict,
}

/// Counters for one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub nodes_visited: usize,
    /// Nodes whose composed matrices were recomputed
    pub nodes_updated: usize,
    pub entities_visited: usize,
    /// Entities without a material or without vertices
    pub entities_skipped: usize,
    pub groups: usize,
    pub draw_calls: usize,
    pub missing_bindings: usize,
}

struct DrawItem<'a> {
    name: &'a str,
    transform: &'a Transform,
    renderable: &'a mut Renderable,
    material: SharedMaterial,
}

struct DrawGroup<'a> {
    name: String,
    items: Vec<DrawItem<'a>>,
}

/// Draws a scene tree through a [`GraphicsBackend`].
///
/// Each frame starts from scratch: walk the tree, group entities by material
/// name, then draw group by group. Only the buffer and material pools
/// survive between frames.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    buffers: BufferPool,
    materials: MaterialPool,
    last_stats: FrameStats,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(backend: B, config: RendererConfig) -> Self {
        log::info!("{}: renderer created", config.label);
        Self {
            backend,
            config,
            buffers: BufferPool::new(),
            materials: MaterialPool::new(),
            last_stats: FrameStats::default(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffers
    }

    pub fn material_pool(&self) -> &MaterialPool {
        &self.materials
    }

    /// Stats of the last frame that completed without error
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Resize the surface, returning the size actually applied
    pub fn resize(&mut self, width: u32, height: u32) -> (u32, u32) {
        self.backend.resize(width, height);
        self.backend.surface_size()
    }

    /// Render one frame of the tree rooted at `root`
    pub fn render(
        &mut self,
        root: &mut Node,
        camera: &mut Camera,
        time: FrameTime,
    ) -> RenderResult<FrameStats> {
        let frame = FrameState {
            frame: time.frame,
            time: time.time,
            previous_time: time.previous_time,
            view_projection: camera.view_projection_matrix(),
            camera_dirty: camera.is_dirty(),
        };
        let mut stats = FrameStats {
            frame: time.frame,
            ..FrameStats::default()
        };

        self.backend.begin_frame(&ClearState {
            color: self.config.clear_color,
            depth: self.config.depth_test.then_some(1.0),
        })?;

        stats.nodes_updated = root.update_frame_state(&frame);
        let mut groups = Vec::new();
        let collected = collect(root, &mut groups, &mut HashMap::new(), &mut stats);
        camera.clear_dirty();
        stats.groups = groups.len();

        let camera = &*camera;
        let mut missing = Vec::new();
        let drawn = collected.and_then(|()| {
            groups.into_iter().try_for_each(|group| {
                self.draw_group(group, camera, &frame, &mut stats, &mut missing)
            })
        });

        // The frame is submitted even when drawing failed part way
        let ended = self.backend.end_frame();
        drawn?;
        ended?;

        stats.missing_bindings = missing.len();
        log::trace!(
            "Frame {}: {} draw calls in {} groups, {} nodes updated",
            stats.frame,
            stats.draw_calls,
            stats.groups,
            stats.nodes_updated
        );

        if !missing.is_empty() && self.config.missing_bindings == MissingBindingPolicy::Strict {
            return Err(RenderError::MissingBindings(missing));
        }
        self.last_stats = stats;
        Ok(stats)
    }

    fn draw_group(
        &mut self,
        group: DrawGroup<'_>,
        camera: &Camera,
        frame: &FrameState,
        stats: &mut FrameStats,
        missing: &mut Vec<MissingBinding>,
    ) -> RenderResult<()> {
        let DrawGroup { name, items } = group;
        let in_use = |entity: &str| RenderError::MaterialInUse {
            entity: entity.to_string(),
        };

        let Some(first) = items.first() else {
            return Ok(());
        };
        let compiled = {
            let material = first.material.try_borrow().map_err(|_| in_use(first.name))?;
            self.materials
                .use_material(&mut self.backend, &*material)?
                .clone()
        };

        // Instances sharing the name must be the same effect
        let mut verified: Option<SharedMaterial> = None;
        for mut item in items {
            let shared = item.material.clone();
            let mut material = shared.try_borrow_mut().map_err(|_| in_use(item.name))?;
            if !verified.as_ref().is_some_and(|m| Rc::ptr_eq(m, &shared)) {
                if material.signature() != compiled.signature {
                    return Err(RenderError::MaterialAliased { name: name.clone() });
                }
                verified = Some(shared.clone());
            }

            self.draw_entity(&mut *material, &compiled, &mut item, camera, frame, missing)?;
            stats.draw_calls += 1;
        }
        Ok(())
    }

    /// Draw one entity, then release its attribute slots and binding points
    /// whether or not the draw went through
    fn draw_entity(
        &mut self,
        material: &mut dyn Material,
        compiled: &CompiledMaterial,
        item: &mut DrawItem<'_>,
        camera: &Camera,
        frame: &FrameState,
        missing: &mut Vec<MissingBinding>,
    ) -> RenderResult<()> {
        let mut enabled = Vec::with_capacity(compiled.attributes.len());
        let mut indexed = false;
        let result = self.bind_and_draw(
            material,
            compiled,
            item,
            camera,
            frame,
            missing,
            &mut enabled,
            &mut indexed,
        );

        for location in enabled {
            self.backend.disable_vertex_attribute(location);
        }
        self.backend.unbind_buffer(BufferTarget::Array);
        if indexed {
            self.backend.unbind_buffer(BufferTarget::ElementArray);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_and_draw(
        &mut self,
        material: &mut dyn Material,
        compiled: &CompiledMaterial,
        item: &mut DrawItem<'_>,
        camera: &Camera,
        frame: &FrameState,
        missing: &mut Vec<MissingBinding>,
        enabled: &mut Vec<u32>,
        indexed: &mut bool,
    ) -> RenderResult<()> {
        let policy = self.config.missing_bindings;

        for (binding, location) in &compiled.uniforms {
            let value = match binding.source {
                UniformSource::Entity => {
                    entity_uniform(item.transform, item.renderable, &binding.name)
                }
                UniformSource::Material => material.state().uniform(&binding.name).cloned(),
                UniformSource::Camera => camera.uniform(&binding.name),
            };
            match value {
                Some(value) => self.backend.set_uniform(*location, &value),
                None => report_missing(
                    policy,
                    missing,
                    MissingBinding {
                        entity: item.name.to_string(),
                        material: compiled.name.clone(),
                        variable: binding.name.clone(),
                        kind: VariableKind::Uniform,
                    },
                ),
            }
        }

        // Named shared buffers must exist before their views are bound
        for (_, attribute) in item.renderable.attributes_mut() {
            if attribute.buffer_name().is_some() && !attribute.is_shared_view() {
                self.buffers.ensure(&mut self.backend, attribute)?;
            }
        }
        for (_, attribute) in material.state_mut().attributes_mut() {
            if attribute.buffer_name().is_some() && !attribute.is_shared_view() {
                self.buffers.ensure(&mut self.backend, attribute)?;
            }
        }

        for (binding, location) in &compiled.attributes {
            let attribute = match binding.source {
                AttributeSource::Entity => item.renderable.attribute_mut(&binding.name),
                AttributeSource::Material => material.state_mut().attribute_mut(&binding.name),
            };
            let shared = attribute.as_ref().and_then(|a| {
                a.is_shared_view()
                    .then(|| a.buffer_name().and_then(|n| self.buffers.shared_buffer(n)))
            });

            let (attribute, handle) = match (attribute, shared) {
                (Some(attribute), Some(Some(handle))) => {
                    self.backend.bind_buffer(attribute.target(), handle);
                    (attribute, handle)
                }
                (Some(attribute), None) => {
                    let binding = self.buffers.bind(&mut self.backend, attribute)?;
                    (attribute, binding.handle)
                }
                _ => {
                    report_missing(
                        policy,
                        missing,
                        MissingBinding {
                            entity: item.name.to_string(),
                            material: compiled.name.clone(),
                            variable: binding.name.clone(),
                            kind: VariableKind::Attribute,
                        },
                    );
                    continue;
                }
            };
            self.backend
                .set_vertex_attribute(*location, handle, &attribute.layout());
            enabled.push(*location);
        }

        if let Some(indices) = item.renderable.indices_mut() {
                let format = IndexFormat::from_data_type(indices.data_type()).ok_or_else(|| {
                    BackendError::Unsupported(format!(
                        "{:?} index data on entity '{}'",
                        indices.data_type(),
                        item.name
                    ))
                })?;
            let binding = self.buffers.bind(&mut self.backend, indices)?;
            *indexed = true;
            self.backend.set_index_buffer(binding.handle, format);
        }

        let mode = material
            .draw_mode()
            .unwrap_or_else(|| item.renderable.draw_mode());
        let first = item.renderable.vertex_offset();
        let count = item.renderable.vertex_count();

        material.prerender(&mut DrawContext {
            entity: item.name,
            transform: item.transform,
            renderable: &mut *item.renderable,
            frame,
            program: compiled.program,
            backend: &mut self.backend,
        });

        log::trace!(
            "Draw '{}' with '{}': {:?} first={} count={} indexed={}",
            item.name,
            compiled.name,
            mode,
            first,
            count,
            indexed
        );
        if *indexed {
            self.backend.draw_indexed(mode, first, count);
        } else {
            self.backend.draw(mode, first, count);
        }

        material.postrender(&mut DrawContext {
            entity: item.name,
            transform: item.transform,
            renderable: &mut *item.renderable,
            frame,
            program: compiled.program,
            backend: &mut self.backend,
        });
        Ok(())
    }

    /// Destroy the buffer of a single attribute
    pub fn release_attribute(&mut self, id: AttributeId) -> bool {
        self.buffers.release(&mut self.backend, id)
    }

    /// Destroy every buffer owned by the entities of `node`'s subtree.
    ///
    /// Material attributes are left alone since other entities may share
    /// the material. Returns the number of attributes released.
    pub fn release_node(&mut self, node: &Node) -> usize {
        let mut ids = Vec::new();
        node.walk(|node, _| {
            if let Some(renderable) = node.renderable() {
                ids.extend(renderable.attributes().map(|(_, a)| a.id()));
                ids.extend(renderable.indices().map(|a| a.id()));
            }
        });
        ids.into_iter()
            .filter(|id| self.buffers.release(&mut self.backend, *id))
            .count()
    }

    /// Drop the compiled program of a material
    pub fn release_material(&mut self, name: &str) -> bool {
        self.materials.evict(&mut self.backend, name)
    }

    /// Destroy every pooled buffer and program
    pub fn release_all(&mut self) {
        self.buffers.release_all(&mut self.backend);
        self.materials.clear(&mut self.backend);
    }
}

/// Group drawable entities by material name, depth first.
///
/// Entities without a material or without vertices are skipped; a material
/// that is mutably borrowed elsewhere fails the frame.
fn collect<'a>(
    node: &'a mut Node,
    groups: &mut Vec<DrawGroup<'a>>,
    index: &mut HashMap<String, usize>,
    stats: &mut FrameStats,
) -> RenderResult<()> {
    let (name, transform, renderable, children) = node.parts_mut();
    stats.nodes_visited += 1;

    if let Some(renderable) = renderable {
        stats.entities_visited += 1;
        match renderable.material().filter(|_| renderable.is_drawable()).cloned() {
            Some(material) => {
                let key = material
                    .try_borrow()
                    .map(|m| m.name().to_string())
                    .map_err(|_| RenderError::MaterialInUse {
                        entity: name.to_string(),
                    })?;
                let slot = *index.entry(key.clone()).or_insert_with(|| {
                    groups.push(DrawGroup {
                        name: key,
                        items: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[slot].items.push(DrawItem {
                    name,
                    transform,
                    renderable,
                    material,
                });
            }
            None => stats.entities_skipped += 1,
        }
    }

    for child in children {
        collect(child, groups, index, stats)?;
    }
    Ok(())
}

fn entity_uniform(transform: &Transform, renderable: &Renderable, name: &str) -> Option<Uniform> {
    match name {
        "model_matrix" => Some(Uniform::mat4(transform.world_matrix())),
        "normal_matrix" => Some(Uniform::mat4(transform.normal_matrix())),
        "mvp_matrix" => Some(Uniform::mat4(transform.mvp_matrix())),
        "local_matrix" => Some(Uniform::mat4(transform.local_matrix())),
        _ => renderable.uniform(name).cloned(),
    }
}

fn report_missing(
    policy: MissingBindingPolicy,
    missing: &mut Vec<MissingBinding>,
    binding: MissingBinding,
) {
    match policy {
        MissingBindingPolicy::Warn => log::warn!("{}", binding),
        MissingBindingPolicy::Strict => log::debug!("{}", binding),
    }
    missing.push(binding);
}
