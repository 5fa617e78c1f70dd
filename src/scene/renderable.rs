//! Drawable payload of a scene node

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::backend::DrawMode;
use crate::resources::{Attribute, SharedMaterial, Uniform};

/// Vertex data, draw parameters and material of a render entity.
///
/// A node carrying a `Renderable` is a render entity. It is drawn only when
/// it has a material and a nonzero vertex count; otherwise the renderer
/// skips it.
#[derive(Clone, Default)]
pub struct Renderable {
    attributes: BTreeMap<String, Attribute>,
    uniforms: HashMap<String, Uniform>,
    indices: Option<Attribute>,
    vertex_count: u32,
    vertex_offset: u32,
    draw_mode: DrawMode,
    material: Option<SharedMaterial>,
}

impl Renderable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, material: SharedMaterial) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Index data; the vertex count then counts indices
    pub fn with_indices(mut self, indices: Attribute) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_vertex_count(mut self, count: u32) -> Self {
        self.vertex_count = count;
        self
    }

    pub fn with_vertex_offset(mut self, offset: u32) -> Self {
        self.vertex_offset = offset;
        self
    }

    pub fn with_draw_mode(mut self, mode: DrawMode) -> Self {
        self.draw_mode = mode;
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<Uniform>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    pub fn material(&self) -> Option<&SharedMaterial> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Option<SharedMaterial>) {
        self.material = material;
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: Attribute) -> Option<Attribute> {
        self.attributes.insert(name.into(), attribute)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(name, a)| (name.as_str(), a))
    }

    pub(crate) fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut Attribute)> {
        self.attributes.iter_mut().map(|(name, a)| (name.as_str(), a))
    }

    pub fn indices(&self) -> Option<&Attribute> {
        self.indices.as_ref()
    }

    pub fn indices_mut(&mut self) -> Option<&mut Attribute> {
        self.indices.as_mut()
    }

    pub fn set_indices(&mut self, indices: Option<Attribute>) {
        self.indices = indices;
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    pub fn uniform_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        self.uniforms.get_mut(name)
    }

    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<Uniform>) {
        self.uniforms.insert(name.into(), value.into());
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn set_vertex_count(&mut self, count: u32) {
        self.vertex_count = count;
    }

    pub fn vertex_offset(&self) -> u32 {
        self.vertex_offset
    }

    pub fn set_vertex_offset(&mut self, offset: u32) {
        self.vertex_offset = offset;
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw_mode = mode;
    }

    /// Has a material and something to draw
    pub fn is_drawable(&self) -> bool {
        self.vertex_count > 0 && self.material.is_some()
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let material = self
            .material
            .as_ref()
            .map(|m| match m.try_borrow() {
                Ok(material) => material.name().to_string(),
                Err(_) => "<borrowed>".to_string(),
            });
        f.debug_struct("Renderable")
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("indexed", &self.indices.is_some())
            .field("vertex_count", &self.vertex_count)
            .field("vertex_offset", &self.vertex_offset)
            .field("draw_mode", &self.draw_mode)
            .field("material", &material)
            .finish()
    }
}
