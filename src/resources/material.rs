//! Material contract: shader sources plus the bindings that feed them

use crate::backend::{DrawMode, GraphicsBackend, ProgramHandle};
use crate::resources::{Attribute, Uniform};
use crate::scene::{FrameState, Renderable, Transform};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Where the renderer fetches an attribute from at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSource {
    /// The entity's own attribute map
    Entity,
    /// The material's attribute map
    Material,
}

/// Where the renderer fetches a uniform from at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSource {
    /// The entity's composed matrices and uniform map
    Entity,
    /// The material's uniform map
    Material,
    /// The active camera
    Camera,
}

/// A named vertex input and where its data comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeBinding {
    pub name: String,
    pub source: AttributeSource,
}

impl AttributeBinding {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: AttributeSource::Entity,
        }
    }

    pub fn material(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: AttributeSource::Material,
        }
    }
}

/// A named uniform and where its value comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformBinding {
    pub name: String,
    pub source: UniformSource,
}

impl UniformBinding {
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: UniformSource::Entity,
        }
    }

    pub fn material(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: UniformSource::Material,
        }
    }

    pub fn camera(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: UniformSource::Camera,
        }
    }
}

/// Uniform and attribute values owned by a material
#[derive(Debug, Clone, Default)]
pub struct MaterialState {
    uniforms: HashMap<String, Uniform>,
    attributes: HashMap<String, Attribute>,
}

impl MaterialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<Uniform>) {
        self.uniforms.insert(name.into(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    pub fn uniform_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        self.uniforms.get_mut(name)
    }

    pub fn remove_uniform(&mut self, name: &str) -> Option<Uniform> {
        self.uniforms.remove(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: Attribute) {
        self.attributes.insert(name.into(), attribute);
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(name, a)| (name.as_str(), a))
    }

    pub(crate) fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut Attribute)> {
        self.attributes.iter_mut().map(|(name, a)| (name.as_str(), a))
    }
}

/// Everything a material hook can see and touch around one draw call
pub struct DrawContext<'a> {
    /// Name of the entity being drawn
    pub entity: &'a str,
    pub transform: &'a Transform,
    pub renderable: &'a mut Renderable,
    pub frame: &'a FrameState,
    /// Program that is current for this draw
    pub program: ProgramHandle,
    pub backend: &'a mut dyn GraphicsBackend,
}

/// A named, cacheable bundle of shader source and binding declarations.
///
/// The name is the program cache key: materials sharing a name must declare
/// identical sources and binding lists. The material pool compares
/// [`Material::signature`] to detect violations.
pub trait Material {
    fn name(&self) -> &str;

    /// WGSL source with a `vs_main` entry point
    fn vertex_shader_source(&self) -> &str;

    /// WGSL source with an `fs_main` entry point
    fn fragment_shader_source(&self) -> &str;

    fn attribute_bindings(&self) -> &[AttributeBinding];

    fn uniform_bindings(&self) -> &[UniformBinding];

    /// Topology override; `None` uses the entity's draw mode
    fn draw_mode(&self) -> Option<DrawMode> {
        None
    }

    fn state(&self) -> &MaterialState;

    fn state_mut(&mut self) -> &mut MaterialState;

    /// Runs right before the entity's draw call
    fn prerender(&mut self, _ctx: &mut DrawContext<'_>) {}

    /// Runs right after the entity's draw call
    fn postrender(&mut self, _ctx: &mut DrawContext<'_>) {}

    /// Fingerprint of the sources and binding lists
    fn signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.vertex_shader_source().hash(&mut hasher);
        self.fragment_shader_source().hash(&mut hasher);
        self.attribute_bindings().hash(&mut hasher);
        self.uniform_bindings().hash(&mut hasher);
        hasher.finish()
    }
}

/// Materials are shared between entities and mutated between frames
pub type SharedMaterial = Rc<RefCell<dyn Material>>;

/// Wrap a material for attachment to one or more entities
pub fn shared<M: Material + 'static>(material: M) -> SharedMaterial {
    Rc::new(RefCell::new(material))
}
