//! Compiled programs cached by material name

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::backend::{GraphicsBackend, ProgramDescriptor, ProgramHandle, UniformLocation};
use crate::renderer::{RenderError, RenderResult, VariableKind};
use crate::resources::{AttributeBinding, Material, UniformBinding};

/// A linked program with every declared binding resolved to a location
#[derive(Debug, Clone)]
pub struct CompiledMaterial {
    pub name: String,
    pub program: ProgramHandle,
    pub signature: u64,
    pub attributes: Vec<(AttributeBinding, u32)>,
    pub uniforms: Vec<(UniformBinding, UniformLocation)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialPoolStats {
    pub compilations: u64,
    pub cache_hits: u64,
}

/// Compiles each material name once.
///
/// The name is the cache key, so two materials with the same name must be
/// the same effect. A signature mismatch on a cache hit is reported instead
/// of silently drawing with the wrong program.
#[derive(Debug, Default)]
pub struct MaterialPool {
    compiled: HashMap<String, CompiledMaterial>,
    stats: MaterialPoolStats,
}

impl MaterialPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile on first use, then make the program current
    pub fn use_material(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        material: &dyn Material,
    ) -> RenderResult<&CompiledMaterial> {
        let name = material.name();

        let compiled = match self.compiled.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                if entry.get().signature != material.signature() {
                    return Err(RenderError::MaterialAliased {
                        name: name.to_string(),
                    });
                }
                self.stats.cache_hits += 1;
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                let compiled = Self::compile(backend, material)?;
                log::debug!(
                    "Compiled material '{}' ({} attributes, {} uniforms)",
                    name,
                    compiled.attributes.len(),
                    compiled.uniforms.len()
                );
                self.stats.compilations += 1;
                entry.insert(compiled)
            }
        };

        backend.use_program(compiled.program);
        Ok(compiled)
    }

    fn compile(
        backend: &mut dyn GraphicsBackend,
        material: &dyn Material,
    ) -> RenderResult<CompiledMaterial> {
        let name = material.name();
        let program = backend.create_program(&ProgramDescriptor {
            label: name.to_string(),
            vertex_source: material.vertex_shader_source().to_string(),
            fragment_source: material.fragment_shader_source().to_string(),
        })?;

        let missing = |variable: &str, kind| RenderError::MissingLocation {
            material: name.to_string(),
            variable: variable.to_string(),
            kind,
        };

        let mut attributes = Vec::with_capacity(material.attribute_bindings().len());
        for binding in material.attribute_bindings() {
            match backend.attribute_location(program, &binding.name) {
                Some(location) => attributes.push((binding.clone(), location)),
                None => {
                    backend.destroy_program(program);
                    return Err(missing(&binding.name, VariableKind::Attribute));
                }
            }
        }

        let mut uniforms = Vec::with_capacity(material.uniform_bindings().len());
        for binding in material.uniform_bindings() {
            match backend.uniform_location(program, &binding.name) {
                Some(location) => uniforms.push((binding.clone(), location)),
                None => {
                    backend.destroy_program(program);
                    return Err(missing(&binding.name, VariableKind::Uniform));
                }
            }
        }

        Ok(CompiledMaterial {
            name: name.to_string(),
            program,
            signature: material.signature(),
            attributes,
            uniforms,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CompiledMaterial> {
        self.compiled.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    /// Drop the cached program for `name`; the next use recompiles
    pub fn evict(&mut self, backend: &mut dyn GraphicsBackend, name: &str) -> bool {
        match self.compiled.remove(name) {
            Some(compiled) => {
                backend.destroy_program(compiled.program);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, compiled) in self.compiled.drain() {
            backend.destroy_program(compiled.program);
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn stats(&self) -> MaterialPoolStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::resources::{ColorMaterial, ShaderMaterial};
    use glam::Vec4;

    const VS: &str = r#"
@group(0) @binding(0) var<uniform> mvp_matrix: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return mvp_matrix * vec4<f32>(position, 1.0);
}
"#;

    const FS: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

    #[test]
    fn test_second_use_is_a_cache_hit() {
        let mut backend = HeadlessBackend::default();
        let mut pool = MaterialPool::new();
        let material = ColorMaterial::new(Vec4::new(1.0, 0.0, 0.0, 1.0));

        let first = pool.use_material(&mut backend, &material).unwrap().program;
        let second = pool.use_material(&mut backend, &material).unwrap().program;

        assert_eq!(first, second);
        assert_eq!(
            pool.stats(),
            MaterialPoolStats {
                compilations: 1,
                cache_hits: 1
            }
        );
        assert_eq!(backend.current_program(), Some(first));
    }

    #[test]
    fn test_undeclared_variable_fails_compilation() {
        let mut backend = HeadlessBackend::default();
        let mut pool = MaterialPool::new();
        let material = ShaderMaterial::new("broken", VS, FS)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix"))
            .with_uniform(UniformBinding::material("tint"));

        let err = pool.use_material(&mut backend, &material).unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingLocation {
                material: "broken".into(),
                variable: "tint".into(),
                kind: VariableKind::Uniform,
            }
        );
        assert!(pool.is_empty());
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_evict_destroys_program() {
        let mut backend = HeadlessBackend::default();
        let mut pool = MaterialPool::new();
        let material = ShaderMaterial::new("plain", VS, FS)
            .with_attribute(AttributeBinding::entity("position"))
            .with_uniform(UniformBinding::entity("mvp_matrix"));

        pool.use_material(&mut backend, &material).unwrap();
        assert!(pool.evict(&mut backend, "plain"));
        assert!(!pool.contains("plain"));
        assert_eq!(backend.live_programs(), 0);

        pool.use_material(&mut backend, &material).unwrap();
        assert_eq!(pool.stats().compilations, 2);
    }
}
