//! WGSL program reflection
//!
//! Both backends resolve attribute and uniform locations from the same
//! reflection data, so a program that links on the headless backend exposes
//! exactly the variables it would expose on the GPU.

use crate::backend::traits::{BackendError, BackendResult};
use crate::backend::types::ProgramDescriptor;

/// Entry point name of the vertex stage
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point name of the fragment stage
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// A `var<uniform>` declared in bind group 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub binding: u32,
    /// Size of the uniform's type in bytes
    pub size: u32,
}

/// Variables exposed by a linked program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramReflection {
    /// Vertex inputs of the vertex entry point as (name, location)
    pub vertex_inputs: Vec<(String, u32)>,
    /// Uniform slots used by either stage, sorted by binding
    pub uniforms: Vec<UniformSlot>,
    /// Resources other than uniform buffers (textures, samplers, storage)
    pub other_resources: Vec<String>,
}

impl ProgramReflection {
    /// Parse, validate and reflect a vertex + fragment program
    pub fn from_wgsl(desc: &ProgramDescriptor) -> BackendResult<Self> {
        let vertex = parse_stage(&desc.label, &desc.vertex_source, naga::ShaderStage::Vertex)?;
        let fragment =
            parse_stage(&desc.label, &desc.fragment_source, naga::ShaderStage::Fragment)?;

        let mut reflection = Self {
            vertex_inputs: vertex_inputs(&vertex),
            ..Default::default()
        };

        for module in [&vertex, &fragment] {
            reflection.collect_globals(&desc.label, module)?;
        }
        reflection.uniforms.sort_by_key(|slot| slot.binding);

        log::trace!(
            "Reflected program '{}': {} vertex inputs, {} uniforms",
            desc.label,
            reflection.vertex_inputs.len(),
            reflection.uniforms.len()
        );

        Ok(reflection)
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, location)| *location)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|slot| slot.name == name)
    }

    pub fn uniform_by_binding(&self, binding: u32) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|slot| slot.binding == binding)
    }

    fn collect_globals(&mut self, label: &str, module: &naga::Module) -> BackendResult<()> {
        for (_, global) in module.global_variables.iter() {
            let name = global.name.clone().unwrap_or_default();
            if global.space != naga::AddressSpace::Uniform {
                if global.binding.is_some() {
                    self.other_resources.push(name);
                }
                continue;
            }

            let Some(binding) = &global.binding else {
                continue;
            };
            if binding.group != 0 {
                return Err(compile_error(
                    label,
                    format!("uniform '{}' must live in bind group 0", name),
                ));
            }

            let size = module.types[global.ty].inner.size(module.to_ctx());
            match self.uniforms.iter_mut().find(|slot| slot.binding == binding.binding) {
                Some(slot) if slot.name == name => slot.size = slot.size.max(size),
                Some(slot) => {
                    return Err(compile_error(
                        label,
                        format!(
                            "binding {} is declared as both '{}' and '{}'",
                            binding.binding, slot.name, name
                        ),
                    ))
                }
                None => {
                    if self.uniform(&name).is_some() {
                        return Err(compile_error(
                            label,
                            format!("uniform '{}' is declared at two bindings", name),
                        ));
                    }
                    self.uniforms.push(UniformSlot {
                        name,
                        binding: binding.binding,
                        size,
                    });
                }
            }
        }
        Ok(())
    }
}

fn compile_error(label: &str, message: String) -> BackendError {
    BackendError::ShaderCompilationFailed {
        label: label.to_string(),
        message,
    }
}

fn parse_stage(label: &str, source: &str, stage: naga::ShaderStage) -> BackendResult<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| compile_error(label, format!("{:?} stage: {}", stage, e)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| compile_error(label, format!("{:?} stage: {}", stage, e)))?;

    let entry = match stage {
        naga::ShaderStage::Vertex => VERTEX_ENTRY,
        _ => FRAGMENT_ENTRY,
    };
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == stage && ep.name == entry)
    {
        return Err(compile_error(
            label,
            format!("missing {:?} entry point '{}'", stage, entry),
        ));
    }

    Ok(module)
}

fn vertex_inputs(module: &naga::Module) -> Vec<(String, u32)> {
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Vertex && ep.name == VERTEX_ENTRY)
    else {
        return Vec::new();
    };

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        match &argument.binding {
            Some(naga::Binding::Location { location, .. }) => {
                inputs.push((argument.name.clone().unwrap_or_default(), *location));
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for member in members {
                        if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                            inputs.push((member.name.clone().unwrap_or_default(), *location));
                        }
                    }
                }
            }
        }
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(2) normal: vec3<f32>,
}

@group(0) @binding(0) var<uniform> mvp_matrix: mat4x4<f32>;
@group(0) @binding(1) var<uniform> tint: vec4<f32>;

@vertex
fn vs_main(in: VertexInput, @builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return mvp_matrix * vec4<f32>(in.position + in.normal * 0.0, 1.0) + tint * 0.0;
}
"#;

    const FRAGMENT: &str = r#"
@group(0) @binding(1) var<uniform> tint: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint;
}
"#;

    fn descriptor(vertex: &str, fragment: &str) -> ProgramDescriptor {
        ProgramDescriptor {
            label: "test".into(),
            vertex_source: vertex.into(),
            fragment_source: fragment.into(),
        }
    }

    #[test]
    fn test_reflects_struct_inputs_and_shared_uniforms() {
        let reflection = ProgramReflection::from_wgsl(&descriptor(VERTEX, FRAGMENT)).unwrap();

        assert_eq!(reflection.attribute_location("position"), Some(0));
        assert_eq!(reflection.attribute_location("normal"), Some(2));
        assert_eq!(reflection.attribute_location("index"), None);

        assert_eq!(reflection.uniforms.len(), 2);
        let mvp = reflection.uniform("mvp_matrix").unwrap();
        assert_eq!((mvp.binding, mvp.size), (0, 64));
        let tint = reflection.uniform("tint").unwrap();
        assert_eq!((tint.binding, tint.size), (1, 16));
    }

    #[test]
    fn test_parse_error_names_program() {
        let err = ProgramReflection::from_wgsl(&descriptor("fn broken(", FRAGMENT)).unwrap_err();
        match err {
            BackendError::ShaderCompilationFailed { label, .. } => assert_eq!(label, "test"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point_is_rejected() {
        let err = ProgramReflection::from_wgsl(&descriptor(FRAGMENT, FRAGMENT)).unwrap_err();
        assert!(err.to_string().contains("vs_main"));
    }

    #[test]
    fn test_conflicting_binding_is_rejected() {
        let fragment = r#"
@group(0) @binding(1) var<uniform> other: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return other;
}
"#;
        let err = ProgramReflection::from_wgsl(&descriptor(VERTEX, fragment)).unwrap_err();
        assert!(err.to_string().contains("binding 1"));
    }
}
