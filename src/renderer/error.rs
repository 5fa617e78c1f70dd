//! Renderer error types

use std::fmt;
use thiserror::Error;

use crate::backend::BackendError;

/// Kind of shader variable a binding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Attribute,
    Uniform,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Attribute => write!(f, "attribute"),
            VariableKind::Uniform => write!(f, "uniform"),
        }
    }
}

/// A declared binding that had no value in its source map at draw time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBinding {
    pub entity: String,
    pub material: String,
    pub variable: String,
    pub kind: VariableKind,
}

impl fmt::Display for MissingBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity '{}' (material '{}'): {} '{}' has no value",
            self.entity, self.material, self.kind, self.variable
        )
    }
}

/// Renderer error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Material '{material}': {kind} '{variable}' is not declared by the linked program")]
    MissingLocation {
        material: String,
        variable: String,
        kind: VariableKind,
    },
    #[error("Material name '{name}' is shared by materials with different shader sources or bindings")]
    MaterialAliased { name: String },
    #[error("Material of entity '{entity}' is already borrowed")]
    MaterialInUse { entity: String },
    #[error("{} binding(s) had no value at draw time", .0.len())]
    MissingBindings(Vec<MissingBinding>),
}

pub type RenderResult<T> = Result<T, RenderError>;
