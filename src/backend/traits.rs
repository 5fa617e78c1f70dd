//! Core backend abstraction traits
//!
//! The interface mirrors an immediate graphics API: buffers are created and
//! updated in place, programs are compiled once and queried for variable
//! locations, and per-draw state is streamed call by call.

use crate::backend::types::*;
use crate::resources::Uniform;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to compile program '{label}': {message}")]
    ShaderCompilationFailed { label: String, message: String },
    #[error("Buffer write out of bounds: {0}")]
    OutOfBounds(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Handle to a compiled and linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

impl ProgramHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Location of a uniform inside the program it was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

impl UniformLocation {
    pub fn binding(&self) -> u32 {
        self.0
    }
}

/// Main graphics backend trait
///
/// Object safe so that material hooks can receive `&mut dyn GraphicsBackend`.
pub trait GraphicsBackend {
    /// Resize the render surface
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame, clearing color and (optionally) depth
    fn begin_frame(&mut self, clear: &ClearState) -> BackendResult<FrameInfo>;

    /// End and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    // Buffers

    /// Allocate a buffer sized to `data` and upload all of it
    fn create_buffer(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Upload `data` into an existing allocation starting at `offset`
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8])
        -> BackendResult<()>;

    /// Attach a buffer to a binding point
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle);

    /// Release a binding point (the buffer itself stays alive)
    fn unbind_buffer(&mut self, target: BufferTarget);

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    // Programs

    /// Compile and link a vertex + fragment program
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Location of a vertex input, `None` if the program does not declare it
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    /// Location of a uniform, `None` if the program does not declare it
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle);

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    // Per-draw state

    /// Upload a uniform value for the current program
    fn set_uniform(&mut self, location: UniformLocation, uniform: &Uniform);

    /// Point a vertex input of the current program at a buffer
    fn set_vertex_attribute(
        &mut self,
        location: u32,
        buffer: BufferHandle,
        layout: &VertexAttributeLayout,
    );

    /// Detach a vertex input
    fn disable_vertex_attribute(&mut self, location: u32);

    /// Set the index buffer used by indexed draws
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Draw `count` vertices starting at `first`
    fn draw(&mut self, mode: DrawMode, first: u32, count: u32);

    /// Draw `count` indices starting at index `first` of the bound index buffer
    fn draw_indexed(&mut self, mode: DrawMode, first: u32, count: u32);
}
