//! Headless backend for testing and tooling.
//!
//! This backend doesn't touch a GPU. It keeps buffer contents in memory,
//! compiles programs through the shared WGSL reflection and records every
//! call in a command log that tests can inspect.

use std::collections::HashMap;

use crate::backend::reflect::ProgramReflection;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::Uniform;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame {
        clear: ClearState,
    },
    EndFrame,
    CreateBuffer {
        buffer: BufferHandle,
        target: BufferTarget,
        usage: BufferUsageHint,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    BindBuffer {
        target: BufferTarget,
        buffer: BufferHandle,
    },
    UnbindBuffer {
        target: BufferTarget,
    },
    DestroyBuffer {
        buffer: BufferHandle,
    },
    CreateProgram {
        program: ProgramHandle,
        label: String,
    },
    UseProgram {
        program: ProgramHandle,
    },
    DestroyProgram {
        program: ProgramHandle,
    },
    SetUniform {
        name: String,
        binding: u32,
        value: Uniform,
    },
    SetVertexAttribute {
        location: u32,
        buffer: BufferHandle,
        layout: VertexAttributeLayout,
    },
    DisableVertexAttribute {
        location: u32,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    Draw {
        mode: DrawMode,
        first: u32,
        count: u32,
    },
    DrawIndexed {
        mode: DrawMode,
        first: u32,
        count: u32,
    },
}

/// Counters kept by the headless backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub frames: u64,
    pub buffers_allocated: u64,
    pub bytes_uploaded: u64,
    pub programs_compiled: u64,
    pub draw_calls: u64,
}

#[derive(Debug)]
struct HeadlessBuffer {
    target: BufferTarget,
    contents: Vec<u8>,
}

#[derive(Debug)]
struct HeadlessProgram {
    label: String,
    reflection: ProgramReflection,
}

/// Backend that records calls instead of rendering
#[derive(Debug)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    next_handle: u64,
    buffers: HashMap<u64, HeadlessBuffer>,
    programs: HashMap<u64, HeadlessProgram>,
    current_program: Option<ProgramHandle>,
    bound: HashMap<BufferTarget, BufferHandle>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,
    in_frame: bool,
    commands: Vec<Command>,
    stats: HeadlessStats,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Headless backend initialized: {}x{}", width, height);
        Self {
            width,
            height,
            next_handle: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            bound: HashMap::new(),
            index_buffer: None,
            in_frame: false,
            commands: Vec::new(),
            stats: HeadlessStats::default(),
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Headless Backend"
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the command log
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.contents.as_slice())
    }

    pub fn buffer_capacity(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).map(|b| b.contents.len() as u64)
    }

    pub fn buffer_target(&self, buffer: BufferHandle) -> Option<BufferTarget> {
        self.buffers.get(&buffer.0).map(|b| b.target)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.bound.get(&target).copied()
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn allocate_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn record(&mut self, command: Command) {
        log::trace!("HeadlessBackend: {:?}", command);
        self.commands.push(command);
    }

    fn record_draw(&mut self, command: Command) {
        if !self.in_frame {
            log::warn!("HeadlessBackend: draw outside of a frame");
        }
        self.stats.draw_calls += 1;
        self.record(command);
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self, clear: &ClearState) -> BackendResult<FrameInfo> {
        self.in_frame = true;
        self.record(Command::BeginFrame { clear: *clear });
        Ok(FrameInfo {
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.in_frame = false;
        self.stats.frames += 1;
        self.record(Command::EndFrame);
        Ok(())
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = BufferHandle(self.allocate_handle());
        self.buffers.insert(
            buffer.0,
            HeadlessBuffer {
                target: desc.target,
                contents: data.to_vec(),
            },
        );
        self.stats.buffers_allocated += 1;
        self.stats.bytes_uploaded += data.len() as u64;
        self.record(Command::CreateBuffer {
            buffer,
            target: desc.target,
            usage: desc.usage,
            size: data.len() as u64,
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let entry = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })?;

        let start = offset as usize;
        let end = start + data.len();
        if end > entry.contents.len() {
            return Err(BackendError::OutOfBounds(format!(
                "{} bytes at offset {} into buffer {} of {} bytes",
                data.len(),
                offset,
                buffer.0,
                entry.contents.len()
            )));
        }
        entry.contents[start..end].copy_from_slice(data);

        self.stats.bytes_uploaded += data.len() as u64;
        self.record(Command::WriteBuffer {
            buffer,
            offset,
            size: data.len() as u64,
        });
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle) {
        self.bound.insert(target, buffer);
        self.record(Command::BindBuffer { target, buffer });
    }

    fn unbind_buffer(&mut self, target: BufferTarget) {
        self.bound.remove(&target);
        self.record(Command::UnbindBuffer { target });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("HeadlessBackend: destroying unknown buffer {}", buffer.0);
            return;
        }
        self.bound.retain(|_, bound| *bound != buffer);
        if matches!(self.index_buffer, Some((bound, _)) if bound == buffer) {
            self.index_buffer = None;
        }
        self.record(Command::DestroyBuffer { buffer });
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let reflection = ProgramReflection::from_wgsl(desc)?;
        let program = ProgramHandle(self.allocate_handle());
        self.programs.insert(
            program.0,
            HeadlessProgram {
                label: desc.label.clone(),
                reflection,
            },
        );
        self.stats.programs_compiled += 1;
        self.record(Command::CreateProgram {
            program,
            label: desc.label.clone(),
        });
        Ok(program)
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .get(&program.0)?
            .reflection
            .attribute_location(name)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program.0)?
            .reflection
            .uniform(name)
            .map(|slot| UniformLocation(slot.binding))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if !self.programs.contains_key(&program.0) {
            log::warn!("HeadlessBackend: using unknown program {}", program.0);
        }
        self.current_program = Some(program);
        self.record(Command::UseProgram { program });
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if let Some(removed) = self.programs.remove(&program.0) {
            log::trace!("HeadlessBackend: destroyed program '{}'", removed.label);
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.record(Command::DestroyProgram { program });
    }

    fn set_uniform(&mut self, location: UniformLocation, uniform: &Uniform) {
        let name = self
            .current_program
            .and_then(|program| self.programs.get(&program.0))
            .and_then(|program| program.reflection.uniform_by_binding(location.0))
            .map(|slot| slot.name.clone())
            .unwrap_or_default();
        self.record(Command::SetUniform {
            name,
            binding: location.0,
            value: uniform.clone(),
        });
    }

    fn set_vertex_attribute(
        &mut self,
        location: u32,
        buffer: BufferHandle,
        layout: &VertexAttributeLayout,
    ) {
        self.record(Command::SetVertexAttribute {
            location,
            buffer,
            layout: *layout,
        });
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.record(Command::DisableVertexAttribute { location });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.index_buffer = Some((buffer, format));
        self.record(Command::SetIndexBuffer { buffer, format });
    }

    fn draw(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.record_draw(Command::Draw { mode, first, count });
    }

    fn draw_indexed(&mut self, mode: DrawMode, first: u32, count: u32) {
        if self.index_buffer.is_none() {
            log::warn!("HeadlessBackend: indexed draw without an index buffer");
        }
        self.record_draw(Command::DrawIndexed { mode, first, count });
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_desc() -> BufferDescriptor {
        BufferDescriptor {
            label: None,
            target: BufferTarget::Array,
            usage: BufferUsageHint::StaticDraw,
            data_type: DataType::F32,
        }
    }

    #[test]
    fn test_write_buffer_updates_in_place() {
        let mut backend = HeadlessBackend::default();
        let buffer = backend.create_buffer(&vertex_desc(), &[0u8; 8]).unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();

        assert_eq!(backend.buffer_contents(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
        assert_eq!(backend.stats().bytes_uploaded, 12);
        assert_eq!(backend.stats().buffers_allocated, 1);
    }

    #[test]
    fn test_write_past_capacity_fails() {
        let mut backend = HeadlessBackend::default();
        let buffer = backend.create_buffer(&vertex_desc(), &[0u8; 4]).unwrap();
        let err = backend.write_buffer(buffer, 2, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, BackendError::OutOfBounds(_)));
    }

    #[test]
    fn test_unknown_buffer_is_invalid_handle() {
        let mut backend = HeadlessBackend::default();
        let err = backend.write_buffer(BufferHandle(42), 0, &[0]).unwrap_err();
        assert_eq!(err, BackendError::InvalidHandle { kind: "buffer", id: 42 });
    }

    #[test]
    fn test_destroy_clears_bindings() {
        let mut backend = HeadlessBackend::default();
        let buffer = backend.create_buffer(&vertex_desc(), &[0u8; 4]).unwrap();
        backend.bind_buffer(BufferTarget::Array, buffer);
        backend.destroy_buffer(buffer);

        assert_eq!(backend.bound_buffer(BufferTarget::Array), None);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_resize_ignores_zero_extent() {
        let mut backend = HeadlessBackend::new(320, 240);
        backend.resize(0, 100);
        assert_eq!(backend.surface_size(), (320, 240));
        backend.resize(640, 480);
        assert_eq!(backend.surface_size(), (640, 480));
    }
}
