//! wgpu backend implementation
//!
//! The immediate calls of [`GraphicsBackend`] are recorded while a frame is
//! open and replayed in a single render pass when the frame ends. Uniform
//! values are packed per draw into a frame arena and bound with dynamic
//! offsets; pipelines are created lazily per program, topology and vertex
//! layout.

mod convert;
mod frame;

use crate::backend::reflect::{ProgramReflection, UniformSlot, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::backend::topology;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::Uniform;
use frame::{IndexSource, PipelineKey, RecordedDraw, UniformArena};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::sync::Arc;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Configuration for the wgpu backend
#[derive(Debug, Clone)]
pub struct WgpuBackendConfig {
    /// Enable vsync
    pub vsync: bool,
    pub power_preference: wgpu::PowerPreference,
    /// Label for the device and frame encoder
    pub label: String,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            label: "Scene Renderer".to_string(),
        }
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    target: BufferTarget,
    capacity: u64,
    /// CPU copy of index data, needed to expand loops and fans
    shadow: Option<Vec<u8>>,
}

struct GpuProgram {
    label: String,
    reflection: ProgramReflection,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    /// Last value set per uniform binding; persists across frames
    uniform_values: BTreeMap<u32, Vec<u8>>,
    /// Bind group over the uniform arena, tagged with the arena generation
    bind_group: Option<(u64, wgpu::BindGroup)>,
}

struct DepthTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

struct GrowableBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    generation: u64,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    config: WgpuBackendConfig,
    depth: Option<DepthTarget>,

    // Resource storage
    buffers: HashMap<u64, GpuBuffer>,
    programs: HashMap<u64, GpuProgram>,
    pipeline_ids: HashMap<PipelineKey, u64>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,

    // Handle counters
    next_buffer_id: u64,
    next_program_id: u64,
    next_pipeline_id: u64,

    // Current draw state
    current_program: Option<ProgramHandle>,
    bound: HashMap<BufferTarget, BufferHandle>,
    attributes: BTreeMap<u32, (BufferHandle, VertexAttributeLayout)>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,

    // Frame recording
    current_texture: Option<wgpu::SurfaceTexture>,
    clear: ClearState,
    draws: Vec<RecordedDraw>,
    uniform_arena: UniformArena,
    uniform_buffer: Option<GrowableBuffer>,
    expanded_indices: Vec<u32>,
    index_arena: Option<GrowableBuffer>,
    pending_destroy: Vec<u64>,
    frame_error: Option<BackendError>,
}

impl WgpuBackend {
    /// Create a backend rendering into `window`, blocking on device creation
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(window: Arc<winit::window::Window>, config: WgpuBackendConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    /// Async initialization - used directly on web, wrapped by `new` on native
    pub async fn new_async(
        window: Arc<winit::window::Window>,
        config: WgpuBackendConfig,
    ) -> BackendResult<Self> {
        #[cfg(target_arch = "wasm32")]
        let (instance, surface, adapter, device, queue) =
            Self::init_web(window.clone(), &config).await?;

        #[cfg(not(target_arch = "wasm32"))]
        let (instance, surface, adapter, device, queue) =
            Self::init_native(window.clone(), &config).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("surface reports no formats".into())
            })?;

        let present_mode = if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let max_size = device.limits().max_texture_dimension_2d;
        let (width, height) = convert::clamp_surface_size(size.width, size.height, max_size);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            config,
            depth: None,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            pipeline_ids: HashMap::new(),
            pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_program_id: 1,
            next_pipeline_id: 1,
            current_program: None,
            bound: HashMap::new(),
            attributes: BTreeMap::new(),
            index_buffer: None,
            current_texture: None,
            clear: ClearState {
                color: [0.0, 0.0, 0.0, 1.0],
                depth: None,
            },
            draws: Vec::new(),
            uniform_arena: UniformArena::new(uniform_alignment),
            uniform_buffer: None,
            expanded_indices: Vec::new(),
            index_arena: None,
            pending_destroy: Vec::new(),
            frame_error: None,
        })
    }

    /// Web-specific initialization with WebGL2 default and WebGPU fallback
    #[cfg(target_arch = "wasm32")]
    async fn init_web(
        window: Arc<winit::window::Window>,
        config: &WgpuBackendConfig,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        log::info!("Trying WebGL2 backend...");
        match Self::try_init_backend(
            window.clone(),
            config,
            wgpu::Backends::GL,
            wgpu::Limits::downlevel_webgl2_defaults(),
            "WebGL2",
        )
        .await
        {
            Ok(result) => return Ok(result),
            Err(e) => log::warn!("WebGL2 failed ({}), trying WebGPU backend...", e),
        }

        Self::try_init_backend(
            window,
            config,
            wgpu::Backends::BROWSER_WEBGPU,
            wgpu::Limits::default(),
            "WebGPU",
        )
        .await
        .map_err(|_| {
            BackendError::InitializationFailed(
                "Neither WebGL2 nor WebGPU backends could be initialized".into(),
            )
        })
    }

    /// Try to initialize a specific backend
    #[cfg(target_arch = "wasm32")]
    async fn try_init_backend(
        window: Arc<winit::window::Window>,
        config: &WgpuBackendConfig,
        backends: wgpu::Backends,
        limits: wgpu::Limits,
        backend_name: &str,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                BackendError::InitializationFailed(format!("No {} adapter found", backend_name))
            })?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Found adapter: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(&config.label),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    /// Native initialization
    #[cfg(not(target_arch = "wasm32"))]
    async fn init_native(
        window: Arc<winit::window::Window>,
        config: &WgpuBackendConfig,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::util::backend_bits_from_env().unwrap_or_else(wgpu::Backends::all),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(&config.label),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    /// Surface texture format
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Number of pipelines created so far
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn fail(&mut self, error: BackendError) {
        log::error!("wgpu backend: {}", error);
        if self.frame_error.is_none() {
            self.frame_error = Some(error);
        }
    }

    fn ensure_depth_target(&mut self) {
        let size = (self.surface_config.width, self.surface_config.height);
        if matches!(&self.depth, Some(depth) if depth.size == size) {
            return;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Buffer"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth = Some(DepthTarget {
            _texture: texture,
            view,
            size,
        });
    }

    fn pipeline_for(&mut self, key: PipelineKey) -> BackendResult<u64> {
        if let Some(id) = self.pipeline_ids.get(&key) {
            return Ok(*id);
        }

        let program = self
            .programs
            .get(&key.program)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: key.program,
            })?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .vertex
            .iter()
            .map(|(location, format, _)| {
                [wgpu::VertexAttribute {
                    format: *format,
                    offset: 0,
                    shader_location: *location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .vertex
            .iter()
            .zip(&attributes)
            .map(|((_, _, stride), attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex_module,
                    entry_point: VERTEX_ENTRY,
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: key.topology,
                    ..Default::default()
                },
                depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment_module,
                    entry_point: FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
            });

        log::debug!(
            "Created pipeline for '{}' ({:?}, {} vertex buffers)",
            program.label,
            key.topology,
            key.vertex.len()
        );

        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;
        self.pipelines.insert(id, pipeline);
        self.pipeline_ids.insert(key, id);
        Ok(id)
    }

    fn record_draw(&mut self, mode: DrawMode, first: u32, count: u32, indexed: bool) -> BackendResult<()> {
        if self.current_texture.is_none() {
            return Err(BackendError::Unsupported("draw outside of a frame".into()));
        }
        let program_handle = self
            .current_program
            .ok_or_else(|| BackendError::Unsupported("draw without a current program".into()))?;
        let program = self
            .programs
            .get(&program_handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program_handle.0,
            })?;

        let mut inputs = program.reflection.vertex_inputs.clone();
        inputs.sort_by_key(|(_, location)| *location);

        let mut vertex = Vec::with_capacity(inputs.len());
        let mut vertex_buffers = Vec::with_capacity(inputs.len());
        for (name, location) in &inputs {
            let Some((buffer, layout)) = self.attributes.get(location) else {
                log::warn!(
                    "Skipping draw with '{}': vertex input '{}' has no buffer",
                    program.label,
                    name
                );
                return Ok(());
            };
            if !self.buffers.contains_key(&buffer.0) {
                return Err(BackendError::InvalidHandle {
                    kind: "buffer",
                    id: buffer.0,
                });
            }
            let format = convert::vertex_format(layout)?;
            let stride = layout.effective_stride();
            if stride % wgpu::VERTEX_STRIDE_ALIGNMENT != 0 || layout.offset % 4 != 0 {
                return Err(BackendError::Unsupported(format!(
                    "vertex input '{}' with stride {} and offset {} is not 4-byte aligned",
                    name, stride, layout.offset
                )));
            }
            vertex.push((*location, format, stride));
            vertex_buffers.push((buffer.0, layout.offset));
        }

        let uniform_offsets: Vec<u32> = program
            .reflection
            .uniforms
            .iter()
            .map(|slot| {
                let bytes = program
                    .uniform_values
                    .get(&slot.binding)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                self.uniform_arena.push(bytes, binding_size(slot) as usize)
            })
            .collect();

        let (native, expand) = frame::native_mode(mode);
        let (index, range) = if expand {
            let indices: Vec<u32> = if indexed {
                let (buffer, format) = self.index_buffer.ok_or_else(|| {
                    BackendError::Unsupported("indexed draw without an index buffer".into())
                })?;
                let shadow = self
                    .buffers
                    .get(&buffer.0)
                    .and_then(|b| b.shadow.as_deref())
                    .unwrap_or(&[]);
                convert::decode_indices(shadow, format, first, count)
            } else {
                (first..first + count).collect()
            };
            let expanded = topology::expand(mode, &indices).unwrap_or(indices);
            let start = self.expanded_indices.len() as u32;
            self.expanded_indices.extend_from_slice(&expanded);
            (
                Some(IndexSource::Expanded),
                start..start + expanded.len() as u32,
            )
        } else if indexed {
            let (buffer, format) = self.index_buffer.ok_or_else(|| {
                BackendError::Unsupported("indexed draw without an index buffer".into())
            })?;
            (
                Some(IndexSource::Buffer(buffer.0, convert::index_format(format))),
                first..first + count,
            )
        } else {
            (None, first..first + count)
        };

        let key = PipelineKey {
            program: program_handle.0,
            topology: convert::topology(native),
            vertex,
            depth: self.clear.depth.is_some(),
        };
        let pipeline = self.pipeline_for(key)?;

        self.draws.push(RecordedDraw {
            pipeline,
            program: program_handle.0,
            uniform_offsets,
            vertex_buffers,
            index,
            range,
        });
        Ok(())
    }

    /// Make sure `slot` holds at least `size` bytes, reallocating if needed
    fn ensure_growable(
        device: &wgpu::Device,
        slot: &mut Option<GrowableBuffer>,
        size: u64,
        usage: wgpu::BufferUsages,
        label: &str,
    ) {
        let generation = match slot {
            Some(existing) if existing.capacity >= size => return,
            Some(existing) => existing.generation + 1,
            None => 1,
        };
        let capacity = convert::align_to(size.next_power_of_two().max(256), 256);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        *slot = Some(GrowableBuffer {
            buffer,
            capacity,
            generation,
        });
    }

    /// Upload the frame arenas and refresh bind groups that point at them
    fn upload_frame_data(&mut self) {
        if !self.uniform_arena.is_empty() {
            let size = convert::align_to(self.uniform_arena.bytes().len() as u64, 4);
            Self::ensure_growable(
                &self.device,
                &mut self.uniform_buffer,
                size,
                wgpu::BufferUsages::UNIFORM,
                "Frame Uniforms",
            );
            if let Some(arena) = &self.uniform_buffer {
                let mut bytes = self.uniform_arena.bytes().to_vec();
                bytes.resize(size as usize, 0);
                self.queue.write_buffer(&arena.buffer, 0, &bytes);

                for draw in &self.draws {
                    let Some(program) = self.programs.get_mut(&draw.program) else {
                        continue;
                    };
                    let Some(layout) = &program.bind_group_layout else {
                        continue;
                    };
                    if matches!(&program.bind_group, Some((generation, _)) if *generation == arena.generation)
                    {
                        continue;
                    }
                    let entries: Vec<wgpu::BindGroupEntry> = program
                        .reflection
                        .uniforms
                        .iter()
                        .map(|slot| wgpu::BindGroupEntry {
                            binding: slot.binding,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &arena.buffer,
                                offset: 0,
                                size: NonZeroU64::new(binding_size(slot)),
                            }),
                        })
                        .collect();
                    let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&program.label),
                        layout,
                        entries: &entries,
                    });
                    program.bind_group = Some((arena.generation, bind_group));
                }
            }
        }

        if !self.expanded_indices.is_empty() {
            let bytes: &[u8] = bytemuck::cast_slice(&self.expanded_indices);
            Self::ensure_growable(
                &self.device,
                &mut self.index_arena,
                bytes.len() as u64,
                wgpu::BufferUsages::INDEX,
                "Expanded Indices",
            );
            if let Some(arena) = &self.index_arena {
                self.queue.write_buffer(&arena.buffer, 0, bytes);
            }
        }
    }

    fn replay(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let depth_attachment = match (&self.clear.depth, &self.depth) {
            (Some(value), Some(depth)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(*value),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            _ => None,
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.config.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(convert::clear_color(self.clear.color)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &self.draws {
            let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                continue;
            };
            render_pass.set_pipeline(pipeline);

            if let Some(program) = self.programs.get(&draw.program) {
                if let Some((_, bind_group)) = &program.bind_group {
                    render_pass.set_bind_group(0, bind_group, &draw.uniform_offsets);
                }
            }

            for (slot, (buffer, offset)) in draw.vertex_buffers.iter().enumerate() {
                if let Some(gpu) = self.buffers.get(buffer) {
                    render_pass.set_vertex_buffer(slot as u32, gpu.buffer.slice(*offset..));
                }
            }

            match draw.index {
                Some(IndexSource::Buffer(buffer, format)) => {
                    let Some(gpu) = self.buffers.get(&buffer) else {
                        continue;
                    };
                    render_pass.set_index_buffer(gpu.buffer.slice(..), format);
                    render_pass.draw_indexed(draw.range.clone(), 0, 0..1);
                }
                Some(IndexSource::Expanded) => {
                    let Some(arena) = &self.index_arena else {
                        continue;
                    };
                    render_pass.set_index_buffer(arena.buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(draw.range.clone(), 0, 0..1);
                }
                None => render_pass.draw(draw.range.clone(), 0..1),
            }
        }
    }

    fn reset_frame(&mut self) {
        self.draws.clear();
        self.uniform_arena.clear();
        self.expanded_indices.clear();
        for id in self.pending_destroy.drain(..) {
            if let Some(gpu) = self.buffers.remove(&id) {
                gpu.buffer.destroy();
            }
        }
    }
}

/// Size of a uniform binding; uniform bindings are sized in 16-byte units
fn binding_size(slot: &UniformSlot) -> u64 {
    convert::align_to(slot.size.max(1) as u64, 16)
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let max_size = self.device.limits().max_texture_dimension_2d;
            let (width, height) = convert::clamp_surface_size(width, height, max_size);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self, clear: &ClearState) -> BackendResult<FrameInfo> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::AcquireImageFailed("surface outdated".into()));
            }
            Err(wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };

        self.current_texture = Some(output);
        self.clear = *clear;
        self.frame_error = None;
        if clear.depth.is_some() {
            self.ensure_depth_target();
        }

        Ok(FrameInfo {
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        let Some(texture) = self.current_texture.take() else {
            return Ok(());
        };

        self.upload_frame_data();

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.replay(&mut encoder, &view);
        self.queue.submit(std::iter::once(encoder.finish()));
        texture.present();

        log::trace!("Presented frame with {} draws", self.draws.len());
        self.reset_frame();

        match self.frame_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let capacity = data.len() as u64;
        let size = convert::align_to(capacity.max(1), wgpu::COPY_BUFFER_ALIGNMENT);
        // wgpu has no static/dynamic/stream hint; `desc.usage` only matters to
        // the headless backend's bookkeeping
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size,
            usage: convert::buffer_usages(desc.target),
            mapped_at_creation: false,
        });
        if !data.is_empty() {
            let mut padded = data.to_vec();
            padded.resize(size as usize, 0);
            self.queue.write_buffer(&buffer, 0, &padded);
        }

        let shadow = (desc.target == BufferTarget::ElementArray).then(|| data.to_vec());

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                target: desc.target,
                capacity,
                shadow,
            },
        );

        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let gpu = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })?;

        let end = offset + data.len() as u64;
        if end > gpu.capacity {
            return Err(BackendError::OutOfBounds(format!(
                "{} bytes at offset {} into buffer {} of {} bytes",
                data.len(),
                offset,
                buffer.0,
                gpu.capacity
            )));
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::Unsupported(format!(
                "buffer write at unaligned offset {}",
                offset
            )));
        }

        let mut padded = data.to_vec();
        padded.resize(convert::align_to(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT) as usize, 0);
        self.queue.write_buffer(&gpu.buffer, offset, &padded);

        if let Some(shadow) = &mut gpu.shadow {
            shadow[offset as usize..end as usize].copy_from_slice(data);
        }
        Ok(())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferHandle) {
        match self.buffers.get(&buffer.0) {
            Some(gpu) if gpu.target != target => {
                log::warn!(
                    "Binding buffer {} created for {:?} to {:?}",
                    buffer.0,
                    gpu.target,
                    target
                );
            }
            None => log::warn!("Binding unknown buffer {}", buffer.0),
            _ => {}
        }
        self.bound.insert(target, buffer);
    }

    fn unbind_buffer(&mut self, target: BufferTarget) {
        self.bound.remove(&target);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.bound.retain(|_, bound| *bound != buffer);
        self.attributes.retain(|_, (bound, _)| *bound != buffer);
        if matches!(self.index_buffer, Some((bound, _)) if bound == buffer) {
            self.index_buffer = None;
        }

        // Draws recorded this frame may still reference the buffer
        if self.current_texture.is_some() {
            self.pending_destroy.push(buffer.0);
        } else if let Some(gpu) = self.buffers.remove(&buffer.0) {
            gpu.buffer.destroy();
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let reflection = ProgramReflection::from_wgsl(desc)?;
        if !reflection.other_resources.is_empty() {
            return Err(BackendError::Unsupported(format!(
                "program '{}' declares non-uniform resources: {}",
                desc.label,
                reflection.other_resources.join(", ")
            )));
        }
        let max_dynamic = self.device.limits().max_dynamic_uniform_buffers_per_pipeline_layout;
        if reflection.uniforms.len() as u32 > max_dynamic {
            return Err(BackendError::Unsupported(format!(
                "program '{}' declares {} uniforms, the device allows {}",
                desc.label,
                reflection.uniforms.len(),
                max_dynamic
            )));
        }

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.vertex_source.as_str().into()),
        });
        let fragment_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.fragment_source.as_str().into()),
        });

        let bind_group_layout = (!reflection.uniforms.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = reflection
                .uniforms
                .iter()
                .map(|slot| wgpu::BindGroupLayoutEntry {
                    binding: slot.binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(binding_size(slot)),
                    },
                    count: None,
                })
                .collect();
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&desc.label),
                    entries: &entries,
                })
        });

        let layouts: Vec<&wgpu::BindGroupLayout> = bind_group_layout.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let id = self.next_program_id;
        self.next_program_id += 1;
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label.clone(),
                reflection,
                vertex_module,
                fragment_module,
                bind_group_layout,
                pipeline_layout,
                uniform_values: BTreeMap::new(),
                bind_group: None,
            },
        );
        log::debug!("Compiled program '{}'", desc.label);

        Ok(ProgramHandle(id))
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
            self.fail(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            });
            return;
        }
        self.current_program = Some(program);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        let stale: Vec<PipelineKey> = self
            .pipeline_ids
            .keys()
            .filter(|key| key.program == program.0)
            .cloned()
            .collect();
        for key in stale {
            if let Some(id) = self.pipeline_ids.remove(&key) {
                self.pipelines.remove(&id);
            }
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn set_uniform(&mut self, location: UniformLocation, uniform: &Uniform) {
        let Some(program) = self
            .current_program
            .and_then(|program| self.programs.get_mut(&program.0))
        else {
            log::warn!("set_uniform without a current program");
            return;
        };
        program
            .uniform_values
            .insert(location.0, uniform.to_bytes());
    }

    fn set_vertex_attribute(
        &mut self,
        location: u32,
        buffer: BufferHandle,
        layout: &VertexAttributeLayout,
    ) {
        self.attributes.insert(location, (buffer, *layout));
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.attributes.remove(&location);
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.index_buffer = Some((buffer, format));
    }

    fn draw(&mut self, mode: DrawMode, first: u32, count: u32) {
        if let Err(e) = self.record_draw(mode, first, count, false) {
            self.fail(e);
        }
    }

    fn draw_indexed(&mut self, mode: DrawMode, first: u32, count: u32) {
        if let Err(e) = self.record_draw(mode, first, count, true) {
            self.fail(e);
        }
    }
}
