//! wgpu implementation of [`RenderDevice`].
//! wgpu = 0.26.x, winit = 0.30.x
//!
//! Draw calls issued between [`WgpuDevice::begin_frame`] and
//! [`WgpuDevice::end_frame`] are queued with a snapshot of the bound
//! program's uniform block, then replayed in order inside a single render
//! pass. Uniform snapshots share one buffer per frame and are selected with
//! dynamic offsets.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset::IndexWidth;
use corelib::Mat4;
use log::{debug, error, info, warn};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BlendState, Buffer, BufferBinding,
    BufferBindingType, BufferUsages, ColorTargetState, ColorWrites, CommandEncoderDescriptor,
    DepthBiasState, DepthStencilState, Device, DeviceDescriptor, Extent3d, Features,
    FragmentState, IndexFormat, Instance, InstanceDescriptor, Limits, LoadOp, Operations,
    PipelineLayout, PipelineLayoutDescriptor, PowerPreference, PresentMode, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderModule, ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Surface,
    SurfaceConfiguration, SurfaceError, SurfaceTexture, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsages, TextureView, TextureViewDescriptor, VertexBufferLayout,
    VertexFormat, VertexState, VertexStepMode, util::DeviceExt,
};
use naga::valid::Capabilities;
use winit::{dpi::PhysicalSize, window::Window};

use crate::device::{
    AttributeFormat, BufferHandle, BufferKind, HandleTable, ProgramBindings, ProgramHandle,
    RenderDevice, ShaderHandle, ShaderStage, UniformLocation, VertexArrayDesc, VertexArrayHandle,
    VertexAttribute,
};
use crate::reflect::{self, CompiledStage, FRAGMENT_ENTRY, LinkOutput, VERTEX_ENTRY};

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.05,
    b: 0.08,
    a: 1.0,
};

struct GpuBuffer {
    buffer: Buffer,
}

struct GpuVertexArray {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    layout_id: u32,
}

/// Interned vertex layout; pipelines are keyed on its index.
#[derive(Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    stride: u32,
    attributes: Vec<VertexAttribute>,
}

struct GpuShader {
    stage: CompiledStage,
    module: Option<Arc<ShaderModule>>,
}

struct GpuProgram {
    link: LinkOutput,
    modules: Option<(Arc<ShaderModule>, Arc<ShaderModule>)>,
    bind_group_layout: Option<BindGroupLayout>,
    pipeline_layout: Option<PipelineLayout>,
    /// CPU copy of the uniform block, written by `set_uniform_mat4`.
    uniform_values: Vec<u8>,
}

struct PendingDraw {
    program: ProgramHandle,
    vertex_array: VertexArrayHandle,
    index_count: u32,
    width: IndexWidth,
    uniform_offset: u32,
}

struct Frame {
    target: SurfaceTexture,
    draws: Vec<PendingDraw>,
    uniform_bytes: Vec<u8>,
}

pub struct WgpuDevice {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,
    uniform_alignment: u32,

    // Depth
    depth_view: TextureView,

    // Resources
    buffers: HandleTable<GpuBuffer>,
    vertex_arrays: HandleTable<GpuVertexArray>,
    layouts: Vec<LayoutKey>,
    layout_ids: HashMap<LayoutKey, u32>,
    shaders: HandleTable<GpuShader>,
    programs: HandleTable<GpuProgram>,
    pipelines: HashMap<(u32, u32), Option<RenderPipeline>>,

    // Bindings
    current_program: Option<ProgramHandle>,
    bound_vertex_array: Option<VertexArrayHandle>,

    frame: Option<Frame>,

    // Size cache
    width: u32,
    height: u32,
}

impl WgpuDevice {
    /// Create a device rendering into `window`.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> Result<Self> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .context("create_surface failed")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        let info = adapter.get_info();
        info!("adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Voxscene Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("request_device failed")?;

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no formats")?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let depth_view = create_depth_view(&device, &surface_config);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment.max(1);

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            uniform_alignment,
            depth_view,
            buffers: HandleTable::new(),
            vertex_arrays: HandleTable::new(),
            layouts: Vec::new(),
            layout_ids: HashMap::new(),
            shaders: HandleTable::new(),
            programs: HandleTable::new(),
            pipelines: HashMap::new(),
            current_program: None,
            bound_vertex_array: None,
            frame: None,
            width,
            height,
        })
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }

    /// Acquire the next surface texture and start queueing draws.
    pub fn begin_frame(&mut self) -> Result<(), SurfaceError> {
        if self.frame.is_some() {
            warn!("begin_frame called twice; previous frame dropped");
        }
        let target = self.surface.get_current_texture()?;
        self.frame = Some(Frame {
            target,
            draws: Vec::new(),
            uniform_bytes: Vec::new(),
        });
        Ok(())
    }

    /// Encode the queued draws into one pass, submit and present.
    pub fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            warn!("end_frame without begin_frame");
            return;
        };

        for draw in &frame.draws {
            if let Some(va) = self.vertex_arrays.get(draw.vertex_array.0) {
                let layout_id = va.layout_id;
                self.ensure_pipeline(draw.program, layout_id);
            }
        }

        let uniform_buffer = (!frame.uniform_bytes.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Frame uniforms"),
                    contents: &frame.uniform_bytes,
                    usage: BufferUsages::UNIFORM,
                })
        });

        let mut bind_groups: HashMap<u32, BindGroup> = HashMap::new();
        if let Some(ub) = &uniform_buffer {
            for draw in &frame.draws {
                if bind_groups.contains_key(&draw.program.0) {
                    continue;
                }
                let Some(program) = self.programs.get(draw.program.0) else {
                    continue;
                };
                let (Some(bgl), Some(block)) = (&program.bind_group_layout, &program.link.block)
                else {
                    continue;
                };
                let bg = self.device.create_bind_group(&BindGroupDescriptor {
                    label: Some("Uniform BG"),
                    layout: bgl,
                    entries: &[BindGroupEntry {
                        binding: 0,
                        resource: BindingResource::Buffer(BufferBinding {
                            buffer: ub,
                            offset: 0,
                            size: NonZeroU64::new(block.size as u64),
                        }),
                    }],
                });
                bind_groups.insert(draw.program.0, bg);
            }
        }

        let view = frame
            .target
            .texture
            .create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        let mut drawn = 0usize;
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None, // required in 0.26
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(CLEAR_COLOR),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for draw in &frame.draws {
                let Some(va) = self.vertex_arrays.get(draw.vertex_array.0) else {
                    continue;
                };
                let (Some(vb), Some(ib)) = (
                    self.buffers.get(va.vertex_buffer.0),
                    self.buffers.get(va.index_buffer.0),
                ) else {
                    warn!("draw skipped: {:?} refers to a deleted buffer", draw.vertex_array);
                    continue;
                };
                let Some(Some(pipeline)) = self.pipelines.get(&(draw.program.0, va.layout_id))
                else {
                    continue;
                };

                rpass.set_pipeline(pipeline);
                if let Some(bg) = bind_groups.get(&draw.program.0) {
                    rpass.set_bind_group(0, bg, &[draw.uniform_offset]);
                }
                rpass.set_vertex_buffer(0, vb.buffer.slice(..));
                rpass.set_index_buffer(ib.buffer.slice(..), index_format(draw.width));
                rpass.draw_indexed(0..draw.index_count, 0, 0..1);
                drawn += 1;
            }
        }

        let queued = frame.draws.len();
        self.queue.submit(Some(encoder.finish()));
        frame.target.present();
        debug!("frame: {drawn}/{queued} draws");
    }

    fn intern_layout(&mut self, key: LayoutKey) -> u32 {
        if let Some(&id) = self.layout_ids.get(&key) {
            return id;
        }
        let id = self.layouts.len() as u32;
        self.layouts.push(key.clone());
        self.layout_ids.insert(key, id);
        id
    }

    fn ensure_pipeline(&mut self, program: ProgramHandle, layout_id: u32) {
        let key = (program.0, layout_id);
        if self.pipelines.contains_key(&key) {
            return;
        }
        let pipeline = self.create_pipeline(program, layout_id);
        self.pipelines.insert(key, pipeline);
    }

    fn create_pipeline(&self, handle: ProgramHandle, layout_id: u32) -> Option<RenderPipeline> {
        let program = self.programs.get(handle.0)?;
        let (vs, fs) = program.modules.as_ref()?;
        let layout = self.layouts.get(layout_id as usize)?;

        let attributes: Vec<wgpu::VertexAttribute> = layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: vertex_format(a.format),
                offset: a.offset as u64,
                shader_location: a.location,
            })
            .collect();
        let buffers = [VertexBufferLayout {
            array_stride: layout.stride as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("Mesh Pipeline"),
                layout: program.pipeline_layout.as_ref(),
                vertex: VertexState {
                    module: vs,
                    entry_point: Some(VERTEX_ENTRY),
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(FragmentState {
                    module: fs,
                    entry_point: Some(FRAGMENT_ENTRY),
                    targets: &[Some(ColorTargetState {
                        format: self.surface_config.format,
                        blend: Some(BlendState::REPLACE),
                        write_mask: ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            error!("pipeline for {handle:?} (layout {layout_id}) rejected: {err}");
            return None;
        }
        debug!("created pipeline for {handle:?} (layout {layout_id})");
        Some(pipeline)
    }

    fn program_layouts(
        &self,
        block_size: Option<u32>,
    ) -> (Option<BindGroupLayout>, PipelineLayout) {
        let bgl = block_size.map(|size| {
            self.device
                .create_bind_group_layout(&BindGroupLayoutDescriptor {
                    label: Some("Uniform BGL"),
                    entries: &[BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::VERTEX_FRAGMENT,
                        ty: BindingType::Buffer {
                            ty: BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(size as u64),
                        },
                        count: None,
                    }],
                })
        });
        let bind_group_layouts: Vec<&BindGroupLayout> = bgl.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("Mesh PipelineLayout"),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });
        (bgl, pipeline_layout)
    }
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferHandle {
        let (label, usage) = match kind {
            BufferKind::Vertex => ("Mesh VB", BufferUsages::VERTEX),
            BufferKind::Index => ("Mesh IB", BufferUsages::INDEX),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        BufferHandle(self.buffers.insert(GpuBuffer { buffer }))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(buffer.0) {
            Some(b) => b.buffer.destroy(),
            None => warn!("delete_buffer: unknown {buffer:?}"),
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc<'_>) -> VertexArrayHandle {
        let layout_id = self.intern_layout(LayoutKey {
            stride: desc.stride,
            attributes: desc.attributes.to_vec(),
        });
        VertexArrayHandle(self.vertex_arrays.insert(GpuVertexArray {
            vertex_buffer: desc.vertex_buffer,
            index_buffer: desc.index_buffer,
            layout_id,
        }))
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if self.vertex_arrays.remove(vertex_array.0).is_none() {
            warn!("delete_vertex_array: unknown {vertex_array:?}");
        }
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderHandle {
        let mut compiled = CompiledStage::compile_with(
            stage,
            source,
            shader_capabilities(self.device.features()),
        );
        let mut module = None;
        if compiled.is_compiled() {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let created = self.device.create_shader_module(ShaderModuleDescriptor {
                label: Some(stage.name()),
                source: ShaderSource::Wgsl(source.into()),
            });
            match pollster::block_on(self.device.pop_error_scope()) {
                Some(err) => {
                    warn!("{} shader rejected by the device: {err}", stage.name());
                    compiled.module = None;
                    compiled.log = Some(format!("error: {err}"));
                }
                None => module = Some(Arc::new(created)),
            }
        }
        ShaderHandle(self.shaders.insert(GpuShader {
            stage: compiled,
            module,
        }))
    }

    fn shader_compiled(&self, shader: ShaderHandle) -> bool {
        self.shaders
            .get(shader.0)
            .is_some_and(|s| s.module.is_some())
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> Option<String> {
        self.shaders.get(shader.0).and_then(|s| s.stage.log.clone())
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        if self.shaders.remove(shader.0).is_none() {
            warn!("delete_shader: unknown {shader:?}");
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        bindings: &ProgramBindings<'_>,
    ) -> ProgramHandle {
        let (link, modules) = match (self.shaders.get(vertex.0), self.shaders.get(fragment.0)) {
            (Some(vs), Some(fs)) => {
                let link = reflect::link(&vs.stage, &fs.stage, bindings);
                let modules = match (&vs.module, &fs.module) {
                    (Some(v), Some(f)) if link.linked => Some((v.clone(), f.clone())),
                    _ => None,
                };
                (link, modules)
            }
            _ => (LinkOutput::failed("unknown shader handle"), None),
        };

        let block_size = link.block.as_ref().map(|b| b.size);
        let (bind_group_layout, pipeline_layout) = if link.linked {
            let (bgl, pl) = self.program_layouts(block_size);
            (bgl, Some(pl))
        } else {
            (None, None)
        };

        ProgramHandle(self.programs.insert(GpuProgram {
            uniform_values: vec![0; block_size.unwrap_or(0) as usize],
            link,
            modules,
            bind_group_layout,
            pipeline_layout,
        }))
    }

    fn program_linked(&self, program: ProgramHandle) -> bool {
        self.programs.get(program.0).is_some_and(|p| p.link.linked)
    }

    fn program_info_log(&self, program: ProgramHandle) -> Option<String> {
        self.programs.get(program.0).and_then(|p| p.link.log.clone())
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let block = self.programs.get(program.0)?.link.block.as_ref()?;
        block.find(name).map(|u| UniformLocation(u.offset))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program.0).is_none() {
            warn!("delete_program: unknown {program:?}");
        }
        self.pipelines.retain(|(p, _), _| *p != program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(p.0)) else {
            warn!("set_uniform_mat4 without a program in use");
            return;
        };
        let start = location.offset() as usize;
        let bytes = bytemuck::bytes_of(value);
        match program.uniform_values.get_mut(start..start + bytes.len()) {
            Some(slot) => slot.copy_from_slice(bytes),
            None => warn!("uniform at offset {start} is outside the program's block"),
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        self.bound_vertex_array = vertex_array;
    }

    fn draw_indexed(&mut self, index_count: u32, width: IndexWidth) {
        let (Some(program), Some(vertex_array)) = (self.current_program, self.bound_vertex_array)
        else {
            warn!("draw_indexed needs a program and a vertex array");
            return;
        };
        let Some(frame) = self.frame.as_mut() else {
            warn!("draw_indexed outside begin_frame/end_frame");
            return;
        };
        let values = self
            .programs
            .get(program.0)
            .map(|p| p.uniform_values.as_slice())
            .unwrap_or_default();

        let align = self.uniform_alignment as usize;
        let padded = frame.uniform_bytes.len().div_ceil(align) * align;
        frame.uniform_bytes.resize(padded, 0);
        let uniform_offset = padded as u32;
        frame.uniform_bytes.extend_from_slice(values);

        frame.draws.push(PendingDraw {
            program,
            vertex_array,
            index_count,
            width,
            uniform_offset,
        });
    }
}

fn vertex_format(format: AttributeFormat) -> VertexFormat {
    match format {
        AttributeFormat::Float32x3 => VertexFormat::Float32x3,
        AttributeFormat::Uint32 { components: 1 } => VertexFormat::Uint32,
        AttributeFormat::Uint32 { components: 2 } => VertexFormat::Uint32x2,
        AttributeFormat::Uint32 { components: 3 } => VertexFormat::Uint32x3,
        AttributeFormat::Uint32 { .. } => VertexFormat::Uint32x4,
    }
}

/// naga capabilities the device can actually run.
fn shader_capabilities(features: Features) -> Capabilities {
    let mut caps = Capabilities::empty();
    caps.set(Capabilities::FLOAT64, features.contains(Features::SHADER_F64));
    caps.set(Capabilities::SHADER_INT64, features.contains(Features::SHADER_INT64));
    caps.set(
        Capabilities::PRIMITIVE_INDEX,
        features.contains(Features::SHADER_PRIMITIVE_INDEX),
    );
    caps.set(
        Capabilities::PUSH_CONSTANT,
        features.contains(Features::PUSH_CONSTANTS),
    );
    caps
}

fn index_format(width: IndexWidth) -> IndexFormat {
    match width {
        IndexWidth::U16 => IndexFormat::Uint16,
        IndexWidth::U32 => IndexFormat::Uint32,
    }
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size: Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&TextureViewDescriptor::default())
}
