//! wgpu backend implementation
//!
//! Headless: the default target is an offscreen "screen" texture. Every clear
//! and draw is encoded into its own render pass and submitted right away, which
//! keeps the immediate-mode [`Device`] state machine simple to follow.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{FullscreenQuad, Material, Shader, UniformInfo, UniformKind};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// Configuration for a headless wgpu device
#[derive(Debug, Clone)]
pub struct WgpuBackendConfig {
    /// Size of the offscreen default target
    pub width: u32,
    pub height: u32,
    /// Format of the offscreen default target
    pub format: TextureFormat,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            format: TextureFormat::Rgba8Unorm,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDescriptor,
}

struct WgpuFramebuffer {
    attachments: [Option<TextureHandle>; AttachmentSlot::COUNT],
    draw_buffers: Vec<AttachmentSlot>,
}

struct WgpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    /// Uniforms referenced by an entry point; auto layouts only contain these
    bindings: Vec<UniformInfo>,
}

/// Everything a render pipeline bakes in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    blend: Option<BlendState>,
    color_write: bool,
    depth_write: bool,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    float_targets: bool,
    max_color_attachments: u32,

    // Resource storage
    textures: HashMap<u64, WgpuTexture>,
    framebuffers: HashMap<u64, WgpuFramebuffer>,
    programs: HashMap<u64, WgpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    next_id: u64,

    sampler: wgpu::Sampler,
    /// Bound to texture uniforms that have no value
    fallback_texture: TextureHandle,
    screen: TextureHandle,
    bound: Vec<FramebufferHandle>,

    // Fixed function state
    clear_color: [f32; 4],
    color_write: bool,
    depth_write: bool,
    blend_enabled: bool,
    blend_state: BlendState,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::Src => wgpu::BlendFactor::Src,
            BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            BlendFactor::Dst => wgpu::BlendFactor::Dst,
            BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
            BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        }
    }

    fn convert_blend_operation(op: BlendOperation) -> wgpu::BlendOperation {
        match op {
            BlendOperation::Add => wgpu::BlendOperation::Add,
            BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
            BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOperation::Min => wgpu::BlendOperation::Min,
            BlendOperation::Max => wgpu::BlendOperation::Max,
        }
    }

    fn convert_blend_component(component: BlendComponent) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: Self::convert_blend_factor(component.src_factor),
            dst_factor: Self::convert_blend_factor(component.dst_factor),
            operation: Self::convert_blend_operation(component.operation),
        }
    }

    fn convert_blend_state(state: BlendState) -> wgpu::BlendState {
        wgpu::BlendState {
            color: Self::convert_blend_component(state.color),
            alpha: Self::convert_blend_component(state.alpha),
        }
    }

    /// Row pitch of a texture copy, aligned the way buffer copies require
    fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
        let unpadded = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        unpadded.div_ceil(align) * align
    }
}

impl WgpuBackend {
    /// Create a headless device, blocking on adapter and device requests
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(config: WgpuBackendConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(config))
    }

    /// Async initialization - used directly on web, wrapped by `new` on native
    pub async fn new_async(config: WgpuBackendConfig) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
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

        // Sampling the float textures the compositor produces needs filtering support
        let float_targets = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let required_features = if float_targets {
            wgpu::Features::FLOAT32_FILTERABLE
        } else {
            log::warn!("Adapter cannot filter 32-bit float textures, float targets disabled");
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Compositor Device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let max_color_attachments = device
            .limits()
            .max_color_attachments
            .clamp(1, AttachmentSlot::MAX_COLOR);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("compositor sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut backend = Self {
            instance,
            adapter,
            device,
            queue,
            float_targets,
            max_color_attachments,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            next_id: 1,
            sampler,
            fallback_texture: TextureHandle(0),
            screen: TextureHandle(0),
            bound: Vec::new(),
            clear_color: [0.0; 4],
            color_write: true,
            depth_write: true,
            blend_enabled: false,
            blend_state: BlendState::default(),
        };

        backend.fallback_texture = backend.create_texture(&TextureDescriptor {
            label: Some("fallback".to_string()),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        backend.write_texture(backend.fallback_texture, &[0, 0, 0, 255])?;

        backend.screen = backend.create_texture(&TextureDescriptor::render_target(
            "screen",
            config.width.max(1),
            config.height.max(1),
            config.format,
        ))?;

        Ok(backend)
    }

    /// Texture standing in for the default target
    pub fn screen_texture(&self) -> TextureHandle {
        self.screen
    }

    /// Get the wgpu device for direct access
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue for direct access
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Colour and depth textures written by the active target
    fn active_targets(&self) -> (Vec<TextureHandle>, Option<TextureHandle>) {
        match self.bound.last().and_then(|fb| self.framebuffers.get(&fb.0)) {
            Some(fb) => (
                fb.draw_buffers
                    .iter()
                    .filter_map(|slot| fb.attachments[slot.index()])
                    .collect(),
                fb.attachments[AttachmentSlot::Depth.index()],
            ),
            None => (vec![self.screen], None),
        }
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&WgpuTexture> {
        self.textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{texture:?}")))
    }

    /// Run `f` inside a validation error scope and turn a captured error into `map_err`
    fn validated<T>(
        &self,
        f: impl FnOnce(&wgpu::Device) -> T,
        map_err: impl FnOnce(String) -> BackendError,
    ) -> BackendResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(map_err(err.to_string())),
            None => Ok(value),
        }
    }

    fn create_pipeline(&self, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| BackendError::InvalidHandle(format!("program {}", key.program)))?;

        let write_mask = if key.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: key.blend.map(Self::convert_blend_state),
                    write_mask,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.depth_write,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        log::debug!(
            "WgpuBackend: creating pipeline for '{}' ({} colour targets)",
            program.label,
            color_targets.len()
        );

        self.validated(
            |device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(program.label.as_str()),
                    layout: None,
                    vertex: wgpu::VertexState {
                        module: &program.module,
                        entry_point: crate::resources::VERTEX_ENTRY,
                        buffers: &[],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &program.module,
                        entry_point: crate::resources::FRAGMENT_ENTRY,
                        targets: &color_targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                })
            },
            BackendError::PipelineCreationFailed,
        )
    }

    /// Uniform buffers for the value bindings of a draw, zero filled when unset
    fn create_uniform_buffers(
        &self,
        program: &WgpuProgram,
        material: &Material,
    ) -> HashMap<String, wgpu::Buffer> {
        program
            .bindings
            .iter()
            .filter_map(|info| match info.kind {
                UniformKind::Value { size } => {
                    let mut bytes = material
                        .uniform(&info.name)
                        .and_then(|value| value.to_bytes())
                        .unwrap_or_default();
                    let len = bytes.len().max(size as usize).next_multiple_of(16);
                    bytes.resize(len, 0);

                    let buffer = self
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(info.name.as_str()),
                            contents: &bytes,
                            usage: wgpu::BufferUsages::UNIFORM,
                        });
                    Some((info.name.clone(), buffer))
                }
                _ => None,
            })
            .collect()
    }

    fn create_bind_groups(
        &self,
        pipeline: &wgpu::RenderPipeline,
        program: &WgpuProgram,
        material: &Material,
        buffers: &HashMap<String, wgpu::Buffer>,
    ) -> BackendResult<Vec<wgpu::BindGroup>> {
        let Some(group_count) = program.bindings.iter().map(|info| info.group + 1).max() else {
            return Ok(Vec::new());
        };

        (0..group_count)
            .map(|group| {
                let mut entries = Vec::new();
                for info in program.bindings.iter().filter(|info| info.group == group) {
                    let resource = match info.kind {
                        UniformKind::Texture => {
                            let handle = material
                                .uniform(&info.name)
                                .and_then(|value| value.as_texture())
                                .unwrap_or(self.fallback_texture);
                            wgpu::BindingResource::TextureView(&self.texture(handle)?.view)
                        }
                        UniformKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
                        UniformKind::Value { .. } => match buffers.get(&info.name) {
                            Some(buffer) => buffer.as_entire_binding(),
                            None => continue,
                        },
                    };
                    entries.push(wgpu::BindGroupEntry {
                        binding: info.binding,
                        resource,
                    });
                }

                self.validated(
                    |device| {
                        device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some(program.label.as_str()),
                            layout: &pipeline.get_bind_group_layout(group),
                            entries: &entries,
                        })
                    },
                    BackendError::PipelineCreationFailed,
                )
            })
            .collect()
    }
}

impl Device for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::MultipleRenderTargets => self.max_color_attachments > 1,
            Capability::FloatRenderTargets => self.float_targets,
        }
    }

    fn max_color_attachments(&self) -> u32 {
        self.max_color_attachments
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }

        let texture = self.validated(
            |device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: Self::convert_texture_format(desc.format),
                    usage: Self::convert_texture_usage(desc.usage),
                    view_formats: &[],
                })
            },
            BackendError::TextureCreationFailed,
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.allocate_id();
        self.textures.insert(
            id,
            WgpuTexture {
                texture,
                view,
                desc: desc.clone(),
            },
        );

        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let entry = self.texture(texture)?;
        let expected = entry.desc.byte_size();
        if data.len() != expected {
            return Err(BackendError::TextureDataMismatch {
                expected,
                actual: data.len(),
            });
        }

        let (width, height) = (entry.desc.width, entry.desc.height);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * entry.desc.format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle> {
        let handle = FramebufferHandle(self.allocate_id());
        log::trace!("WgpuBackend: creating framebuffer {:?}", label);
        self.framebuffers.insert(
            handle.0,
            WgpuFramebuffer {
                attachments: [None; AttachmentSlot::COUNT],
                draw_buffers: vec![AttachmentSlot::Color0],
            },
        );
        Ok(handle)
    }

    fn create_program(&mut self, shader: &Shader) -> BackendResult<ProgramHandle> {
        let module = self.validated(
            |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(shader.label()),
                    source: wgpu::ShaderSource::Wgsl(shader.source().into()),
                })
            },
            BackendError::ShaderCreationFailed,
        )?;

        let id = self.allocate_id();
        self.programs.insert(
            id,
            WgpuProgram {
                label: shader.label().to_string(),
                module,
                bindings: shader
                    .uniforms()
                    .iter()
                    .filter(|info| info.used)
                    .cloned()
                    .collect(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
        texture: Option<TextureHandle>,
    ) {
        match self.framebuffers.get_mut(&framebuffer.0) {
            Some(fb) => fb.attachments[slot.index()] = texture,
            None => log::warn!("WgpuBackend: attach to unknown {:?}", framebuffer),
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.bound.push(framebuffer);
    }

    fn unbind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        match self.bound.iter().rposition(|fb| *fb == framebuffer) {
            Some(index) => {
                self.bound.remove(index);
            }
            None => log::warn!("WgpuBackend: {:?} was not bound", framebuffer),
        }
    }

    fn set_draw_buffers(&mut self, slots: &[AttachmentSlot]) {
        match self
            .bound
            .last()
            .and_then(|fb| self.framebuffers.get_mut(&fb.0))
        {
            Some(fb) => fb.draw_buffers = slots.to_vec(),
            None => log::warn!("WgpuBackend: draw buffers set without a bound framebuffer"),
        }
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.color_write = enabled;
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self, mask: ClearMask) -> BackendResult<()> {
        let (colors, depth) = self.active_targets();
        let clear_color = mask.contains(ClearMask::COLOR) && self.color_write;
        let clear_depth = mask.contains(ClearMask::DEPTH) && self.depth_write;
        let clear_stencil = mask.contains(ClearMask::STENCIL);

        let color_views = if clear_color {
            colors
                .iter()
                .map(|handle| self.texture(*handle).map(|t| &t.view))
                .collect::<BackendResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let depth_target = match depth {
            Some(handle) if clear_depth || clear_stencil => Some(self.texture(handle)?),
            _ => None,
        };
        if color_views.is_empty() && depth_target.is_none() {
            return Ok(());
        }

        let [r, g, b, a] = self.clear_color.map(f64::from);
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth_stencil_attachment =
            depth_target.map(|target| wgpu::RenderPassDepthStencilAttachment {
                view: &target.view,
                depth_ops: Some(wgpu::Operations {
                    load: if clear_depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: (target.desc.format == TextureFormat::Depth24PlusStencil8).then(|| {
                    wgpu::Operations {
                        load: if clear_stencil {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }
                }),
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compositor clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.blend_enabled = enabled;
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.blend_state = state;
    }

    fn draw_fullscreen(
        &mut self,
        quad: &FullscreenQuad,
        program: ProgramHandle,
        material: &Material,
    ) -> BackendResult<()> {
        let (colors, depth) = self.active_targets();
        if colors.is_empty() && depth.is_none() {
            log::warn!("WgpuBackend: draw without any attachment skipped");
            return Ok(());
        }

        let key = PipelineKey {
            program: program.0,
            color_formats: colors
                .iter()
                .map(|handle| {
                    self.texture(*handle)
                        .map(|t| Self::convert_texture_format(t.desc.format))
                })
                .collect::<BackendResult<_>>()?,
            depth_format: depth
                .map(|handle| {
                    self.texture(handle)
                        .map(|t| Self::convert_texture_format(t.desc.format))
                })
                .transpose()?,
            blend: self.blend_enabled.then_some(self.blend_state),
            color_write: self.color_write,
            depth_write: self.depth_write,
        };
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(&key)?;
            self.pipelines.insert(key.clone(), pipeline);
        }

        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| BackendError::PipelineCreationFailed("pipeline cache miss".into()))?;
        let wgpu_program = self
            .programs
            .get(&program.0)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{program:?}")))?;

        let buffers = self.create_uniform_buffers(wgpu_program, material);
        let bind_groups = self.create_bind_groups(pipeline, wgpu_program, material, &buffers)?;

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colors
            .iter()
            .map(|handle| {
                self.texture(*handle).map(|target| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
            })
            .collect::<BackendResult<_>>()?;
        let depth_stencil_attachment = depth
            .map(|handle| {
                self.texture(handle)
                    .map(|target| wgpu::RenderPassDepthStencilAttachment {
                        view: &target.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    })
            })
            .transpose()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compositor draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(wgpu_program.label.as_str()),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            for (index, bind_group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, bind_group, &[]);
            }
            pass.draw(quad.vertices(), 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>> {
        let entry = self.texture(texture)?;
        if entry.desc.format.is_depth() {
            return Err(BackendError::ReadbackFailed(format!(
                "{:?} is a depth texture",
                texture
            )));
        }

        let (width, height) = (entry.desc.width, entry.desc.height);
        let bytes_per_pixel = entry.desc.format.bytes_per_pixel();
        let unpadded = (width * bytes_per_pixel) as usize;
        let padded = Self::padded_bytes_per_row(width, bytes_per_pixel);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compositor readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let pixels: Vec<u8> = {
            let mapped = slice.get_mapped_range();
            mapped
                .chunks(padded as usize)
                .flat_map(|row| &row[..unpadded])
                .copied()
                .collect()
        };
        buffer.unmap();
        Ok(pixels)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if texture == self.screen || texture == self.fallback_texture {
            log::warn!("WgpuBackend: refusing to destroy a built-in texture");
            return;
        }
        if let Some(entry) = self.textures.remove(&texture.0) {
            entry.texture.destroy();
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
        self.pipelines.retain(|key, _| key.program != program.0);
    }
}
