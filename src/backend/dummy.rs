//! Dummy backend for testing and headless tooling.
//!
//! This backend doesn't touch a GPU. It records every command issued through
//! [`Device`] so tests can assert on the exact state a pass sets, and it keeps
//! CPU-side texel storage so colour clears and readback behave like a device.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{FullscreenQuad, Material, Shader, UniformValue};

/// A command issued to the dummy device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateTexture(TextureHandle),
    WriteTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    CreateFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    CreateProgram(ProgramHandle),
    DestroyProgram(ProgramHandle),
    Attach {
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
        texture: Option<TextureHandle>,
    },
    BindFramebuffer(FramebufferHandle),
    UnbindFramebuffer(FramebufferHandle),
    DrawBuffers(Vec<AttachmentSlot>),
    DepthWrite(bool),
    ColorWrite(bool),
    ClearColor([f32; 4]),
    Clear(ClearMask),
    BlendEnabled(bool),
    BlendState(BlendState),
    Draw(DrawRecord),
}

/// Snapshot of the state a full-screen draw was issued with
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    /// Bound framebuffer, `None` for the screen
    pub framebuffer: Option<FramebufferHandle>,
    /// Textures written by the draw, in draw buffer order
    pub color_targets: Vec<TextureHandle>,
    pub depth_target: Option<TextureHandle>,
    /// Every uniform value set on the material, in binding order
    pub uniforms: Vec<(String, UniformValue)>,
    /// Active blend state, `None` when blending is disabled
    pub blend: Option<BlendState>,
    pub transparent: bool,
    pub vertex_count: u32,
}

impl DrawRecord {
    /// Texture bound to a uniform for this draw
    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.uniforms
            .iter()
            .find(|(uniform, _)| uniform == name)
            .and_then(|(_, value)| value.as_texture())
    }
}

struct DummyTexture {
    desc: TextureDescriptor,
    data: Vec<u8>,
}

struct DummyFramebuffer {
    attachments: [Option<TextureHandle>; AttachmentSlot::COUNT],
    draw_buffers: Vec<AttachmentSlot>,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    multi_target: bool,
    float_targets: bool,
    max_color_attachments: u32,
    framebuffer_limit: Option<usize>,

    commands: Vec<DeviceCommand>,

    textures: HashMap<u64, DummyTexture>,
    framebuffers: HashMap<u64, DummyFramebuffer>,
    programs: HashMap<u64, String>,
    next_id: u64,

    screen: TextureHandle,
    bound: Vec<FramebufferHandle>,

    clear_color: [f32; 4],
    color_write: bool,
    depth_write: bool,
    blend_enabled: bool,
    blend_state: BlendState,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a dummy device with multiple render target support and a 4x4 screen.
    pub fn new() -> Self {
        Self::with_capabilities(true, AttachmentSlot::MAX_COLOR)
    }

    /// Create a dummy device with the given multi-target capability.
    pub fn with_capabilities(multi_target: bool, max_color_attachments: u32) -> Self {
        let screen_desc =
            TextureDescriptor::render_target("screen", 4, 4, TextureFormat::Rgba8Unorm);
        let mut textures = HashMap::new();
        textures.insert(
            0,
            DummyTexture {
                data: vec![0; screen_desc.byte_size()],
                desc: screen_desc,
            },
        );

        Self {
            multi_target,
            float_targets: true,
            max_color_attachments: max_color_attachments.clamp(1, AttachmentSlot::MAX_COLOR),
            framebuffer_limit: None,
            commands: Vec::new(),
            textures,
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            screen: TextureHandle(0),
            bound: Vec::new(),
            clear_color: [0.0; 4],
            color_write: true,
            depth_write: true,
            blend_enabled: false,
            blend_state: BlendState::default(),
        }
    }

    /// Disable rendering into float textures.
    pub fn without_float_targets(mut self) -> Self {
        self.float_targets = false;
        self
    }

    /// Fail framebuffer creation once `limit` framebuffers are alive.
    pub fn with_framebuffer_limit(mut self, limit: usize) -> Self {
        self.framebuffer_limit = Some(limit);
        self
    }

    /// Texture standing in for the default target
    pub fn screen_texture(&self) -> TextureHandle {
        self.screen
    }

    /// All commands recorded so far
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the recorded commands
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draws
    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|command| match command {
            DeviceCommand::Draw(record) => Some(record),
            _ => None,
        })
    }

    /// Framebuffer currently bound, `None` for the screen
    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound.last().copied()
    }

    /// Texture attached to a framebuffer slot
    pub fn attachment(
        &self,
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
    ) -> Option<TextureHandle> {
        self.framebuffers
            .get(&framebuffer.0)
            .and_then(|fb| fb.attachments[slot.index()])
    }

    pub fn blend_enabled(&self) -> bool {
        self.blend_enabled
    }

    /// Number of live textures, excluding the screen
    pub fn texture_count(&self) -> usize {
        self.textures.len() - 1
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn color_targets(&self) -> Vec<TextureHandle> {
        match self.bound.last() {
            Some(framebuffer) => self
                .framebuffers
                .get(&framebuffer.0)
                .map(|fb| {
                    fb.draw_buffers
                        .iter()
                        .filter_map(|slot| fb.attachments[slot.index()])
                        .collect()
                })
                .unwrap_or_default(),
            None => vec![self.screen],
        }
    }

    fn depth_target(&self) -> Option<TextureHandle> {
        self.bound.last().and_then(|framebuffer| {
            self.framebuffers
                .get(&framebuffer.0)
                .and_then(|fb| fb.attachments[AttachmentSlot::Depth.index()])
        })
    }

    fn encode_texel(format: TextureFormat, color: [f32; 4]) -> Option<Vec<u8>> {
        let unorm = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        match format {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
                Some(color.iter().map(|c| unorm(*c)).collect())
            }
            TextureFormat::Bgra8Unorm => Some(vec![
                unorm(color[2]),
                unorm(color[1]),
                unorm(color[0]),
                unorm(color[3]),
            ]),
            TextureFormat::Rgba32Float => Some(bytemuck::cast_slice(&color).to_vec()),
            _ => None,
        }
    }
}

impl Device for DummyBackend {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::MultipleRenderTargets => self.multi_target,
            Capability::FloatRenderTargets => self.float_targets,
        }
    }

    fn max_color_attachments(&self) -> u32 {
        if self.multi_target {
            self.max_color_attachments
        } else {
            1
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        if desc.format.is_float()
            && desc.usage.contains(TextureUsage::RENDER_ATTACHMENT)
            && !self.float_targets
        {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: float render targets are not supported",
                desc.label
            )));
        }

        let handle = TextureHandle(self.allocate_id());
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.textures.insert(
            handle.0,
            DummyTexture {
                data: vec![0; desc.byte_size()],
                desc: desc.clone(),
            },
        );
        self.commands.push(DeviceCommand::CreateTexture(handle));
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let entry = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{texture:?}")))?;
        if entry.data.len() != data.len() {
            return Err(BackendError::TextureDataMismatch {
                expected: entry.data.len(),
                actual: data.len(),
            });
        }
        log::trace!("DummyBackend: writing {} bytes to {:?}", data.len(), texture);
        entry.data.copy_from_slice(data);
        self.commands.push(DeviceCommand::WriteTexture(texture));
        Ok(())
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle> {
        if self
            .framebuffer_limit
            .is_some_and(|limit| self.framebuffers.len() >= limit)
        {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "{:?}: framebuffer limit reached",
                label
            )));
        }
        let handle = FramebufferHandle(self.allocate_id());
        log::trace!("DummyBackend: creating framebuffer {:?}", label);
        self.framebuffers.insert(
            handle.0,
            DummyFramebuffer {
                attachments: [None; AttachmentSlot::COUNT],
                draw_buffers: vec![AttachmentSlot::Color0],
            },
        );
        self.commands.push(DeviceCommand::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn create_program(&mut self, shader: &Shader) -> BackendResult<ProgramHandle> {
        let handle = ProgramHandle(self.allocate_id());
        log::trace!("DummyBackend: creating program '{}'", shader.label());
        self.programs.insert(handle.0, shader.label().to_string());
        self.commands.push(DeviceCommand::CreateProgram(handle));
        Ok(handle)
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
        texture: Option<TextureHandle>,
    ) {
        log::trace!(
            "DummyBackend: attaching {:?} to {:?} {:?}",
            texture,
            framebuffer,
            slot
        );
        match self.framebuffers.get_mut(&framebuffer.0) {
            Some(fb) => fb.attachments[slot.index()] = texture,
            None => log::warn!("DummyBackend: attach to unknown {:?}", framebuffer),
        }
        self.commands.push(DeviceCommand::Attach {
            framebuffer,
            slot,
            texture,
        });
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        log::trace!("DummyBackend: binding {:?}", framebuffer);
        self.bound.push(framebuffer);
        self.commands.push(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn unbind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        log::trace!("DummyBackend: unbinding {:?}", framebuffer);
        match self.bound.iter().rposition(|fb| *fb == framebuffer) {
            Some(index) => {
                self.bound.remove(index);
            }
            None => log::warn!("DummyBackend: {:?} was not bound", framebuffer),
        }
        self.commands
            .push(DeviceCommand::UnbindFramebuffer(framebuffer));
    }

    fn set_draw_buffers(&mut self, slots: &[AttachmentSlot]) {
        log::trace!("DummyBackend: draw buffers {:?}", slots);
        match self
            .bound
            .last()
            .and_then(|fb| self.framebuffers.get_mut(&fb.0))
        {
            Some(fb) => fb.draw_buffers = slots.to_vec(),
            None => log::warn!("DummyBackend: draw buffers set without a bound framebuffer"),
        }
        self.commands.push(DeviceCommand::DrawBuffers(slots.to_vec()));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
        self.commands.push(DeviceCommand::DepthWrite(enabled));
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.color_write = enabled;
        self.commands.push(DeviceCommand::ColorWrite(enabled));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
        self.commands.push(DeviceCommand::ClearColor(color));
    }

    fn clear(&mut self, mask: ClearMask) -> BackendResult<()> {
        log::trace!("DummyBackend: clear {:?}", mask);
        if mask.contains(ClearMask::COLOR) && self.color_write {
            for target in self.color_targets() {
                let Some(entry) = self.textures.get_mut(&target.0) else {
                    continue;
                };
                match Self::encode_texel(entry.desc.format, self.clear_color) {
                    Some(texel) => {
                        for chunk in entry.data.chunks_exact_mut(texel.len()) {
                            chunk.copy_from_slice(&texel);
                        }
                    }
                    None => log::trace!(
                        "DummyBackend: colour clear of {:?} is not simulated",
                        entry.desc.format
                    ),
                }
            }
        }
        self.commands.push(DeviceCommand::Clear(mask));
        Ok(())
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.blend_enabled = enabled;
        self.commands.push(DeviceCommand::BlendEnabled(enabled));
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.blend_state = state;
        self.commands.push(DeviceCommand::BlendState(state));
    }

    fn draw_fullscreen(
        &mut self,
        quad: &FullscreenQuad,
        program: ProgramHandle,
        material: &Material,
    ) -> BackendResult<()> {
        let Some(label) = self.programs.get(&program.0) else {
            return Err(BackendError::InvalidHandle(format!("{program:?}")));
        };
        log::trace!("DummyBackend: drawing '{}'", label);

        let uniforms = material
            .shader()
            .uniforms()
            .iter()
            .filter_map(|info| {
                material
                    .uniform(&info.name)
                    .map(|value| (info.name.clone(), value.clone()))
            })
            .collect();

        let record = DrawRecord {
            program,
            framebuffer: self.bound_framebuffer(),
            color_targets: self.color_targets(),
            depth_target: self.depth_target(),
            uniforms,
            blend: self.blend_enabled.then_some(self.blend_state),
            transparent: material.is_transparent(),
            vertex_count: quad.vertices().len() as u32,
        };
        self.commands.push(DeviceCommand::Draw(record));
        Ok(())
    }

    fn read_pixels(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>> {
        self.textures
            .get(&texture.0)
            .map(|t| t.data.clone())
            .ok_or_else(|| BackendError::ReadbackFailed(format!("unknown {texture:?}")))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if texture == self.screen {
            log::warn!("DummyBackend: refusing to destroy the screen texture");
            return;
        }
        log::trace!("DummyBackend: destroying {:?}", texture);
        self.textures.remove(&texture.0);
        self.commands.push(DeviceCommand::DestroyTexture(texture));
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        log::trace!("DummyBackend: destroying {:?}", framebuffer);
        self.framebuffers.remove(&framebuffer.0);
        self.commands
            .push(DeviceCommand::DestroyFramebuffer(framebuffer));
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        log::trace!("DummyBackend: destroying {:?}", program);
        self.programs.remove(&program.0);
        self.commands.push(DeviceCommand::DestroyProgram(program));
    }
}
