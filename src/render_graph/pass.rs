//! Full-screen pass
//!
//! A [`Pass`] owns a program made of the shared full-screen vertex stage and a
//! caller supplied fragment stage, and renders it once per call into the
//! textures attached to it.

use std::fmt;

use crate::backend::{
    AttachmentSlot, BlendState, Capability, ClearMask, Device, FramebufferHandle, ProgramHandle,
    TextureHandle,
};
use crate::error::{CompositorError, CompositorResult};
use crate::render_graph::attachment::AttachmentTable;
use crate::resources::{FullscreenQuad, Material, Shader, UniformValue, FULLSCREEN_VERTEX_SHADER};
use crate::shader::ShaderLibrary;

/// When an observer is notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    /// After the target is bound, before anything is cleared
    Before,
    /// After the draw, before the target is unbound
    After,
}

type Observer = Box<dyn FnMut(RenderStage, &mut Material)>;

/// A single full-screen processing stage
pub struct Pass {
    label: String,
    material: Material,
    program: ProgramHandle,
    outputs: AttachmentTable,
    blend_with_previous: bool,
    blend_state: BlendState,
    clear_color: Option<[f32; 4]>,
    observers: Vec<Observer>,
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("label", &self.label)
            .field("program", &self.program)
            .field("outputs", &self.outputs)
            .field("blend_with_previous", &self.blend_with_previous)
            .field("clear_color", &self.clear_color)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Pass {
    /// Compile a pass from fragment source
    pub fn new(device: &mut dyn Device, label: &str, fragment: &str) -> CompositorResult<Self> {
        let shader = Shader::compose(label, FULLSCREEN_VERTEX_SHADER, fragment)?;
        Self::from_shader(device, shader)
    }

    /// Compile a pass from a fragment stage registered in a library
    pub fn from_library(
        device: &mut dyn Device,
        library: &ShaderLibrary,
        key: &str,
    ) -> CompositorResult<Self> {
        let fragment = library
            .get(key)
            .ok_or_else(|| CompositorError::UnknownShader(key.to_string()))?;
        let vertex = library.vertex();
        let shader = Shader::compose(key, vertex, fragment)?;
        Self::from_shader(device, shader)
    }

    /// Create a pass around an already composed shader
    pub fn from_shader(device: &mut dyn Device, shader: Shader) -> CompositorResult<Self> {
        let program = device.create_program(&shader)?;
        log::debug!("Pass '{}': created program {:?}", shader.label(), program);

        Ok(Self {
            label: shader.label().to_string(),
            material: Material::new(shader),
            program,
            outputs: AttachmentTable::new(),
            blend_with_previous: false,
            blend_state: BlendState::default(),
            clear_color: None,
            observers: Vec::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    /// Set a uniform; ignored when the program does not declare it
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.material.set_uniform(name, value);
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.material.uniform(name)
    }

    /// Render into `texture` through `slot`, replacing what the slot held.
    ///
    /// `None` selects [`AttachmentSlot::Color0`].
    pub fn attach_output(
        &mut self,
        texture: TextureHandle,
        slot: impl Into<Option<AttachmentSlot>>,
    ) {
        let slot = slot.into().unwrap_or(AttachmentSlot::Color0);
        if let Some(previous) = self.outputs.attach(slot, texture) {
            log::trace!(
                "Pass '{}': {:?} replaced {:?} in {:?}",
                self.label,
                texture,
                previous,
                slot
            );
        }
    }

    /// Stop rendering into `texture`, wherever it is attached
    pub fn detach_output(&mut self, texture: TextureHandle) {
        self.outputs.detach(texture);
    }

    /// Swap in a whole attachment table, returning the previous one
    pub fn replace_outputs(&mut self, outputs: AttachmentTable) -> AttachmentTable {
        std::mem::replace(&mut self.outputs, outputs)
    }

    pub fn output(&self, slot: AttachmentSlot) -> Option<TextureHandle> {
        self.outputs.get(slot)
    }

    pub fn outputs(&self) -> &AttachmentTable {
        &self.outputs
    }

    pub fn blend_with_previous(&self) -> bool {
        self.blend_with_previous
    }

    /// Blend onto the target's current contents instead of overwriting them
    pub fn set_blend_with_previous(&mut self, blend: bool) {
        self.blend_with_previous = blend;
    }

    pub fn blend_state(&self) -> BlendState {
        self.blend_state
    }

    /// Blend function and equation used when blending with the previous contents
    pub fn set_blend_state(&mut self, state: BlendState) {
        self.blend_state = state;
    }

    pub fn clear_color(&self) -> Option<[f32; 4]> {
        self.clear_color
    }

    /// Clear colour before drawing, `None` keeps the target's colour contents
    pub fn set_clear_color(&mut self, color: Option<[f32; 4]>) {
        self.clear_color = color;
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub fn with_blend(mut self, state: BlendState) -> Self {
        self.blend_with_previous = true;
        self.blend_state = state;
        self
    }

    /// Notify `observer` before and after every render
    pub fn add_observer(&mut self, observer: impl FnMut(RenderStage, &mut Material) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn on_before_render(&mut self, mut observer: impl FnMut(&mut Material) + 'static) {
        self.add_observer(move |stage, material| {
            if stage == RenderStage::Before {
                observer(material);
            }
        });
    }

    pub fn on_after_render(&mut self, mut observer: impl FnMut(&mut Material) + 'static) {
        self.add_observer(move |stage, material| {
            if stage == RenderStage::After {
                observer(material);
            }
        });
    }

    fn notify(&mut self, stage: RenderStage) {
        for observer in self.observers.iter_mut() {
            observer(stage, &mut self.material);
        }
    }

    /// Render the pass once.
    ///
    /// With a `target`, every attachment slot of the framebuffer is set from this
    /// pass' outputs before binding, and the previous target is restored afterwards.
    /// Without one, the pass draws into the currently bound target.
    pub fn render(
        &mut self,
        device: &mut dyn Device,
        quad: &FullscreenQuad,
        target: Option<FramebufferHandle>,
    ) -> CompositorResult<()> {
        log::trace!("Pass '{}': render into {:?}", self.label, target);

        if let Some(framebuffer) = target {
            self.bind(device, framebuffer);
        }

        self.notify(RenderStage::Before);

        let result = self.draw(device, quad);

        self.notify(RenderStage::After);

        if let Some(framebuffer) = target {
            device.unbind_framebuffer(framebuffer);
        }

        result
    }

    fn bind(&self, device: &mut dyn Device, framebuffer: FramebufferHandle) {
        for (slot, texture) in self.outputs.entries() {
            device.attach(framebuffer, slot, texture);
        }
        device.bind_framebuffer(framebuffer);

        let slots = self.outputs.color_slots(AttachmentSlot::MAX_COLOR);
        if device.supports(Capability::MultipleRenderTargets) {
            let limit = device.max_color_attachments();
            let slots: Vec<_> = slots
                .into_iter()
                .filter(|slot| slot.color_index().is_some_and(|i| i < limit))
                .collect();
            if !slots.is_empty() {
                device.set_draw_buffers(&slots);
            }
        } else if slots.len() > 1 {
            log::debug!(
                "Pass '{}': {} colour outputs but the device draws into one",
                self.label,
                slots.len()
            );
        }
    }

    fn draw(&mut self, device: &mut dyn Device, quad: &FullscreenQuad) -> CompositorResult<()> {
        let mut mask = ClearMask::DEPTH;
        device.set_depth_write(true);
        if let Some(color) = self.clear_color {
            mask |= ClearMask::COLOR;
            device.set_color_write(true);
            device.set_clear_color(color);
        }
        device.clear(mask)?;

        if self.blend_with_previous {
            device.set_blend_state(self.blend_state);
            device.set_blend_enabled(true);
        } else {
            device.set_blend_enabled(false);
        }
        self.material.set_transparent(self.blend_with_previous);

        device.draw_fullscreen(quad, self.program, &self.material)?;
        Ok(())
    }

    /// Release the program. Attached textures belong to their creators and are kept.
    pub fn dispose(self, device: &mut dyn Device) {
        log::debug!("Pass '{}': disposing program {:?}", self.label, self.program);
        device.destroy_program(self.program);
    }
}
