//! Core device abstraction
//!
//! The compositor drives the GPU through an immediate-mode [`Device`]: targets are
//! bound and unbound, clear and blend state is set explicitly, and each pass issues
//! a single full-screen draw.

use crate::backend::types::*;
use crate::resources::{FullscreenQuad, Material, Shader};
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to read back pixels: {0}")]
    ReadbackFailed(String),
    #[error("Texture data does not match the texture size: expected {expected} bytes, got {actual}")]
    TextureDataMismatch { expected: usize, actual: usize },
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of attachments bound as one render target)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Graphics device used by passes
///
/// State set through this trait (blend, write masks, clear colour, draw buffers)
/// persists until it is set again.
pub trait Device {
    /// Human readable backend name
    fn name(&self) -> &str;

    /// Query an optional capability
    fn supports(&self, capability: Capability) -> bool;

    /// Number of colour attachments a single draw may write
    fn max_color_attachments(&self) -> u32;

    // Resource creation

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Replace the whole contents of a texture with tightly packed texels
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()>;

    /// Descriptor the texture was created with
    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor>;

    /// Create an empty framebuffer
    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle>;

    /// Compile a program from a composed and reflected shader
    fn create_program(&mut self, shader: &Shader) -> BackendResult<ProgramHandle>;

    // Render target state

    /// Attach a texture to a framebuffer slot, or detach whatever is there with `None`
    fn attach(
        &mut self,
        framebuffer: FramebufferHandle,
        slot: AttachmentSlot,
        texture: Option<TextureHandle>,
    );

    /// Make a framebuffer the active target, remembering the previous one
    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Restore the target that was active before the matching bind
    fn unbind_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Colour slots written by subsequent draws into the bound framebuffer
    fn set_draw_buffers(&mut self, slots: &[AttachmentSlot]);

    // Fixed function state

    fn set_depth_write(&mut self, enabled: bool);

    fn set_color_write(&mut self, enabled: bool);

    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clear the buffers in `mask` of the active target
    fn clear(&mut self, mask: ClearMask) -> BackendResult<()>;

    fn set_blend_enabled(&mut self, enabled: bool);

    /// Blend function and equation used while blending is enabled
    fn set_blend_state(&mut self, state: BlendState);

    // Drawing

    /// Draw the full-screen primitive into the active target
    fn draw_fullscreen(
        &mut self,
        quad: &FullscreenQuad,
        program: ProgramHandle,
        material: &Material,
    ) -> BackendResult<()>;

    /// Read back the texels of a texture, tightly packed
    fn read_pixels(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>>;

    // Destruction

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    fn destroy_program(&mut self, program: ProgramHandle);
}
