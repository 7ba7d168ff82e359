//! Post-processing helpers
//!
//! [`PostProcessPass`] wraps a [`Pass`] together with the texture and
//! framebuffer it renders into, for effects that chain passes by hand instead
//! of through a graph.

use crate::backend::{AttachmentSlot, Device, FramebufferHandle, TextureDescriptor, TextureHandle};
use crate::error::CompositorResult;
use crate::render_graph::Pass;
use crate::resources::{FullscreenQuad, UniformValue};
use crate::shader::ShaderLibrary;

struct OwnedTarget {
    desc: TextureDescriptor,
    texture: TextureHandle,
    framebuffer: FramebufferHandle,
}

/// A pass that owns its render target
pub struct PostProcessPass {
    pass: Pass,
    target: Option<OwnedTarget>,
}

impl PostProcessPass {
    /// Build from fragment source.
    ///
    /// With a `target` descriptor the pass renders into a texture it owns,
    /// otherwise into whatever target is bound when it runs.
    pub fn new(
        device: &mut dyn Device,
        label: &str,
        fragment: &str,
        target: Option<TextureDescriptor>,
        clear_color: Option<[f32; 4]>,
    ) -> CompositorResult<Self> {
        let pass = Pass::new(device, label, fragment)?;
        Self::with_pass(device, pass, target, clear_color)
    }

    /// Build from a fragment registered in a library
    pub fn from_library(
        device: &mut dyn Device,
        library: &ShaderLibrary,
        key: &str,
        target: Option<TextureDescriptor>,
        clear_color: Option<[f32; 4]>,
    ) -> CompositorResult<Self> {
        let pass = Pass::from_library(device, library, key)?;
        Self::with_pass(device, pass, target, clear_color)
    }

    fn with_pass(
        device: &mut dyn Device,
        mut pass: Pass,
        target: Option<TextureDescriptor>,
        clear_color: Option<[f32; 4]>,
    ) -> CompositorResult<Self> {
        pass.set_clear_color(clear_color);

        let target = match target {
            Some(desc) => match Self::create_target(device, desc) {
                Ok(target) => {
                    pass.attach_output(target.texture, AttachmentSlot::Color0);
                    Some(target)
                }
                Err(err) => {
                    pass.dispose(device);
                    return Err(err);
                }
            },
            None => None,
        };

        Ok(Self { pass, target })
    }

    fn create_target(
        device: &mut dyn Device,
        desc: TextureDescriptor,
    ) -> CompositorResult<OwnedTarget> {
        let texture = device.create_texture(&desc)?;
        let framebuffer = match device.create_framebuffer(desc.label.as_deref()) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                device.destroy_texture(texture);
                return Err(err.into());
            }
        };
        Ok(OwnedTarget {
            desc,
            texture,
            framebuffer,
        })
    }

    pub fn pass(&self) -> &Pass {
        &self.pass
    }

    pub fn pass_mut(&mut self) -> &mut Pass {
        &mut self.pass
    }

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.pass.set_uniform(name, value);
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.pass.uniform(name)
    }

    /// Texture this pass renders into, `None` when it renders to the bound target
    pub fn target_texture(&self) -> Option<TextureHandle> {
        self.target.as_ref().map(|target| target.texture)
    }

    /// Size of the owned target
    pub fn size(&self) -> Option<(u32, u32)> {
        self.target
            .as_ref()
            .map(|target| (target.desc.width, target.desc.height))
    }

    /// Recreate the owned target at a new size.
    ///
    /// The target texture handle changes; consumers must fetch [`Self::target_texture`] again.
    pub fn resize(
        &mut self,
        device: &mut dyn Device,
        width: u32,
        height: u32,
    ) -> CompositorResult<()> {
        let Some(target) = self.target.as_mut() else {
            return Ok(());
        };
        if target.desc.width == width && target.desc.height == height {
            return Ok(());
        }

        let mut desc = target.desc.clone();
        desc.width = width;
        desc.height = height;
        let texture = device.create_texture(&desc)?;

        log::debug!(
            "PostProcessPass '{}': resizing target to {}x{}",
            self.pass.label(),
            width,
            height
        );
        self.pass.detach_output(target.texture);
        device.destroy_texture(target.texture);
        self.pass.attach_output(texture, AttachmentSlot::Color0);

        target.desc = desc;
        target.texture = texture;
        Ok(())
    }

    pub fn render(
        &mut self,
        device: &mut dyn Device,
        quad: &FullscreenQuad,
    ) -> CompositorResult<()> {
        let framebuffer = self.target.as_ref().map(|target| target.framebuffer);
        self.pass.render(device, quad, framebuffer)
    }

    /// Release the program and the owned target
    pub fn dispose(self, device: &mut dyn Device) {
        if let Some(target) = self.target {
            device.destroy_framebuffer(target.framebuffer);
            device.destroy_texture(target.texture);
        }
        self.pass.dispose(device);
    }
}
