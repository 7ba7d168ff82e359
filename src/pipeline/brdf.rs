//! Split-sum BRDF lookup table
//!
//! The lookup table is rendered by a full-screen pass that integrates the
//! Cook-Torrance specular term over GGX importance samples. The samples are
//! generated on the CPU over a Hammersley sequence and uploaded as a texture,
//! one row per sample and one column per roughness level.

use std::f64::consts::PI;

use glam::Vec2;

use crate::backend::{
    AttachmentSlot, Capability, Device, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage,
};
use crate::error::CompositorResult;
use crate::render_graph::Pass;
use crate::resources::FullscreenQuad;
use crate::shader::library::INTEGRATE_BRDF;
use crate::shader::ShaderLibrary;

pub const DEFAULT_ROUGHNESS_LEVELS: u32 = 256;
pub const DEFAULT_SAMPLE_SIZE: u32 = 1024;

/// Size of the lookup table, N.V along x and roughness along y
pub const LUT_WIDTH: u32 = 512;
pub const LUT_HEIGHT: u32 = 256;

/// Importance sampled half vectors, RGBA32F texels
#[derive(Debug, Clone, PartialEq)]
pub struct NormalDistribution {
    roughness_levels: u32,
    sample_size: u32,
    texels: Vec<[f32; 4]>,
}

impl NormalDistribution {
    pub fn roughness_levels(&self) -> u32 {
        self.roughness_levels
    }

    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// Half vector of `sample` at roughness level `level`
    pub fn texel(&self, sample: u32, level: u32) -> Option<[f32; 4]> {
        if sample >= self.sample_size || level >= self.roughness_levels {
            return None;
        }
        self.texels
            .get((sample * self.roughness_levels + level) as usize)
            .copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Upload as a sampled RGBA32F texture
    pub fn upload(&self, device: &mut dyn Device) -> CompositorResult<TextureHandle> {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("normal_distribution".to_string()),
            width: self.roughness_levels,
            height: self.sample_size,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        device.write_texture(texture, self.as_bytes())?;
        Ok(texture)
    }
}

/// Generate GGX half vectors for `roughness_levels` roughness values and
/// `sample_size` Hammersley points.
pub fn generate_normal_distribution(roughness_levels: u32, sample_size: u32) -> NormalDistribution {
    let roughness_levels = roughness_levels.max(1);
    let sample_size = sample_size.max(1);
    let mut texels = Vec::with_capacity((roughness_levels * sample_size) as usize);

    for i in 0..sample_size {
        let x = i as f64 / sample_size as f64;
        let y = i.reverse_bits() as f64 / 4_294_967_296.0;
        let phi = 2.0 * PI * x;

        for j in 0..roughness_levels {
            let roughness = j as f64 / roughness_levels as f64;
            let a = roughness * roughness;
            let cos_theta = ((1.0 - y) / (1.0 + (a * a - 1.0) * y)).sqrt();
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

            texels.push([
                (sin_theta * phi.cos()) as f32,
                (sin_theta * phi.sin()) as f32,
                cos_theta as f32,
                1.0,
            ]);
        }
    }

    NormalDistribution {
        roughness_levels,
        sample_size,
        texels,
    }
}

/// Render the BRDF lookup table from an uploaded normal distribution.
///
/// Falls back to an 8 bit target when the device cannot render float textures.
pub fn integrate_brdf(
    device: &mut dyn Device,
    quad: &FullscreenQuad,
    library: &ShaderLibrary,
    normal_distribution: TextureHandle,
) -> CompositorResult<TextureHandle> {
    let format = if device.supports(Capability::FloatRenderTargets) {
        TextureFormat::Rgba32Float
    } else {
        log::debug!("integrate_brdf: float targets unsupported, using Rgba8Unorm");
        TextureFormat::Rgba8Unorm
    };

    let mut pass = Pass::from_library(device, library, INTEGRATE_BRDF)?;
    let desc = TextureDescriptor::render_target("brdf_lut", LUT_WIDTH, LUT_HEIGHT, format);
    let lut = match device.create_texture(&desc) {
        Ok(lut) => lut,
        Err(err) => {
            pass.dispose(device);
            return Err(err.into());
        }
    };
    let framebuffer = match device.create_framebuffer(Some("brdf_lut")) {
        Ok(framebuffer) => framebuffer,
        Err(err) => {
            device.destroy_texture(lut);
            pass.dispose(device);
            return Err(err.into());
        }
    };

    pass.set_uniform("normalDistribution", normal_distribution);
    pass.set_uniform("viewportSize", Vec2::new(LUT_WIDTH as f32, LUT_HEIGHT as f32));
    pass.attach_output(lut, AttachmentSlot::Color0);

    let result = pass.render(device, quad, Some(framebuffer));

    device.destroy_framebuffer(framebuffer);
    pass.dispose(device);

    match result {
        Ok(()) => Ok(lut),
        Err(err) => {
            device.destroy_texture(lut);
            Err(err)
        }
    }
}

/// Generate the default normal distribution and integrate the lookup table.
///
/// Returns `(normal_distribution, lut)`; both textures belong to the caller.
pub fn generate_brdf_lookup(
    device: &mut dyn Device,
    quad: &FullscreenQuad,
    library: &ShaderLibrary,
) -> CompositorResult<(TextureHandle, TextureHandle)> {
    let distribution =
        generate_normal_distribution(DEFAULT_ROUGHNESS_LEVELS, DEFAULT_SAMPLE_SIZE).upload(device)?;
    match integrate_brdf(device, quad, library, distribution) {
        Ok(lut) => Ok((distribution, lut)),
        Err(err) => {
            device.destroy_texture(distribution);
            Err(err)
        }
    }
}
