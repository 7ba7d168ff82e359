//! Common utilities for compositor integration tests.
//!
//! Tests that only inspect recorded device state use the dummy backend directly.
//! Tests that read pixels back are parameterized over every available backend.

#![allow(dead_code)]

use redlilium_compositor::backend::{
    Device, DummyBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
};
use redlilium_compositor::resources::FullscreenQuad;
use redlilium_compositor::{Pass, ShaderLibrary};

/// Writes opaque white into the first colour target
pub const WHITE_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}
"#;

/// Writes into two colour targets
pub const MRT_FRAGMENT: &str = r#"
struct Targets {
    @location(0) color: vec4<f32>,
    @location(1) bloom: vec4<f32>,
}

@fragment
fn fs_main(input: VertexOutput) -> Targets {
    var out: Targets;
    out.color = vec4<f32>(1.0, 1.0, 1.0, 1.0);
    out.bloom = vec4<f32>(0.5, 0.5, 0.5, 1.0);
    return out;
}
"#;

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends pixel tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Recording backend with simulated clears
    Dummy,
    /// Headless wgpu device
    Wgpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => false,
        }
    }

    fn create_device(self) -> Option<Box<dyn Device>> {
        match self {
            Backend::Dummy => Some(Box::new(DummyBackend::new())),
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => {
                let config = redlilium_compositor::WgpuBackendConfig {
                    width: 4,
                    height: 4,
                    ..Default::default()
                };
                redlilium_compositor::WgpuBackend::new(config)
                    .ok()
                    .map(|backend| Box::new(backend) as Box<dyn Device>)
            }
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => None,
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device plus the shared objects every pass needs.
pub struct TestContext {
    pub backend: Backend,
    pub device: Box<dyn Device>,
    pub quad: FullscreenQuad,
    pub library: ShaderLibrary,
}

impl TestContext {
    /// Create a context for the given backend.
    ///
    /// Returns `None` if the backend is not compiled in or no adapter is present.
    pub fn new(backend: Backend) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        redlilium_compositor::init_logging();

        Some(Self {
            backend,
            device: backend.create_device()?,
            quad: FullscreenQuad::new(),
            library: ShaderLibrary::standard(),
        })
    }

    /// An RGBA8 render target that can also be filled from the CPU.
    pub fn create_target(&mut self, label: &str, width: u32, height: u32) -> TextureHandle {
        let desc =
            TextureDescriptor::render_target(label, width, height, TextureFormat::Rgba8Unorm);
        let desc = TextureDescriptor {
            usage: desc.usage | TextureUsage::COPY_DST,
            ..desc
        };
        self.device
            .create_texture(&desc)
            .expect("Failed to create render target")
    }

    /// Fill every texel of an RGBA8 texture with one colour.
    pub fn fill(&mut self, texture: TextureHandle, rgba: [u8; 4]) {
        let size = self
            .device
            .texture_descriptor(texture)
            .expect("Unknown texture")
            .byte_size();
        let data: Vec<u8> = rgba.iter().copied().cycle().take(size).collect();
        self.device
            .write_texture(texture, &data)
            .expect("Failed to fill texture");
    }

    /// Read back an RGBA8 texture as texels.
    pub fn pixels(&mut self, texture: TextureHandle) -> Vec<[u8; 4]> {
        self.device
            .read_pixels(texture)
            .expect("Failed to read pixels")
            .chunks_exact(4)
            .map(|texel| [texel[0], texel[1], texel[2], texel[3]])
            .collect()
    }

    /// Build a pass from fragment source.
    pub fn pass(&mut self, label: &str, fragment: &str) -> Pass {
        Pass::new(self.device.as_mut(), label, fragment).expect("Failed to build pass")
    }
}

/// Check that every texel has the expected colour.
pub fn assert_uniform_color(pixels: &[[u8; 4]], expected: [u8; 4]) {
    assert!(!pixels.is_empty(), "no pixels read back");
    for (index, texel) in pixels.iter().enumerate() {
        assert_eq!(*texel, expected, "texel {} differs", index);
    }
}
