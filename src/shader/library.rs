//! Built-in compositor shader library.
//!
//! Fragment stages are stored as `.wgsl` files in `shaders/compositor/` and
//! are paired with the full-screen vertex stage when a pass is built.
//!
//! # Available Fragments
//!
//! | Key | Description | Uniforms |
//! |-----|-------------|----------|
//! | `compositor.output` | Copy a texture | `colorTex` |
//! | `compositor.blend` | Weighted sum of two textures | `texture1`, `texture2`, `weights` |
//! | `compositor.gaussian_blur` | One direction of a separable blur | `colorTex`, `blurParams` |
//! | `compositor.tonemap` | HDR tone mapping | `hdrTex`, `tonemapParams` |
//! | `compositor.integrate_brdf` | Split-sum BRDF LUT | `normalDistribution`, `viewportSize` |

use std::borrow::Cow;

use crate::resources::FULLSCREEN_VERTEX_SHADER;

const OUTPUT_FRAGMENT: &str = include_str!("../../shaders/compositor/output.wgsl");
const BLEND_FRAGMENT: &str = include_str!("../../shaders/compositor/blend.wgsl");
const GAUSSIAN_BLUR_FRAGMENT: &str = include_str!("../../shaders/compositor/gaussian_blur.wgsl");
const TONEMAP_FRAGMENT: &str = include_str!("../../shaders/compositor/tonemap.wgsl");
const INTEGRATE_BRDF_FRAGMENT: &str = include_str!("../../shaders/compositor/integrate_brdf.wgsl");

/// Key of the copy fragment
pub const OUTPUT: &str = "compositor.output";
/// Key of the two texture blend fragment
pub const BLEND: &str = "compositor.blend";
/// Key of the separable blur fragment
pub const GAUSSIAN_BLUR: &str = "compositor.gaussian_blur";
/// Key of the tone mapping fragment
pub const TONEMAP: &str = "compositor.tonemap";
/// Key of the BRDF integration fragment
pub const INTEGRATE_BRDF: &str = "compositor.integrate_brdf";

/// String keyed store of fragment stages
pub struct ShaderLibrary {
    vertex: Cow<'static, str>,
    fragments: Vec<(String, Cow<'static, str>)>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

impl ShaderLibrary {
    /// Library with every built-in compositor fragment
    pub fn standard() -> Self {
        Self::empty()
            .with_fragment(OUTPUT, OUTPUT_FRAGMENT)
            .with_fragment(BLEND, BLEND_FRAGMENT)
            .with_fragment(GAUSSIAN_BLUR, GAUSSIAN_BLUR_FRAGMENT)
            .with_fragment(TONEMAP, TONEMAP_FRAGMENT)
            .with_fragment(INTEGRATE_BRDF, INTEGRATE_BRDF_FRAGMENT)
    }

    /// Library with only the full-screen vertex stage
    pub fn empty() -> Self {
        Self {
            vertex: Cow::Borrowed(FULLSCREEN_VERTEX_SHADER),
            fragments: Vec::new(),
        }
    }

    /// Vertex stage paired with every fragment of this library
    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    /// Fragment source registered under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fragments
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, source)| source.as_ref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.fragments.iter().map(|(name, _)| name.as_str())
    }

    /// Register a fragment, replacing any previous source under the same key
    pub fn register(&mut self, key: &str, source: impl Into<Cow<'static, str>>) {
        let source = source.into();
        match self.fragments.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => {
                log::debug!("ShaderLibrary: replacing '{}'", key);
                *existing = source;
            }
            None => self.fragments.push((key.to_string(), source)),
        }
    }

    pub fn with_fragment(mut self, key: &str, source: impl Into<Cow<'static, str>>) -> Self {
        self.register(key, source);
        self
    }
}
