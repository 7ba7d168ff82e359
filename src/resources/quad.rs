//! Full-screen draw primitive shared by every pass

use std::ops::Range;

/// Vertex stage paired with every compositor fragment stage.
///
/// Generates a single triangle covering the viewport from the vertex index, so no
/// vertex buffer is needed. Fragment stages receive a `VertexOutput` with `uv` in
/// `[0, 1]`, origin at the top left.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// The full-screen draw
///
/// Built once by whoever owns a set of passes and handed to each render by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullscreenQuad {
    vertex_count: u32,
}

impl Default for FullscreenQuad {
    fn default() -> Self {
        Self::new()
    }
}

impl FullscreenQuad {
    pub fn new() -> Self {
        Self { vertex_count: 3 }
    }

    /// Vertex stage source
    pub fn vertex_source(&self) -> &'static str {
        FULLSCREEN_VERTEX_SHADER
    }

    /// Vertex range of the draw
    pub fn vertices(&self) -> Range<u32> {
        0..self.vertex_count
    }
}
