//! Shader composition and reflection
//!
//! A [`Shader`] is a WGSL module made of the full-screen vertex stage and a
//! caller supplied fragment stage. It is parsed and validated with naga once, at
//! construction, and the reflection records every bound uniform together with
//! whether an entry point actually touches it.

use crate::error::{CompositorError, CompositorResult};

/// Entry point name of the vertex stage
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point name of the fragment stage
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// What kind of resource a uniform binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    /// A `var<uniform>` value of `size` bytes
    Value { size: u32 },
    /// A sampled texture
    Texture,
    /// A sampler
    Sampler,
}

/// Reflected uniform declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: UniformKind,
    /// Whether an entry point reads the uniform
    pub used: bool,
}

/// A composed, validated and reflected shader program source
#[derive(Debug, Clone)]
pub struct Shader {
    label: String,
    source: String,
    uniforms: Vec<UniformInfo>,
    color_outputs: u32,
}

impl Shader {
    /// Compose a program from a vertex and a fragment stage
    pub fn compose(label: &str, vertex: &str, fragment: &str) -> CompositorResult<Self> {
        Self::from_source(label, format!("{vertex}\n{fragment}"))
    }

    /// Parse, validate and reflect a complete WGSL module
    pub fn from_source(label: &str, source: String) -> CompositorResult<Self> {
        let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
            CompositorError::ShaderParse {
                label: label.to_string(),
                message: e.emit_to_string(&source),
            }
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| CompositorError::ShaderValidation {
                label: label.to_string(),
                message: e.to_string(),
            })?;

        let vertex_index = Self::find_entry_point(
            &module,
            label,
            (VERTEX_ENTRY, "vertex"),
            naga::ShaderStage::Vertex,
        )?;
        let fragment_index = Self::find_entry_point(
            &module,
            label,
            (FRAGMENT_ENTRY, "fragment"),
            naga::ShaderStage::Fragment,
        )?;

        let vertex_info = info.get_entry_point(vertex_index);
        let fragment_info = info.get_entry_point(fragment_index);

        let mut uniforms = Vec::new();
        for (handle, global) in module.global_variables.iter() {
            let (Some(name), Some(binding)) = (&global.name, &global.binding) else {
                continue;
            };

            let kind = match &module.types[global.ty].inner {
                naga::TypeInner::Image { .. } => UniformKind::Texture,
                naga::TypeInner::Sampler { .. } => UniformKind::Sampler,
                inner if global.space == naga::AddressSpace::Uniform => UniformKind::Value {
                    size: inner.size(module.to_ctx()),
                },
                _ => {
                    log::debug!(
                        "Shader '{}': skipping unsupported binding '{}' ({:?})",
                        label,
                        name,
                        global.space
                    );
                    continue;
                }
            };

            let used = !vertex_info[handle].is_empty() || !fragment_info[handle].is_empty();

            uniforms.push(UniformInfo {
                name: name.clone(),
                group: binding.group,
                binding: binding.binding,
                kind,
                used,
            });
        }
        uniforms.sort_by_key(|u| (u.group, u.binding));

        let color_outputs = Self::count_color_outputs(&module, fragment_index);

        log::debug!(
            "Shader '{}' reflected: {} uniforms, {} colour outputs",
            label,
            uniforms.len(),
            color_outputs
        );

        Ok(Self {
            label: label.to_string(),
            source,
            uniforms,
            color_outputs,
        })
    }

    fn find_entry_point(
        module: &naga::Module,
        label: &str,
        (name, stage_name): (&'static str, &'static str),
        stage: naga::ShaderStage,
    ) -> CompositorResult<usize> {
        module
            .entry_points
            .iter()
            .position(|ep| ep.name == name && ep.stage == stage)
            .ok_or_else(|| CompositorError::MissingEntryPoint {
                label: label.to_string(),
                stage: stage_name,
                entry_point: name,
            })
    }

    fn count_color_outputs(module: &naga::Module, fragment_index: usize) -> u32 {
        let Some(result) = &module.entry_points[fragment_index].function.result else {
            return 0;
        };

        if result.binding.is_some() {
            return 1;
        }

        match &module.types[result.ty].inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .filter(|m| matches!(m.binding, Some(naga::Binding::Location { .. })))
                .count() as u32,
            _ => 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Complete WGSL source
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Bound uniforms ordered by group and binding
    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Whether the program declares a uniform with this name
    pub fn declares(&self, name: &str) -> bool {
        self.uniform(name).is_some()
    }

    /// Whether the program declares the uniform and an entry point reads it
    pub fn uses(&self, name: &str) -> bool {
        self.uniform(name).is_some_and(|u| u.used)
    }

    /// Number of colour outputs of the fragment stage
    pub fn color_outputs(&self) -> u32 {
        self.color_outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FULLSCREEN_VERTEX_SHADER;

    const FRAGMENT: &str = r#"
@group(0) @binding(0) var colorTex: texture_2d<f32>;
@group(0) @binding(1) var colorSampler: sampler;
@group(0) @binding(2) var<uniform> exposure: f32;
@group(0) @binding(3) var<uniform> unusedTint: vec4<f32>;

fn expose(color: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(color.rgb * exposure, color.a);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return expose(textureSample(colorTex, colorSampler, input.uv));
}
"#;

    const MRT_FRAGMENT: &str = r#"
struct GBuffer {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
}

@fragment
fn fs_main(input: VertexOutput) -> GBuffer {
    var out: GBuffer;
    out.albedo = vec4<f32>(input.uv, 0.0, 1.0);
    out.normal = vec4<f32>(0.0, 0.0, 1.0, 1.0);
    return out;
}
"#;

    #[test]
    fn test_reflects_uniforms_in_binding_order() {
        let shader = Shader::compose("test", FULLSCREEN_VERTEX_SHADER, FRAGMENT).unwrap();
        let names: Vec<_> = shader.uniforms().iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["colorTex", "colorSampler", "exposure", "unusedTint"]);

        assert_eq!(
            shader.uniform("colorTex").map(|u| u.kind),
            Some(UniformKind::Texture)
        );
        assert_eq!(
            shader.uniform("exposure").map(|u| u.kind),
            Some(UniformKind::Value { size: 4 })
        );
        assert_eq!(
            shader.uniform("unusedTint").map(|u| u.kind),
            Some(UniformKind::Value { size: 16 })
        );
    }

    #[test]
    fn test_usage_follows_called_functions() {
        let shader = Shader::compose("test", FULLSCREEN_VERTEX_SHADER, FRAGMENT).unwrap();
        assert!(shader.uses("colorTex"));
        assert!(shader.uses("exposure"));
        assert!(shader.declares("unusedTint"));
        assert!(!shader.uses("unusedTint"));
        assert!(!shader.declares("missing"));
    }

    #[test]
    fn test_counts_color_outputs() {
        let single = Shader::compose("single", FULLSCREEN_VERTEX_SHADER, FRAGMENT).unwrap();
        assert_eq!(single.color_outputs(), 1);

        let mrt = Shader::compose("mrt", FULLSCREEN_VERTEX_SHADER, MRT_FRAGMENT).unwrap();
        assert_eq!(mrt.color_outputs(), 2);
    }

    #[test]
    fn test_missing_fragment_entry_point() {
        let result = Shader::from_source("vertex only", FULLSCREEN_VERTEX_SHADER.to_string());
        assert!(matches!(
            result,
            Err(CompositorError::MissingEntryPoint { stage: "fragment", .. })
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = Shader::compose("broken", FULLSCREEN_VERTEX_SHADER, "fn fs_main( {");
        assert!(matches!(result, Err(CompositorError::ShaderParse { .. })));
    }
}
