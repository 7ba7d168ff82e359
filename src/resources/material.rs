//! Materials: named uniform values bound to a reflected shader

use crate::backend::TextureHandle;
use crate::resources::shader::{Shader, UniformKind};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::collections::HashMap;

/// Value stored in a uniform slot
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// `array<vec4<f32>, N>`, e.g. blur kernels
    Vec4Array(Vec<Vec4>),
    Texture(TextureHandle),
}

impl UniformValue {
    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            UniformValue::Texture(texture) => Some(*texture),
            _ => None,
        }
    }

    /// Bytes as laid out in the uniform address space, `None` for textures
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let bytes = match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::UInt(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            // vec3 occupies a 16 byte slot
            UniformValue::Vec3(v) => bytemuck::bytes_of(&v.extend(0.0)).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Mat4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec4Array(values) => bytemuck::cast_slice(values).to_vec(),
            UniformValue::Texture(_) => return None,
        };
        Some(bytes)
    }

    fn fits(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (UniformValue::Texture(_), UniformKind::Texture)
                | (
                    UniformValue::Float(_)
                        | UniformValue::Int(_)
                        | UniformValue::UInt(_)
                        | UniformValue::Vec2(_)
                        | UniformValue::Vec3(_)
                        | UniformValue::Vec4(_)
                        | UniformValue::Mat4(_)
                        | UniformValue::Vec4Array(_),
                    UniformKind::Value { .. }
                )
        )
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::UInt(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(Vec2::from(v))
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(Vec4::from(v))
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(texture: TextureHandle) -> Self {
        UniformValue::Texture(texture)
    }
}

/// Uniform values of one program plus the draw flags the device honours
#[derive(Debug, Clone)]
pub struct Material {
    shader: Shader,
    values: HashMap<String, UniformValue>,
    transparent: bool,
}

impl Material {
    pub fn new(shader: Shader) -> Self {
        Self {
            shader,
            values: HashMap::new(),
            transparent: false,
        }
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    /// Store a value in a declared uniform slot.
    ///
    /// Names the program does not declare, and values of the wrong kind, are ignored.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        let value = value.into();
        match self.shader.uniform(name) {
            Some(info) if value.fits(info.kind) => {
                self.values.insert(name.to_string(), value);
            }
            Some(info) => {
                log::debug!(
                    "Material '{}': value {:?} does not fit uniform '{}' ({:?})",
                    self.shader.label(),
                    value,
                    name,
                    info.kind
                );
            }
            None => {
                log::trace!(
                    "Material '{}': ignoring undeclared uniform '{}'",
                    self.shader.label(),
                    name
                );
            }
        }
    }

    /// Current value of a uniform slot
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    /// Reset a uniform slot to unset
    pub fn clear_uniform(&mut self, name: &str) -> Option<UniformValue> {
        self.values.remove(name)
    }

    /// Whether the compiled program actually reads this uniform
    pub fn is_uniform_enabled(&self, name: &str) -> bool {
        self.shader.uses(name)
    }

    /// Texture uniforms currently set, in binding order
    pub fn textures(&self) -> impl Iterator<Item = (&str, TextureHandle)> + '_ {
        self.shader.uniforms().iter().filter_map(|info| {
            self.values
                .get(&info.name)
                .and_then(UniformValue::as_texture)
                .map(|texture| (info.name.as_str(), texture))
        })
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
    }
}
