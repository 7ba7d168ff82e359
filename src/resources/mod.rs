//! Resource management
//!
//! Shaders, materials and the full-screen draw primitive used by passes.

mod material;
mod quad;
mod shader;

pub use material::*;
pub use quad::*;
pub use shader::*;
