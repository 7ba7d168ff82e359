//! Shader sources
//!
//! Built-in compositor fragment stages, see [`ShaderLibrary`].

pub mod library;

pub use library::ShaderLibrary;
