//! Backend abstraction layer
//!
//! Provides the [`Device`] trait passes render through, a recording dummy backend
//! and a headless wgpu backend.

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::{DeviceCommand, DrawRecord, DummyBackend};
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{WgpuBackend, WgpuBackendConfig};
