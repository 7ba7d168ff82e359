//! # RedLilium Compositor
//!
//! A post-processing compositor built from full-screen passes.
//!
//! - [`render_graph::Graph`] holds named nodes whose input pins reference the
//!   output pins of other nodes by name or id; [`render_graph::Graph::update`]
//!   resolves those references into links and reports problems as diagnostics.
//! - [`render_graph::Pass`] renders one full-screen draw with a fixed protocol:
//!   bind the target, notify observers, clear, set blend state, draw, notify, unbind.
//! - [`backend::Device`] is the immediate-mode device passes render through,
//!   implemented by a recording [`backend::DummyBackend`] and a headless wgpu backend.

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod shader;

pub use backend::{Device, DummyBackend};
#[cfg(feature = "wgpu-backend")]
pub use backend::{WgpuBackend, WgpuBackendConfig};
pub use config::CompositorConfig;
pub use error::{CompositorError, CompositorResult};
pub use pipeline::PostProcessPass;
pub use render_graph::{Graph, GraphExecutor, Node, NodeId, Pass, ResolveReport};
pub use shader::ShaderLibrary;

/// Compositor library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the compositor.
pub fn init() {
    log::info!("RedLilium Compositor v{} initialized", VERSION);
}

/// Install a stderr logger filtered by `RUST_LOG`, `info` by default.
///
/// Does nothing if a logger is already installed.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
