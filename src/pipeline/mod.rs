//! Effects built on top of passes
//!
//! - [`postprocess::PostProcessPass`] - a pass that owns its render target
//! - [`brdf`] - BRDF lookup table generation for image based lighting

pub mod brdf;
pub mod postprocess;

pub use brdf::{
    generate_brdf_lookup, generate_normal_distribution, integrate_brdf, NormalDistribution,
};
pub use postprocess::PostProcessPass;
