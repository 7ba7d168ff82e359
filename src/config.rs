//! Compositor configuration

/// Configuration of graph resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Report cycles among resolved links
    pub detect_cycles: bool,
    /// Report wired inputs the consuming pass never reads
    pub report_unused_inputs: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            detect_cycles: true,
            report_unused_inputs: true,
        }
    }
}
