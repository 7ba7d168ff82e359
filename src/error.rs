//! Compositor error types

use crate::backend::BackendError;
use crate::render_graph::NodeId;
use thiserror::Error;

/// Errors raised by the compositor outside of graph resolution.
///
/// Link resolution itself never fails; it reports [`crate::render_graph::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Failed to parse shader '{label}': {message}")]
    ShaderParse { label: String, message: String },
    #[error("Failed to validate shader '{label}': {message}")]
    ShaderValidation { label: String, message: String },
    #[error("Shader '{label}' has no {stage} entry point '{entry_point}'")]
    MissingEntryPoint {
        label: String,
        stage: &'static str,
        entry_point: &'static str,
    },
    #[error("Unknown shader library entry: {0}")]
    UnknownShader(String),
    #[error("Node {0:?} is not part of the graph")]
    NodeNotFound(NodeId),
}

pub type CompositorResult<T> = Result<T, CompositorError>;
