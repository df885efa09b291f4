//! Error types for scene construction and job submission.

use thiserror::Error;

/// Errors raised while building an acceleration structure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("Scene contains no geometry")]
    EmptyScene,

    #[error("Primitive {primitive} of geometry {geometry} has a non-finite bound")]
    InvalidBounds { geometry: usize, primitive: usize },

    #[error("Too many primitives for a packed identity: {0}")]
    TooManyPrimitives(usize),
}

/// Errors raised by the render engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Sample rate must be between 1 and 65535")]
    InvalidSampleRate,

    #[error("Render engine has been shut down")]
    ShutDown,

    #[error("Failed to spawn render worker: {0}")]
    Spawn(String),
}
