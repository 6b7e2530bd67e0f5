//! Error types for the renderer and its configuration.

use std::path::PathBuf;

use crate::types::InstanceBuffer;

/// Lifecycle stage of an [`InstancedSpriteRenderer`](crate::InstancedSpriteRenderer).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, no GL objects yet.
    Uninitialized,
    /// GL objects exist; mapping and drawing are allowed.
    Initialized,
    /// Objects released (or abandoned with a lost context). Terminal.
    TornDown,
}

/// Errors reported by renderer operations.
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// The sprite program failed to compile or link; carries the driver log.
    #[error("program build failed: {0}")]
    Initialization(String),

    /// The driver could not allocate a GL object name.
    #[error("failed to create {object}: {reason}")]
    ObjectCreation {
        /// Which object was being created.
        object: &'static str,
        /// The driver's explanation.
        reason: String,
    },

    /// The driver flagged an error after a call.
    #[error("GL error 0x{code:04X} during {operation}")]
    ResourceBinding {
        /// The step that was running.
        operation: &'static str,
        /// The `glGetError` code.
        code: u32,
    },

    /// More instances were requested than the buffers hold.
    #[error("{requested} instances exceed the capacity of {capacity}")]
    CapacityExceeded {
        /// Instances asked for.
        requested: usize,
        /// Instance slots available.
        capacity: usize,
    },

    /// Map called on a buffer that has not been unmapped.
    #[error("{0} buffer is already mapped")]
    AlreadyMapped(InstanceBuffer),

    /// Unmap called on a buffer that is not mapped.
    #[error("{0} buffer is not mapped")]
    NotMapped(InstanceBuffer),

    /// Draw called while a per-instance buffer is still mapped.
    #[error("cannot draw while the {0} buffer is mapped")]
    MappedDuringDraw(InstanceBuffer),

    /// The driver returned a null or unusable mapping.
    #[error("driver returned no mapping for the {0} buffer")]
    MapFailed(InstanceBuffer),

    /// The operation is not allowed in the current lifecycle stage.
    #[error("renderer is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// Stage the operation needs.
        expected: Lifecycle,
        /// Stage the renderer is in.
        actual: Lifecycle,
    },

    /// The context the renderer was created on is not current.
    #[error("the GL context that owns this renderer is no longer current")]
    ContextLost,
}

/// Errors from loading or validating a [`RendererConfig`](crate::RendererConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file could not be read or is not valid TOML for the schema.
    #[error("config parse error: {0}")]
    ParseError(String),

    /// One or more fields are out of range.
    #[error("config validation error: {0}")]
    ValidationError(String),
}
