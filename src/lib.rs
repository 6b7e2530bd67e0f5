//! An instanced 2D sprite renderer for OpenGL ES 3.0, using [glow].
//!
//! [`InstancedSpriteRenderer`] owns one static quad, two per-instance buffers
//! (a 2×2 scale-rotation matrix and an offset per sprite), the vertex array
//! that binds them with a per-instance divisor, and the shader program. Each
//! frame the caller maps the per-instance buffers, writes one entry per
//! sprite, unmaps, and issues a single instanced draw.
//!
//! All GL traffic goes through the [`GlBackend`] trait. [`GlowBackend`]
//! implements it for a real context; because context identity is part of the
//! trait, teardown can tell whether its context is still alive and skip
//! deletion when it is not.
//!
//! [`SpriteScene`] is a small driver on top: a grid of sprites sized to the
//! viewport, each spinning at its own speed, configured by
//! [`RendererConfig`].
//!
//! # Features
//!
//! - **`glow`** (default): the [`GlowBackend`] implementation.
//!
//! # Safety
//!
//! Creating a [`GlowBackend`] is `unsafe`: the wrapped context must be valid
//! and current whenever the renderer is used.
//!
//! [glow]: https://docs.rs/glow

mod backend;
mod config;
mod error;
mod render;
mod scene;
pub mod shaders;
mod types;

#[cfg(feature = "glow")]
pub use backend::GlowBackend;
pub use backend::{BufferContents, BufferUsage, ContextId, GlBackend};
pub use config::RendererConfig;
pub use error::{ConfigError, Lifecycle, RendererError};
pub use render::{InstancedSpriteRenderer, MAX_SUPPORTED_INSTANCES};
pub use scene::{grid_layout, GridLayout, SceneError, SpriteScene};
pub use types::{
    AttribKind, InstanceBuffer, InstanceData, InstanceOffset, InstanceTransform, Vertex,
    VertexAttrib, COLOR_ATTRIB, COLOR_LAYOUT, OFFSET_ATTRIB, OFFSET_LAYOUT, POS_ATTRIB,
    POS_LAYOUT, QUAD, QUAD_VERTEX_COUNT, SCALEROT_ATTRIB, SCALEROT_LAYOUT,
};
