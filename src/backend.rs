//! The GL capability layer the renderer is written against.
//!
//! [`GlBackend`] exposes exactly the driver operations the instancing
//! pipeline needs. [`GlowBackend`] forwards them to a real OpenGL ES context
//! through [glow]; tests substitute a recording fake so that lifecycle and
//! map/draw ordering can be checked without a GPU.
//!
//! [glow]: https://docs.rs/glow

use std::fmt;

use crate::types::VertexAttrib;

#[cfg(test)]
pub(crate) mod recording;

/// Identity of a graphics context (for EGL, the `EGLContext` address).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Initial contents of a buffer object.
#[derive(Copy, Clone, Debug)]
pub enum BufferContents<'a> {
    /// Upload these bytes.
    Data(&'a [u8]),
    /// Allocate this many bytes with undefined contents.
    Uninit(usize),
}

impl BufferContents<'_> {
    /// Size of the allocation in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Data(data) => data.len(),
            Self::Uninit(len) => *len,
        }
    }

    /// Whether the allocation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Usage hint passed to the driver when storage is allocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once or rarely.
    Static,
    /// Rewritten most frames.
    Dynamic,
}

/// Driver operations used by [`InstancedSpriteRenderer`].
///
/// Every call acts on the context the backend was created for. Buffer
/// operations take the buffer handle explicitly; implementations bind it
/// themselves, so callers must not rely on any binding surviving a call.
///
/// # Safety
///
/// A non-null pointer returned by [`map_buffer_for_write`] must be valid for
/// writes of the requested length, aligned to at least 4 bytes, and must not
/// alias any other live memory until [`unmap_buffer`] is called for the same
/// buffer or the buffer is deleted.
///
/// [`InstancedSpriteRenderer`]: crate::InstancedSpriteRenderer
/// [`map_buffer_for_write`]: GlBackend::map_buffer_for_write
/// [`unmap_buffer`]: GlBackend::unmap_buffer
pub unsafe trait GlBackend {
    /// Linked shader program name.
    type Program: Copy + fmt::Debug;
    /// Buffer object name.
    type Buffer: Copy + fmt::Debug;
    /// Vertex array object name.
    type VertexArray: Copy + fmt::Debug;

    /// Identity of the context that is current right now.
    fn current_context(&self) -> ContextId;

    /// Compile and link a vertex + fragment program.
    ///
    /// # Errors
    ///
    /// Returns the compile or link log on failure.
    fn compile_program(&self, vertex_src: &str, fragment_src: &str)
        -> Result<Self::Program, String>;

    /// Create an empty buffer object.
    ///
    /// # Errors
    ///
    /// Returns the driver's reason if no name could be allocated.
    fn create_buffer(&self) -> Result<Self::Buffer, String>;

    /// (Re)allocate `buffer`'s storage as an array buffer.
    fn upload_buffer(&self, buffer: Self::Buffer, contents: BufferContents<'_>, usage: BufferUsage);

    /// Create an empty vertex array object.
    ///
    /// # Errors
    ///
    /// Returns the driver's reason if no name could be allocated.
    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;

    /// Bind a vertex array, or unbind with `None`.
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);

    /// Point an attribute slot of the bound vertex array at `buffer`, enable
    /// it, and set its divisor.
    fn vertex_attrib(&self, buffer: Self::Buffer, attrib: &VertexAttrib);

    /// Map the first `len` bytes of `buffer` for writing, discarding the
    /// previous contents. Returns null on failure.
    fn map_buffer_for_write(&self, buffer: Self::Buffer, len: usize) -> *mut u8;

    /// Commit a mapping made by [`map_buffer_for_write`](Self::map_buffer_for_write).
    fn unmap_buffer(&self, buffer: Self::Buffer);

    /// Make `program` current.
    fn use_program(&self, program: Self::Program);

    /// Draw the bound vertex array as a triangle strip of `vertex_count`
    /// vertices, `instance_count` times.
    fn draw_instanced_strip(&self, vertex_count: u32, instance_count: u32);

    /// Set the viewport to `(0, 0, width, height)`.
    fn set_viewport(&self, width: u32, height: u32);

    /// Clear the color buffer.
    fn clear(&self, color: [f32; 4]);

    /// Pop the oldest pending driver error, if any.
    fn take_error(&self) -> Option<u32>;

    /// Delete a vertex array object.
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    /// Delete a buffer object, implicitly unmapping it.
    fn delete_buffer(&self, buffer: Self::Buffer);
    /// Delete a program.
    fn delete_program(&self, program: Self::Program);
}

#[cfg(feature = "glow")]
pub use self::glow_backend::GlowBackend;

#[cfg(feature = "glow")]
mod glow_backend {
    use std::sync::Arc;

    use glow::HasContext;

    use super::{BufferContents, BufferUsage, ContextId, GlBackend};
    use crate::shaders;
    use crate::types::{AttribKind, VertexAttrib};

    /// Convert a size or count to the `i32` GL expects.
    ///
    /// # Panics
    ///
    /// Panics if `value > i32::MAX`. Renderer capacity is validated so that
    /// every buffer size stays below this bound.
    fn gl_int<T>(value: T) -> i32
    where
        i32: TryFrom<T>,
    {
        i32::try_from(value)
            .ok()
            .expect("GL size exceeds i32::MAX")
    }

    fn usage_enum(usage: BufferUsage) -> u32 {
        match usage {
            BufferUsage::Static => glow::STATIC_DRAW,
            BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        }
    }

    /// [`GlBackend`] over a [`glow::Context`].
    ///
    /// glow has no notion of context identity, so the caller supplies a query
    /// (typically `eglGetCurrentContext` cast to an integer).
    pub struct GlowBackend {
        gl: Arc<glow::Context>,
        current_context: Box<dyn Fn() -> ContextId>,
    }

    impl GlowBackend {
        /// Wrap a context.
        ///
        /// # Safety
        ///
        /// `gl` must stay valid for the lifetime of the backend, and the
        /// context it was loaded for must be current on the calling thread
        /// whenever `current_context` reports its identity.
        pub unsafe fn new(
            gl: Arc<glow::Context>,
            current_context: impl Fn() -> ContextId + 'static,
        ) -> Self {
            Self {
                gl,
                current_context: Box::new(current_context),
            }
        }

        /// The wrapped context.
        #[must_use]
        pub fn gl(&self) -> &Arc<glow::Context> {
            &self.gl
        }
    }

    // SAFETY: `map_buffer_range` returns driver memory valid for the requested
    // range until `unmap_buffer`; GL guarantees at least 64-byte alignment.
    unsafe impl GlBackend for GlowBackend {
        type Program = glow::Program;
        type Buffer = glow::Buffer;
        type VertexArray = glow::VertexArray;

        fn current_context(&self) -> ContextId {
            (self.current_context)()
        }

        fn compile_program(
            &self,
            vertex_src: &str,
            fragment_src: &str,
        ) -> Result<Self::Program, String> {
            unsafe { shaders::compile_program(&self.gl, vertex_src, fragment_src) }
        }

        fn create_buffer(&self) -> Result<Self::Buffer, String> {
            unsafe { self.gl.create_buffer() }
        }

        fn upload_buffer(
            &self,
            buffer: Self::Buffer,
            contents: BufferContents<'_>,
            usage: BufferUsage,
        ) {
            let gl = &self.gl;
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
                match contents {
                    BufferContents::Data(data) => {
                        gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, usage_enum(usage));
                    }
                    BufferContents::Uninit(len) => {
                        gl.buffer_data_size(glow::ARRAY_BUFFER, gl_int(len), usage_enum(usage));
                    }
                }
            }
        }

        fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
            unsafe { self.gl.create_vertex_array() }
        }

        fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
            unsafe { self.gl.bind_vertex_array(vertex_array) };
        }

        fn vertex_attrib(&self, buffer: Self::Buffer, attrib: &VertexAttrib) {
            let gl = &self.gl;
            let (data_type, normalized) = match attrib.kind {
                AttribKind::Float => (glow::FLOAT, false),
                AttribKind::NormalizedU8 => (glow::UNSIGNED_BYTE, true),
            };
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
                gl.vertex_attrib_pointer_f32(
                    attrib.slot,
                    gl_int(attrib.components),
                    data_type,
                    normalized,
                    gl_int(attrib.stride),
                    gl_int(attrib.offset),
                );
                gl.enable_vertex_attrib_array(attrib.slot);
                gl.vertex_attrib_divisor(attrib.slot, attrib.divisor);
            }
        }

        fn map_buffer_for_write(&self, buffer: Self::Buffer, len: usize) -> *mut u8 {
            let gl = &self.gl;
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
                gl.map_buffer_range(
                    glow::ARRAY_BUFFER,
                    0,
                    gl_int(len),
                    glow::MAP_WRITE_BIT | glow::MAP_INVALIDATE_BUFFER_BIT,
                )
            }
        }

        fn unmap_buffer(&self, buffer: Self::Buffer) {
            let gl = &self.gl;
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
                gl.unmap_buffer(glow::ARRAY_BUFFER);
            }
        }

        fn use_program(&self, program: Self::Program) {
            unsafe { self.gl.use_program(Some(program)) };
        }

        fn draw_instanced_strip(&self, vertex_count: u32, instance_count: u32) {
            unsafe {
                self.gl.draw_arrays_instanced(
                    glow::TRIANGLE_STRIP,
                    0,
                    gl_int(vertex_count),
                    gl_int(instance_count),
                );
            }
        }

        fn set_viewport(&self, width: u32, height: u32) {
            unsafe { self.gl.viewport(0, 0, gl_int(width), gl_int(height)) };
        }

        fn clear(&self, [r, g, b, a]: [f32; 4]) {
            unsafe {
                self.gl.clear_color(r, g, b, a);
                self.gl.clear(glow::COLOR_BUFFER_BIT);
            }
        }

        fn take_error(&self) -> Option<u32> {
            match unsafe { self.gl.get_error() } {
                glow::NO_ERROR => None,
                code => Some(code),
            }
        }

        fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
            unsafe { self.gl.delete_vertex_array(vertex_array) };
        }

        fn delete_buffer(&self, buffer: Self::Buffer) {
            unsafe { self.gl.delete_buffer(buffer) };
        }

        fn delete_program(&self, program: Self::Program) {
            unsafe { self.gl.delete_program(program) };
        }
    }
}

// SAFETY: forwards to `T`, which upholds the mapping contract.
unsafe impl<T: GlBackend + ?Sized> GlBackend for &T {
    type Program = T::Program;
    type Buffer = T::Buffer;
    type VertexArray = T::VertexArray;

    fn current_context(&self) -> ContextId {
        (**self).current_context()
    }

    fn compile_program(
        &self,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self::Program, String> {
        (**self).compile_program(vertex_src, fragment_src)
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        (**self).create_buffer()
    }

    fn upload_buffer(&self, buffer: Self::Buffer, contents: BufferContents<'_>, usage: BufferUsage) {
        (**self).upload_buffer(buffer, contents, usage);
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        (**self).create_vertex_array()
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        (**self).bind_vertex_array(vertex_array);
    }

    fn vertex_attrib(&self, buffer: Self::Buffer, attrib: &VertexAttrib) {
        (**self).vertex_attrib(buffer, attrib);
    }

    fn map_buffer_for_write(&self, buffer: Self::Buffer, len: usize) -> *mut u8 {
        (**self).map_buffer_for_write(buffer, len)
    }

    fn unmap_buffer(&self, buffer: Self::Buffer) {
        (**self).unmap_buffer(buffer);
    }

    fn use_program(&self, program: Self::Program) {
        (**self).use_program(program);
    }

    fn draw_instanced_strip(&self, vertex_count: u32, instance_count: u32) {
        (**self).draw_instanced_strip(vertex_count, instance_count);
    }

    fn set_viewport(&self, width: u32, height: u32) {
        (**self).set_viewport(width, height);
    }

    fn clear(&self, color: [f32; 4]) {
        (**self).clear(color);
    }

    fn take_error(&self) -> Option<u32> {
        (**self).take_error()
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        (**self).delete_vertex_array(vertex_array);
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        (**self).delete_buffer(buffer);
    }

    fn delete_program(&self, program: Self::Program) {
        (**self).delete_program(program);
    }
}
