//! The instanced sprite renderer: owns the GL objects, enforces the
//! map/unmap discipline on the per-instance buffers, and issues the draw.

use tracing::{debug, info, trace, warn};

use crate::{
    backend::{BufferContents, BufferUsage, ContextId, GlBackend},
    error::{Lifecycle, RendererError},
    shaders,
    types::{
        InstanceBuffer, InstanceData, InstanceOffset, InstanceTransform, COLOR_LAYOUT,
        OFFSET_LAYOUT, POS_LAYOUT, QUAD, QUAD_VERTEX_COUNT, SCALEROT_LAYOUT,
    },
};

/// Largest capacity whose transform buffer still fits in a GL `i32` size.
pub const MAX_SUPPORTED_INSTANCES: usize =
    i32::MAX as usize / std::mem::size_of::<InstanceTransform>();

/// Draws a fixed colored quad many times, each instance with its own
/// scale-rotation and offset.
///
/// GL objects are created in [`initialize`](Self::initialize) and released on
/// [`destroy`](Self::destroy) or drop, but only while the context that was
/// current at construction is still current. If that context has been lost,
/// its objects are already gone and nothing is deleted.
///
/// Per frame the caller maps each per-instance buffer, writes the first `n`
/// entries, unmaps, and then calls [`draw`](Self::draw) with `n`. Buffers that
/// are not rewritten keep their previous contents, so static instance data
/// only needs to be written once.
///
/// # Example
///
/// ```no_run
/// # use gles3_instanced_sprites::{GlBackend, InstancedSpriteRenderer, InstanceOffset, InstanceTransform};
/// # fn example<B: GlBackend>(backend: B) -> Result<(), gles3_instanced_sprites::RendererError> {
/// let mut renderer = InstancedSpriteRenderer::new(backend, 256);
/// renderer.initialize()?;
///
/// // Each frame:
/// let transforms = renderer.map_transforms()?;
/// transforms[0] = InstanceTransform::IDENTITY;
/// renderer.unmap_transforms()?;
/// renderer.write_offsets(&[InstanceOffset([0.0, 0.0])])?;
/// renderer.draw(1)?;
/// # Ok(())
/// # }
/// ```
pub struct InstancedSpriteRenderer<B: GlBackend> {
    backend: B,

    /// Context that was current at construction; teardown only deletes while
    /// it is still current.
    owner: ContextId,

    /// Number of instance slots in each per-instance buffer.
    capacity: usize,

    state: Lifecycle,

    program: Option<B::Program>,
    /// Static quad geometry.
    quad_vbo: Option<B::Buffer>,
    /// Per-instance buffers, indexed by [`InstanceBuffer::index`].
    instance_vbos: [Option<B::Buffer>; 2],
    /// Attribute bindings for all four slots.
    vao: Option<B::VertexArray>,

    /// Whether each per-instance buffer is currently mapped.
    mapped: [bool; 2],
}

impl<B: GlBackend> InstancedSpriteRenderer<B> {
    /// Create a renderer bound to the backend's current context.
    ///
    /// No GL objects exist until [`initialize`](Self::initialize) succeeds.
    /// `capacity` is clamped to [`MAX_SUPPORTED_INSTANCES`].
    pub fn new(backend: B, capacity: usize) -> Self {
        let owner = backend.current_context();
        if capacity > MAX_SUPPORTED_INSTANCES {
            warn!(capacity, "instance capacity clamped to {MAX_SUPPORTED_INSTANCES}");
        }
        Self {
            backend,
            owner,
            capacity: capacity.min(MAX_SUPPORTED_INSTANCES),
            state: Lifecycle::Uninitialized,
            program: None,
            quad_vbo: None,
            instance_vbos: [None; 2],
            vao: None,
            mapped: [false; 2],
        }
    }

    /// Build the program, allocate the three buffers, and record the vertex
    /// attribute layout.
    ///
    /// On failure every object this call created is released again and the
    /// renderer stays uninitialized, so the call may be retried.
    ///
    /// # Errors
    ///
    /// - [`RendererError::Initialization`] if the program fails to build.
    /// - [`RendererError::ObjectCreation`] if the driver is out of names.
    /// - [`RendererError::ResourceBinding`] if the driver flags an error while
    ///   allocating or configuring.
    /// - [`RendererError::InvalidState`] if already initialized or torn down.
    /// - [`RendererError::ContextLost`] if the owning context is not current.
    pub fn initialize(&mut self) -> Result<(), RendererError> {
        self.expect_state(Lifecycle::Uninitialized)?;
        self.expect_owner_current()?;

        if let Err(e) = self.create_objects() {
            self.release_objects();
            return Err(e);
        }

        self.state = Lifecycle::Initialized;
        info!(capacity = self.capacity, "using OpenGL ES 3.0 instanced renderer");
        Ok(())
    }

    /// Create and configure every GL object, storing each handle as soon as
    /// it exists.
    fn create_objects(&mut self) -> Result<(), RendererError> {
        let program = self
            .backend
            .compile_program(shaders::VERTEX_SRC, shaders::FRAGMENT_SRC)
            .map_err(|log| {
                warn!("sprite program build failed");
                RendererError::Initialization(log)
            })?;
        self.program = Some(program);

        let quad = self.create_buffer("quad vertex buffer")?;
        self.quad_vbo = Some(quad);
        let transforms = self.create_buffer("transform buffer")?;
        self.instance_vbos[InstanceBuffer::Transform.index()] = Some(transforms);
        let offsets = self.create_buffer("offset buffer")?;
        self.instance_vbos[InstanceBuffer::Offset.index()] = Some(offsets);

        let backend = &self.backend;
        backend.upload_buffer(
            quad,
            BufferContents::Data(bytemuck::cast_slice(&QUAD)),
            BufferUsage::Static,
        );
        backend.upload_buffer(
            transforms,
            BufferContents::Uninit(Self::byte_len::<InstanceTransform>(self.capacity)),
            BufferUsage::Dynamic,
        );
        // Offsets only change when the viewport does.
        backend.upload_buffer(
            offsets,
            BufferContents::Uninit(Self::byte_len::<InstanceOffset>(self.capacity)),
            BufferUsage::Static,
        );
        self.check_driver("buffer allocation")?;

        let vao = self
            .backend
            .create_vertex_array()
            .map_err(|reason| RendererError::ObjectCreation {
                object: "vertex array",
                reason,
            })?;
        self.vao = Some(vao);

        let backend = &self.backend;
        backend.bind_vertex_array(Some(vao));
        backend.vertex_attrib(quad, &POS_LAYOUT);
        backend.vertex_attrib(quad, &COLOR_LAYOUT);
        backend.vertex_attrib(transforms, &SCALEROT_LAYOUT);
        backend.vertex_attrib(offsets, &OFFSET_LAYOUT);
        backend.bind_vertex_array(None);
        self.check_driver("vertex attribute setup")
    }

    /// Number of instance slots in each per-instance buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Whether `buffer` is currently mapped.
    #[must_use]
    pub fn is_mapped(&self, buffer: InstanceBuffer) -> bool {
        self.mapped[buffer.index()]
    }

    /// The backend this renderer issues calls through.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Map the transform buffer for writing. The whole capacity is returned;
    /// previous contents are discarded.
    ///
    /// # Errors
    ///
    /// See [`map`](Self::map).
    pub fn map_transforms(&mut self) -> Result<&mut [InstanceTransform], RendererError> {
        self.map()
    }

    /// Commit the transform buffer.
    ///
    /// # Errors
    ///
    /// See [`unmap`](Self::unmap).
    pub fn unmap_transforms(&mut self) -> Result<(), RendererError> {
        self.unmap(InstanceBuffer::Transform)
    }

    /// Map the offset buffer for writing. The whole capacity is returned;
    /// previous contents are discarded.
    ///
    /// # Errors
    ///
    /// See [`map`](Self::map).
    pub fn map_offsets(&mut self) -> Result<&mut [InstanceOffset], RendererError> {
        self.map()
    }

    /// Commit the offset buffer.
    ///
    /// # Errors
    ///
    /// See [`unmap`](Self::unmap).
    pub fn unmap_offsets(&mut self) -> Result<(), RendererError> {
        self.unmap(InstanceBuffer::Offset)
    }

    /// Map, copy `transforms` into the first slots, and unmap.
    ///
    /// # Errors
    ///
    /// [`RendererError::CapacityExceeded`] if `transforms` is longer than the
    /// capacity (nothing is mapped), otherwise as for [`map`](Self::map) and
    /// [`unmap`](Self::unmap).
    pub fn write_transforms(
        &mut self,
        transforms: &[InstanceTransform],
    ) -> Result<(), RendererError> {
        self.write(transforms)
    }

    /// Map, copy `offsets` into the first slots, and unmap.
    ///
    /// # Errors
    ///
    /// As for [`write_transforms`](Self::write_transforms).
    pub fn write_offsets(&mut self, offsets: &[InstanceOffset]) -> Result<(), RendererError> {
        self.write(offsets)
    }

    /// Map the buffer holding `T` for writing.
    ///
    /// # Errors
    ///
    /// - [`RendererError::AlreadyMapped`] if the buffer is already mapped.
    /// - [`RendererError::MapFailed`] if the driver returned no usable region.
    /// - [`RendererError::InvalidState`] unless initialized.
    /// - [`RendererError::ContextLost`] if the owning context is not current.
    pub fn map<T: InstanceData>(&mut self) -> Result<&mut [T], RendererError> {
        let kind = T::BUFFER;
        self.expect_state(Lifecycle::Initialized)?;
        self.expect_owner_current()?;
        if self.mapped[kind.index()] {
            return Err(RendererError::AlreadyMapped(kind));
        }
        let buffer = self.instance_vbos[kind.index()].ok_or(RendererError::MapFailed(kind))?;

        let len = Self::byte_len::<T>(self.capacity);
        let ptr = self.backend.map_buffer_for_write(buffer, len);
        if ptr.is_null() {
            let code = self.backend.take_error();
            warn!(buffer = %kind, ?code, "buffer mapping failed");
            return Err(RendererError::MapFailed(kind));
        }
        self.mapped[kind.index()] = true;
        trace!(buffer = %kind, len, "mapped");

        // SAFETY: the backend contract guarantees `ptr` is valid for `len`
        // bytes until unmap, which needs `&mut self` and so cannot happen
        // while the returned slice is alive.
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
        match bytemuck::try_cast_slice_mut(bytes) {
            Ok(slots) => Ok(slots),
            Err(e) => {
                warn!(buffer = %kind, "unusable mapping: {e}");
                self.backend.unmap_buffer(buffer);
                self.mapped[kind.index()] = false;
                Err(RendererError::MapFailed(kind))
            }
        }
    }

    /// Commit a mapped buffer so the next draw sees its contents.
    ///
    /// # Errors
    ///
    /// - [`RendererError::NotMapped`] if `buffer` is not mapped.
    /// - [`RendererError::ResourceBinding`] if the driver flags an error.
    /// - [`RendererError::ContextLost`] if the owning context is not current.
    pub fn unmap(&mut self, buffer: InstanceBuffer) -> Result<(), RendererError> {
        if !self.mapped[buffer.index()] {
            return Err(RendererError::NotMapped(buffer));
        }
        self.expect_owner_current()?;
        if let Some(vbo) = self.instance_vbos[buffer.index()] {
            self.backend.unmap_buffer(vbo);
        }
        self.mapped[buffer.index()] = false;
        trace!(buffer = %buffer, "unmapped");
        self.check_driver("buffer unmap")
    }

    fn write<T: InstanceData>(&mut self, values: &[T]) -> Result<(), RendererError> {
        if values.len() > self.capacity {
            return Err(RendererError::CapacityExceeded {
                requested: values.len(),
                capacity: self.capacity,
            });
        }
        let slots = self.map::<T>()?;
        slots[..values.len()].copy_from_slice(values);
        self.unmap(T::BUFFER)
    }

    /// Draw `instance_count` instances of the quad.
    ///
    /// Exactly one instanced draw is issued, including when `instance_count`
    /// is zero.
    ///
    /// # Errors
    ///
    /// - [`RendererError::CapacityExceeded`] if `instance_count` is larger
    ///   than the capacity.
    /// - [`RendererError::MappedDuringDraw`] if either per-instance buffer is
    ///   still mapped.
    /// - [`RendererError::InvalidState`] unless initialized.
    /// - [`RendererError::ContextLost`] if the owning context is not current.
    /// - [`RendererError::ResourceBinding`] if the driver flags an error.
    pub fn draw(&mut self, instance_count: u32) -> Result<(), RendererError> {
        self.expect_state(Lifecycle::Initialized)?;
        let requested = instance_count as usize;
        if requested > self.capacity {
            return Err(RendererError::CapacityExceeded {
                requested,
                capacity: self.capacity,
            });
        }
        if let Some(kind) = InstanceBuffer::ALL.into_iter().find(|b| self.is_mapped(*b)) {
            return Err(RendererError::MappedDuringDraw(kind));
        }
        self.expect_owner_current()?;

        let (Some(program), Some(vao)) = (self.program, self.vao) else {
            return Err(RendererError::InvalidState {
                expected: Lifecycle::Initialized,
                actual: self.state,
            });
        };

        let backend = &self.backend;
        backend.use_program(program);
        backend.bind_vertex_array(Some(vao));
        backend.draw_instanced_strip(QUAD_VERTEX_COUNT, instance_count);
        self.check_driver("instanced draw")
    }

    /// Set the viewport to cover `width` × `height` pixels.
    ///
    /// # Errors
    ///
    /// [`RendererError::ContextLost`] if the owning context is not current.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RendererError> {
        self.expect_owner_current()?;
        self.backend.set_viewport(width, height);
        Ok(())
    }

    /// Clear the color buffer.
    ///
    /// # Errors
    ///
    /// [`RendererError::ContextLost`] if the owning context is not current.
    pub fn clear(&mut self, color: [f32; 4]) -> Result<(), RendererError> {
        self.expect_owner_current()?;
        self.backend.clear(color);
        Ok(())
    }

    /// Release all GL objects owned by this renderer.
    ///
    /// Deletes nothing if the owning context is no longer current, since its
    /// objects were destroyed along with it. Safe to call more than once and
    /// after a failed [`initialize`](Self::initialize).
    pub fn destroy(&mut self) {
        if self.state == Lifecycle::TornDown {
            return;
        }
        self.state = Lifecycle::TornDown;
        self.release_objects();
    }

    /// Delete every handle still held, unless the owning context is gone.
    fn release_objects(&mut self) {
        self.mapped = [false; 2];

        let program = self.program.take();
        let vao = self.vao.take();
        let buffers = [
            self.quad_vbo.take(),
            self.instance_vbos[0].take(),
            self.instance_vbos[1].take(),
        ];

        if self.backend.current_context() != self.owner {
            debug!("owning context is gone; skipping GL object deletion");
            return;
        }

        let backend = &self.backend;
        if let Some(vao) = vao {
            backend.delete_vertex_array(vao);
        }
        for buffer in buffers.into_iter().flatten() {
            backend.delete_buffer(buffer);
        }
        if let Some(program) = program {
            backend.delete_program(program);
        }
        debug!("instanced renderer released");
    }

    fn create_buffer(&self, object: &'static str) -> Result<B::Buffer, RendererError> {
        self.backend
            .create_buffer()
            .map_err(|reason| RendererError::ObjectCreation { object, reason })
    }

    fn byte_len<T>(capacity: usize) -> usize {
        capacity * std::mem::size_of::<T>()
    }

    fn expect_state(&self, expected: Lifecycle) -> Result<(), RendererError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RendererError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn expect_owner_current(&self) -> Result<(), RendererError> {
        if self.backend.current_context() == self.owner {
            Ok(())
        } else {
            Err(RendererError::ContextLost)
        }
    }

    /// Surface the oldest pending driver error, draining the rest.
    fn check_driver(&self, operation: &'static str) -> Result<(), RendererError> {
        let Some(code) = self.backend.take_error() else {
            return Ok(());
        };
        warn!(operation, "GL error 0x{code:04X}");
        while let Some(extra) = self.backend.take_error() {
            debug!(operation, "additional GL error 0x{extra:04X}");
        }
        Err(RendererError::ResourceBinding { operation, code })
    }
}

impl<B: GlBackend> Drop for InstancedSpriteRenderer<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
