//! A [`GlBackend`] that records calls instead of talking to a driver.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::{BufferContents, BufferUsage, ContextId, GlBackend};
use crate::types::VertexAttrib;

/// The context every fake starts out "current" on.
pub(crate) const HOME_CONTEXT: ContextId = ContextId(0xE61);

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    CompileProgram(u32),
    CreateBuffer(u32),
    UploadBuffer {
        buffer: u32,
        len: usize,
        usage: BufferUsage,
    },
    CreateVertexArray(u32),
    BindVertexArray(Option<u32>),
    VertexAttrib { buffer: u32, attrib: VertexAttrib },
    Map { buffer: u32, len: usize },
    Unmap(u32),
    UseProgram(u32),
    DrawInstancedStrip {
        vertex_count: u32,
        instance_count: u32,
    },
    Viewport(u32, u32),
    Clear([f32; 4]),
    DeleteVertexArray(u32),
    DeleteBuffer(u32),
    DeleteProgram(u32),
}

/// Records every call and keeps buffer contents in host memory.
///
/// Mapping hands out fresh zeroed staging storage, which is copied into the
/// buffer on unmap.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    pub calls: RefCell<Vec<Call>>,
    /// When set, `current_context` reports this instead of [`HOME_CONTEXT`].
    pub context: Cell<Option<ContextId>>,
    /// When set, `compile_program` fails with this log.
    pub compile_error: RefCell<Option<String>>,
    /// Fail the n-th `create_buffer` call (0-based).
    pub fail_buffer_creation: Cell<Option<u32>>,
    /// Make `map_buffer_for_write` return null.
    pub fail_map: Cell<bool>,
    /// Errors returned by `take_error`, oldest first.
    pub pending_errors: RefCell<Vec<u32>>,
    next_name: Cell<u32>,
    buffers_created: Cell<u32>,
    storage: RefCell<HashMap<u32, Vec<u8>>>,
    staging: RefCell<HashMap<u32, Box<[u32]>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn name(&self) -> u32 {
        let name = self.next_name.get() + 1;
        self.next_name.set(name);
        name
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Committed contents of `buffer`.
    pub fn contents(&self, buffer: u32) -> Vec<u8> {
        self.storage
            .borrow()
            .get(&buffer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn draw_calls(&self) -> Vec<(u32, u32)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::DrawInstancedStrip {
                    vertex_count,
                    instance_count,
                } => Some((*vertex_count, *instance_count)),
                _ => None,
            })
            .collect()
    }

    pub fn deletions(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::DeleteVertexArray(_) | Call::DeleteBuffer(_) | Call::DeleteProgram(_)
                )
            })
            .cloned()
            .collect()
    }
}

// SAFETY: staging slices are boxed `u32`s (4-byte aligned) that are only
// dropped on unmap or when the backend itself is dropped.
unsafe impl GlBackend for RecordingBackend {
    type Program = u32;
    type Buffer = u32;
    type VertexArray = u32;

    fn current_context(&self) -> ContextId {
        self.context.get().unwrap_or(HOME_CONTEXT)
    }

    fn compile_program(&self, _vertex_src: &str, _fragment_src: &str) -> Result<u32, String> {
        if let Some(log) = self.compile_error.borrow().clone() {
            return Err(log);
        }
        let name = self.name();
        self.record(Call::CompileProgram(name));
        Ok(name)
    }

    fn create_buffer(&self) -> Result<u32, String> {
        let index = self.buffers_created.get();
        self.buffers_created.set(index + 1);
        if self.fail_buffer_creation.get() == Some(index) {
            return Err("out of names".into());
        }
        let name = self.name();
        self.record(Call::CreateBuffer(name));
        Ok(name)
    }

    fn upload_buffer(&self, buffer: u32, contents: BufferContents<'_>, usage: BufferUsage) {
        let bytes = match contents {
            BufferContents::Data(data) => data.to_vec(),
            BufferContents::Uninit(len) => vec![0; len],
        };
        self.record(Call::UploadBuffer {
            buffer,
            len: bytes.len(),
            usage,
        });
        self.storage.borrow_mut().insert(buffer, bytes);
    }

    fn create_vertex_array(&self) -> Result<u32, String> {
        let name = self.name();
        self.record(Call::CreateVertexArray(name));
        Ok(name)
    }

    fn bind_vertex_array(&self, vertex_array: Option<u32>) {
        self.record(Call::BindVertexArray(vertex_array));
    }

    fn vertex_attrib(&self, buffer: u32, attrib: &VertexAttrib) {
        self.record(Call::VertexAttrib {
            buffer,
            attrib: *attrib,
        });
    }

    fn map_buffer_for_write(&self, buffer: u32, len: usize) -> *mut u8 {
        self.record(Call::Map { buffer, len });
        if self.fail_map.get() {
            return std::ptr::null_mut();
        }
        let mut staging = vec![0u32; len.div_ceil(4)].into_boxed_slice();
        let ptr = staging.as_mut_ptr().cast::<u8>();
        self.staging.borrow_mut().insert(buffer, staging);
        ptr
    }

    fn unmap_buffer(&self, buffer: u32) {
        self.record(Call::Unmap(buffer));
        if let Some(staging) = self.staging.borrow_mut().remove(&buffer) {
            let bytes: &[u8] = bytemuck::cast_slice(&staging);
            if let Some(store) = self.storage.borrow_mut().get_mut(&buffer) {
                let n = store.len().min(bytes.len());
                store[..n].copy_from_slice(&bytes[..n]);
            }
        }
    }

    fn use_program(&self, program: u32) {
        self.record(Call::UseProgram(program));
    }

    fn draw_instanced_strip(&self, vertex_count: u32, instance_count: u32) {
        self.record(Call::DrawInstancedStrip {
            vertex_count,
            instance_count,
        });
    }

    fn set_viewport(&self, width: u32, height: u32) {
        self.record(Call::Viewport(width, height));
    }

    fn clear(&self, color: [f32; 4]) {
        self.record(Call::Clear(color));
    }

    fn take_error(&self) -> Option<u32> {
        let mut pending = self.pending_errors.borrow_mut();
        if pending.is_empty() {
            None
        } else {
            Some(pending.remove(0))
        }
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        self.record(Call::DeleteVertexArray(vertex_array));
    }

    fn delete_buffer(&self, buffer: u32) {
        self.staging.borrow_mut().remove(&buffer);
        self.record(Call::DeleteBuffer(buffer));
    }

    fn delete_program(&self, program: u32) {
        self.record(Call::DeleteProgram(program));
    }
}
