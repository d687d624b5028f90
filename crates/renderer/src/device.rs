//! Explicit device seam.
//!
//! Every piece of GPU state the scene touches (buffers, vertex layouts,
//! programs, uniform values, the bound program and vertex array) is reached
//! through a [`RenderDevice`] and named by a typed handle. Nothing relies on a
//! hidden "current" binding outside the device itself.

use asset::IndexWidth;
use corelib::Mat4;

/// Device-resident buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u32);

/// Vertex + index buffer pair with its attribute layout (one drawable unit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub(crate) u32);

/// A compiled shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u32);

/// A linked vertex + fragment program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

/// Byte offset of a uniform inside its program's uniform block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

impl UniformLocation {
    pub fn offset(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

/// Element format of one vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float32x3,
    /// 1..=4 unsigned 32-bit integers, read as integers (not normalized).
    Uint32 { components: u8 },
}

impl AttributeFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::Float32x3 => 12,
            Self::Uint32 { components } => 4 * components as u32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: AttributeFormat,
    pub offset: u32,
}

pub struct VertexArrayDesc<'a> {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub stride: u32,
    pub attributes: &'a [VertexAttribute],
}

/// Fixed name bindings applied at link time.
pub struct ProgramBindings<'a> {
    /// `(location, name)` pairs for vertex inputs.
    pub attributes: &'a [(u32, &'a str)],
    /// `(location, name)` pairs for fragment outputs.
    pub fragment_outputs: &'a [(u32, &'a str)],
}

/// Backend-neutral graphics device.
///
/// Calls are synchronous. Failures inside the backend (out of memory, a
/// draw the backend rejects) follow the backend's own error policy and are
/// not reported back through this trait.
pub trait RenderDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferHandle;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc<'_>) -> VertexArrayHandle;
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Always returns a handle; check [`RenderDevice::shader_compiled`].
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderHandle;
    fn shader_compiled(&self, shader: ShaderHandle) -> bool;
    fn shader_info_log(&self, shader: ShaderHandle) -> Option<String>;
    fn delete_shader(&mut self, shader: ShaderHandle);

    /// Always returns a handle; check [`RenderDevice::program_linked`].
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        bindings: &ProgramBindings<'_>,
    ) -> ProgramHandle;
    fn program_linked(&self, program: ProgramHandle) -> bool;
    fn program_info_log(&self, program: ProgramHandle) -> Option<String>;
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn delete_program(&mut self, program: ProgramHandle);

    fn use_program(&mut self, program: Option<ProgramHandle>);
    /// Writes into the uniform block of the program bound by `use_program`.
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>);
    /// Indexed triangle list over the bound vertex array, starting at index 0.
    fn draw_indexed(&mut self, index_count: u32, width: IndexWidth);
}

/// Slot storage behind the handle types. Ids are never reused.
pub(crate) struct HandleTable<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> u32 {
        self.slots.push(Some(value));
        self.live += 1;
        (self.slots.len() - 1) as u32
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<T> {
        let value = self.slots.get_mut(id as usize).and_then(Option::take);
        if value.is_some() {
            self.live -= 1;
        }
        value
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
