//! CPU-side mesh representation handed over by surface extractors.
//!
//! The uploader never sees concrete vertex types. It works through
//! [`MeshSource`], which exposes counts, raw bytes and a [`VertexLayout`]
//! describing where position, normal and auxiliary data sit in each vertex.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

/// Byte layout of one vertex record: `position: [f32; 3]`, `normal: [f32; 3]`,
/// then `data_components` unsigned 32-bit values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u32,
    pub position_offset: u32,
    pub normal_offset: u32,
    pub data_offset: u32,
    pub data_components: u32,
}

/// Width of one element in an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    /// Maps an element size in bytes; only 2 and 4 are supported.
    pub fn from_size(bytes: usize) -> Option<Self> {
        match bytes {
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Anything that can hand an indexed triangle list to the uploader.
pub trait MeshSource {
    fn vertex_count(&self) -> usize;
    /// Exactly `vertex_count() * vertex_layout().stride` bytes.
    fn vertex_bytes(&self) -> &[u8];
    fn vertex_layout(&self) -> VertexLayout;
    fn index_count(&self) -> usize;
    /// Exactly `index_count() * index_size()` bytes.
    fn index_bytes(&self) -> &[u8];
    /// Bytes per index element.
    fn index_size(&self) -> usize;
}

/// A vertex type with a fixed position/normal/data layout.
pub trait SurfaceVertex: Pod {
    const LAYOUT: VertexLayout;
}

/// Index element type (`u16` or `u32`).
pub trait IndexElement: Pod {}

impl IndexElement for u16 {}
impl IndexElement for u32 {}

/// Vertex carrying a single material id, as emitted by cubic extractors.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub material: u32,
}

impl MaterialVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], material: u32) -> Self {
        Self {
            position,
            normal,
            material,
        }
    }
}

impl SurfaceVertex for MaterialVertex {
    const LAYOUT: VertexLayout = VertexLayout {
        stride: size_of::<Self>() as u32,
        position_offset: offset_of!(Self, position) as u32,
        normal_offset: offset_of!(Self, normal) as u32,
        data_offset: offset_of!(Self, material) as u32,
        data_components: 1,
    };
}

/// Vertex carrying four data words (e.g. blended material weights).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub data: [u32; 4],
}

impl ColorVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], data: [u32; 4]) -> Self {
        Self {
            position,
            normal,
            data,
        }
    }
}

impl SurfaceVertex for ColorVertex {
    const LAYOUT: VertexLayout = VertexLayout {
        stride: size_of::<Self>() as u32,
        position_offset: offset_of!(Self, position) as u32,
        normal_offset: offset_of!(Self, normal) as u32,
        data_offset: offset_of!(Self, data) as u32,
        data_components: 4,
    };
}

/// Indexed triangle mesh with tightly-packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData<V, I> {
    pub vertices: Vec<V>,
    pub indices: Vec<I>,
}

impl<V: SurfaceVertex, I: IndexElement> MeshData<V, I> {
    pub fn new(vertices: Vec<V>, indices: Vec<I>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }
}

impl<V: SurfaceVertex, I: IndexElement> MeshSource for MeshData<V, I> {
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn vertex_layout(&self) -> VertexLayout {
        V::LAYOUT
    }

    fn index_count(&self) -> usize {
        self.indices.len()
    }

    fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    fn index_size(&self) -> usize {
        size_of::<I>()
    }
}
