//! Per-mesh GPU state owned by the scene.

use asset::IndexWidth;
use corelib::{Mat4, MeshTransform, Vec3};

use crate::device::{BufferHandle, RenderDevice, VertexArrayHandle};

/// Stable id of a record inside a [`crate::Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u32);

/// Where a freshly uploaded mesh is placed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshPlacement {
    pub translation: Vec3,
    pub scale: f32,
    /// Pivot, subtracted from vertex positions before rotation.
    pub offset: Vec3,
}

impl MeshPlacement {
    pub fn at(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn to_transform(self) -> MeshTransform {
        MeshTransform::identity()
            .with_translation(self.translation)
            .with_scale(self.scale)
            .with_offset(self.offset)
    }
}

impl Default for MeshPlacement {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: 1.0,
            offset: Vec3::ZERO,
        }
    }
}

/// Uploaded mesh: its buffers, binding, draw size and transform.
#[derive(Debug)]
pub struct RenderRecord {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    vertex_array: VertexArrayHandle,
    index_count: u32,
    index_width: IndexWidth,
    pub transform: MeshTransform,
}

impl RenderRecord {
    pub(crate) fn new(
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        vertex_array: VertexArrayHandle,
        index_count: u32,
        index_width: IndexWidth,
        transform: MeshTransform,
    ) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            vertex_array,
            index_count,
            index_width,
            transform,
        }
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn vertex_array(&self) -> VertexArrayHandle {
        self.vertex_array
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_width(&self) -> IndexWidth {
        self.index_width
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.model_matrix()
    }

    /// Free the binding and both buffers.
    pub fn release(self, device: &mut dyn RenderDevice) {
        device.delete_vertex_array(self.vertex_array);
        device.delete_buffer(self.vertex_buffer);
        device.delete_buffer(self.index_buffer);
    }
}
