//! Moves a [`MeshSource`] onto the device as a [`RenderRecord`].

use asset::{IndexWidth, MeshSource, VertexLayout};
use log::{debug, warn};

use crate::device::{
    AttributeFormat, BufferKind, RenderDevice, VertexArrayDesc, VertexAttribute,
};
use crate::error::UploadError;
use crate::record::{MeshPlacement, RenderRecord};

pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const DATA_LOCATION: u32 = 2;

/// Auxiliary data wider than this is truncated.
pub const MAX_DATA_COMPONENTS: u32 = 4;

/// Attribute list for a layout: position, normal, then up to four `u32`s of
/// auxiliary data (omitted when the layout has none).
pub fn vertex_attributes(layout: &VertexLayout) -> Vec<VertexAttribute> {
    let mut attributes = vec![
        VertexAttribute {
            location: POSITION_LOCATION,
            format: AttributeFormat::Float32x3,
            offset: layout.position_offset,
        },
        VertexAttribute {
            location: NORMAL_LOCATION,
            format: AttributeFormat::Float32x3,
            offset: layout.normal_offset,
        },
    ];

    let components = layout.data_components.min(MAX_DATA_COMPONENTS);
    if components < layout.data_components {
        warn!(
            "vertex data has {} components; only the first {MAX_DATA_COMPONENTS} are bound",
            layout.data_components
        );
    }
    if components > 0 {
        attributes.push(VertexAttribute {
            location: DATA_LOCATION,
            format: AttributeFormat::Uint32 {
                components: components as u8,
            },
            offset: layout.data_offset,
        });
    }
    attributes
}

/// `count * element_size` must equal `actual`; an overflowing product never does.
fn check_len(
    buffer: &'static str,
    count: usize,
    element_size: usize,
    actual: usize,
) -> Result<(), UploadError> {
    match count.checked_mul(element_size) {
        Some(expected) if expected == actual => Ok(()),
        expected => Err(UploadError::SizeMismatch {
            buffer,
            expected: expected.unwrap_or(usize::MAX),
            actual,
        }),
    }
}

/// Upload vertex and index data and describe the vertex layout.
///
/// Everything is validated before the first device call, so a rejected mesh
/// leaves the device untouched.
pub fn upload_mesh(
    device: &mut dyn RenderDevice,
    mesh: &dyn MeshSource,
    placement: MeshPlacement,
) -> Result<RenderRecord, UploadError> {
    let vertex_count = mesh.vertex_count();
    let index_count = mesh.index_count();
    if vertex_count == 0 || index_count == 0 {
        return Err(UploadError::EmptyMesh {
            vertices: vertex_count,
            indices: index_count,
        });
    }

    let index_size = mesh.index_size();
    let index_width =
        IndexWidth::from_size(index_size).ok_or(UploadError::UnsupportedIndexSize(index_size))?;
    let draw_count =
        u32::try_from(index_count).map_err(|_| UploadError::TooManyIndices(index_count))?;

    let layout = mesh.vertex_layout();
    let vertex_bytes = mesh.vertex_bytes();
    let index_bytes = mesh.index_bytes();
    check_len("vertex", vertex_count, layout.stride as usize, vertex_bytes.len())?;
    check_len("index", index_count, index_size, index_bytes.len())?;

    let attributes = vertex_attributes(&layout);

    let vertex_buffer = device.create_buffer(BufferKind::Vertex, vertex_bytes);
    let index_buffer = device.create_buffer(BufferKind::Index, index_bytes);
    let vertex_array = device.create_vertex_array(&VertexArrayDesc {
        vertex_buffer,
        index_buffer,
        stride: layout.stride,
        attributes: &attributes,
    });

    debug!(
        "uploaded mesh: {vertex_count} vertices, {index_count} indices ({index_width:?})"
    );

    Ok(RenderRecord::new(
        vertex_buffer,
        index_buffer,
        vertex_array,
        draw_count,
        index_width,
        placement.to_transform(),
    ))
}
