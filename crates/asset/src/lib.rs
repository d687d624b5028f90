//! Mesh producer interface consumed by the renderer's uploader, plus a few
//! built-in meshes.

pub mod mesh;
pub mod primitives;

pub use mesh::{
    ColorVertex, IndexElement, IndexWidth, MaterialVertex, MeshData, MeshSource, SurfaceVertex,
    VertexLayout,
};
pub use primitives::{ground_quad, unit_cube};
