use thiserror::Error;

/// Reasons a mesh is refused before any device allocation happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("mesh is empty ({vertices} vertices, {indices} indices)")]
    EmptyMesh { vertices: usize, indices: usize },

    #[error("unsupported index size: {0} bytes (expected 2 or 4)")]
    UnsupportedIndexSize(usize),

    #[error("{buffer} buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("index count {0} does not fit in a single draw")]
    TooManyIndices(usize),
}
