//! Errors for checked math operations.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("vector has zero length and cannot be normalized")]
    ZeroLengthVector,
    #[error("view direction is parallel to world up; camera basis is degenerate")]
    DegenerateBasis,
}

pub type MathResult<T> = Result<T, MathError>;
