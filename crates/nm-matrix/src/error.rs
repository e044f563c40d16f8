use thiserror::Error;

use crate::op::BinaryOp;
use crate::shape::Shape;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("{op} dimension mismatch: {left} vs {right}")]
    DimensionMismatch {
        op: BinaryOp,
        left: Shape,
        right: Shape,
    },
    #[error("shape {0} has more elements than fit in memory")]
    ShapeOverflow(Shape),
    #[error("element count mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("dot product of vectors with different lengths: {left} and {right}")]
    VectorLengthMismatch { left: usize, right: usize },
    #[error("no accelerator program registered for {0}")]
    ProgramNotRegistered(BinaryOp),
    #[error("accelerator backend failure: {0}")]
    Backend(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MatrixError>;
