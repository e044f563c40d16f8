pub mod elementwise;
pub mod matmul;

use crate::backend::ComputeBackend;
use crate::error::Result;
use crate::matrix::Matrix;
use crate::op::BinaryOp;

pub use matmul::dot;

/// Sequential CPU backend.
///
/// Single-threaded loops over the row-major buffers. Accelerated results are
/// compared against this backend, and the dispatcher falls back to it for any
/// operation without a registered accelerator program.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }

    /// Multiply every element by `factor`. Scaling has no accelerated path.
    pub fn scale(&self, a: &Matrix, factor: f32) -> Matrix {
        elementwise::scale(a, factor)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn supports(&self, _op: BinaryOp) -> bool {
        true
    }

    fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        elementwise::zip_with(BinaryOp::Add, a, b, |x, y| x + y)
    }

    fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        elementwise::zip_with(BinaryOp::Subtract, a, b, |x, y| x - y)
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        matmul::multiply(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatrixError;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    #[test]
    fn test_supports_everything() {
        let b = backend();
        assert!(BinaryOp::ALL.iter().all(|op| b.supports(*op)));
        assert_eq!(b.name(), "cpu");
    }

    #[test]
    fn test_add() {
        let b = backend();
        let x = Matrix::incrementing(2, 2);
        let r = b.add(&x, &x).unwrap();
        assert_eq!(r.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_subtract() {
        let b = backend();
        let x = Matrix::from_vec(1, 3, vec![5.0, 5.0, 5.0]).unwrap();
        let y = Matrix::incrementing(1, 3);
        let r = b.subtract(&x, &y).unwrap();
        assert_eq!(r.as_slice(), &[4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_apply_routes_by_op() {
        let b = backend();
        let x = Matrix::incrementing(2, 2);
        assert_eq!(
            b.apply(BinaryOp::Multiply, &x, &x).unwrap(),
            b.multiply(&x, &x).unwrap()
        );
        assert_eq!(
            b.apply(BinaryOp::Subtract, &x, &x).unwrap(),
            Matrix::new(2, 2)
        );
    }

    #[test]
    fn test_scale() {
        let r = backend().scale(&Matrix::incrementing(2, 2), 2.0);
        assert_eq!(r.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let err = backend()
            .add(&Matrix::incrementing(2, 2), &Matrix::incrementing(3, 3))
            .unwrap_err();
        assert!(matches!(err, MatrixError::DimensionMismatch { .. }));
    }
}
