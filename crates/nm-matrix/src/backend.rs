use std::fmt::Debug;

use crate::error::Result;
use crate::matrix::Matrix;
use crate::op::BinaryOp;

/// Trait for the execution paths behind the binary matrix operations.
///
/// Every implementation validates operand shapes itself before computing,
/// and returns a freshly allocated result. Operands are never mutated.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g. "cpu", "host", "wgpu").
    fn name(&self) -> &str;

    /// Whether this backend can execute `op`.
    fn supports(&self, op: BinaryOp) -> bool;

    /// Element-wise addition: result[i] = a[i] + b[i].
    fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix>;

    /// Element-wise subtraction: result[i] = a[i] - b[i].
    fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix>;

    /// Matrix product of `a` ([m, k]) and `b` ([k, n]), giving [m, n].
    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix>;

    /// Run `op` on `a` and `b`.
    fn apply(&self, op: BinaryOp, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        match op {
            BinaryOp::Add => self.add(a, b),
            BinaryOp::Subtract => self.subtract(a, b),
            BinaryOp::Multiply => self.multiply(a, b),
        }
    }
}
