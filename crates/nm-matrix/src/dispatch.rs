use std::sync::Arc;

use crate::backend::ComputeBackend;
use crate::cpu::CpuBackend;
use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;
use crate::op::BinaryOp;

/// Entry point for matrix arithmetic.
///
/// Add, subtract and multiply go to the accelerator when it has a program
/// for that operation, and to the sequential [`CpuBackend`] otherwise.
/// Scaling and transposition are always sequential. The accelerator is
/// chosen when the dispatcher is built and never changes afterwards.
///
/// ```
/// use nm_matrix::{Dispatcher, Matrix};
///
/// let dispatcher = Dispatcher::sequential();
/// let sum = dispatcher
///     .add(&Matrix::incrementing(2, 2), &Matrix::incrementing(2, 2))
///     .unwrap();
/// assert_eq!(sum.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    cpu: CpuBackend,
    accelerator: Option<Arc<dyn ComputeBackend>>,
}

impl Dispatcher {
    /// A dispatcher with no accelerator: every operation runs sequentially.
    pub fn sequential() -> Self {
        Dispatcher {
            cpu: CpuBackend::new(),
            accelerator: None,
        }
    }

    /// A dispatcher that offloads the operations `accelerator` supports.
    pub fn accelerated(accelerator: Arc<dyn ComputeBackend>) -> Self {
        Dispatcher {
            cpu: CpuBackend::new(),
            accelerator: Some(accelerator),
        }
    }

    /// Whether `op` runs on the accelerator.
    pub fn is_accelerated(&self, op: BinaryOp) -> bool {
        self.accelerator
            .as_ref()
            .is_some_and(|backend| backend.supports(op))
    }

    /// Name of the backend that will execute `op`.
    pub fn backend_name(&self, op: BinaryOp) -> &str {
        self.backend_for(op).name()
    }

    fn backend_for(&self, op: BinaryOp) -> &dyn ComputeBackend {
        match &self.accelerator {
            Some(backend) if backend.supports(op) => backend.as_ref(),
            _ => &self.cpu,
        }
    }

    /// Run `op` on whichever backend is selected for it.
    ///
    /// # Errors
    /// [`MatrixError::DimensionMismatch`] when the shapes are incompatible,
    /// [`MatrixError::Backend`] when the accelerator fails.
    pub fn apply(&self, op: BinaryOp, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        // Checked up front so a mismatch never reaches either backend.
        if let Err(err) = op.output_shape(a.shape(), b.shape()) {
            tracing::warn!(
                op = %op,
                left = %a.shape(),
                right = %b.shape(),
                %err,
                "operand shapes rejected"
            );
            return Err(err);
        }

        let backend = self.backend_for(op);
        tracing::debug!(op = %op, backend = backend.name(), "dispatching");
        backend.apply(op, a, b).inspect_err(|err| {
            if let MatrixError::Backend(reason) = err {
                tracing::error!(
                    op = %op,
                    backend = backend.name(),
                    %reason,
                    "accelerated operation failed"
                );
            }
        })
    }

    /// Element-wise `a + b`. Shapes must be identical.
    pub fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.apply(BinaryOp::Add, a, b)
    }

    /// Element-wise `a - b`. Shapes must be identical.
    pub fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.apply(BinaryOp::Subtract, a, b)
    }

    /// Matrix product. `a.width()` must equal `b.height()`.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.apply(BinaryOp::Multiply, a, b)
    }

    /// Every element of `a` multiplied by `factor`.
    pub fn scale(&self, a: &Matrix, factor: f32) -> Matrix {
        self.cpu.scale(a, factor)
    }

    pub fn transpose(&self, a: &Matrix) -> Matrix {
        a.transpose()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::sequential()
    }
}
