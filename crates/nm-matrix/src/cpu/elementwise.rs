use crate::error::Result;
use crate::matrix::Matrix;
use crate::op::BinaryOp;

/// Apply `f` to every pair of elements at the same flat index.
///
/// `op` names the operation for the shape check (add or subtract).
pub(crate) fn zip_with(
    op: BinaryOp,
    a: &Matrix,
    b: &Matrix,
    f: impl Fn(f32, f32) -> f32,
) -> Result<Matrix> {
    let shape = op.output_shape(a.shape(), b.shape())?;
    let mut out = Matrix::zeros(shape);
    for (i, slot) in out.as_mut_slice().iter_mut().enumerate() {
        *slot = f(a.get_flat(i), b.get_flat(i));
    }
    Ok(out)
}

/// Multiply every element by `factor`.
pub(crate) fn scale(a: &Matrix, factor: f32) -> Matrix {
    let mut out = Matrix::zeros(a.shape());
    for (slot, value) in out.as_mut_slice().iter_mut().zip(a.as_slice()) {
        *slot = value * factor;
    }
    out
}
