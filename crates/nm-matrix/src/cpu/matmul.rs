use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;
use crate::op::BinaryOp;

/// Sum of pairwise products of two equal-length vectors.
///
/// # Errors
/// Returns [`MatrixError::VectorLengthMismatch`] when the lengths differ.
pub fn dot(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        return Err(MatrixError::VectorLengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let mut sum = 0.0f32;
    for (x, y) in left.iter().zip(right) {
        sum += x * y;
    }
    Ok(sum)
}

/// Dot product of row `row` of `a` with column `col` of `b`, reading both
/// straight out of their row-major buffers.
///
/// Accumulates in the same order as [`dot`] over materialized vectors, so the
/// two give bit-identical results. `inner` is `a`'s width and `b`'s height;
/// `b_width` is `b`'s row stride.
pub(crate) fn dot_strided(
    a: &[f32],
    b: &[f32],
    row: usize,
    col: usize,
    inner: usize,
    b_width: usize,
) -> f32 {
    let mut sum = 0.0f32;
    for k in 0..inner {
        sum += a[row * inner + k] * b[k * b_width + col];
    }
    sum
}

/// Sequential matrix product.
///
/// Visits every result element in flat order, decomposes its index with the
/// result's width, and takes the dot product of the matching row of `a` and
/// column of `b`.
pub(crate) fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let shape = BinaryOp::Multiply.output_shape(a.shape(), b.shape())?;
    let mut out = Matrix::zeros(shape);

    // Columns of b are strided; copy each one once instead of per element.
    let columns: Vec<Vec<f32>> = (0..b.width()).map(|col| b.column(col)).collect();

    for index in 0..out.len() {
        let (row, col) = out.flat_to_coordinates(index);
        let value = dot(a.row_slice(row), &columns[col])?;
        out.set_flat(index, value);
    }
    Ok(out)
}
