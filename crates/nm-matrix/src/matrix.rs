use std::fmt;
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use crate::error::{MatrixError, Result};
use crate::shape::{self, Shape};

/// A dense matrix of f32 values.
///
/// Elements live in one contiguous row-major buffer whose length is always
/// `height * width`. The shape never changes after construction; operations
/// that produce a different shape return a new matrix.
///
/// Reads take `&self` and writes take `&mut self`, so a matrix is never
/// mutated while another reference to it is being read.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    shape: Shape,
    elements: Vec<f32>,
}

impl Matrix {
    /// Create a zero-filled matrix with `height` rows and `width` columns.
    pub fn new(height: usize, width: usize) -> Self {
        Self::zeros(Shape::new(height, width))
    }

    /// Create a zero-filled matrix with the given shape.
    ///
    /// # Panics
    /// Panics if `height * width` overflows `usize`.
    pub fn zeros(shape: Shape) -> Self {
        Matrix {
            shape,
            elements: vec![0.0; shape.numel()],
        }
    }

    /// Create a matrix from row-major data.
    ///
    /// # Errors
    /// Returns [`MatrixError::ShapeOverflow`] if `height * width` overflows,
    /// and [`MatrixError::LengthMismatch`] if `data.len() != height * width`.
    pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let shape = Shape::new(height, width);
        let expected = shape
            .checked_numel()
            .ok_or(MatrixError::ShapeOverflow(shape))?;
        if data.len() != expected {
            return Err(MatrixError::LengthMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Matrix {
            shape,
            elements: data,
        })
    }

    /// A matrix whose elements count up from 1 in flat order.
    ///
    /// `incrementing(2, 3)` is `[[1, 2, 3], [4, 5, 6]]`.
    pub fn incrementing(height: usize, width: usize) -> Self {
        let shape = Shape::new(height, width);
        Matrix {
            shape,
            elements: (1..=shape.numel()).map(|v| v as f32).collect(),
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.shape.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.shape.width
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The row-major element buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.elements
    }

    /// The row-major element buffer, mutably. The length cannot change.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.elements
    }

    /// Consume the matrix and return its element buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.elements
    }

    /// Flat offset of `(row, col)`.
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        self.shape.flat_index(row, col)
    }

    /// Decompose a flat index into `(row, col)` using this matrix's width.
    ///
    /// See [`shape::flat_to_coordinates`] for the free-function form.
    pub fn flat_to_coordinates(&self, index: usize) -> (usize, usize) {
        shape::flat_to_coordinates(index, self.shape.width)
    }

    /// Value at `(row, col)`.
    ///
    /// # Panics
    /// Panics if `row >= height` or `col >= width`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.check_bounds(row, col);
        self.elements[self.flat_index(row, col)]
    }

    /// Set the value at `(row, col)`.
    ///
    /// # Panics
    /// Panics if `row >= height` or `col >= width`.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.check_bounds(row, col);
        let index = self.flat_index(row, col);
        self.elements[index] = value;
    }

    /// Add `delta` to the value at `(row, col)`.
    ///
    /// # Panics
    /// Panics if `row >= height` or `col >= width`.
    pub fn add_value(&mut self, row: usize, col: usize, delta: f32) {
        self.check_bounds(row, col);
        let index = self.flat_index(row, col);
        self.elements[index] += delta;
    }

    /// Value at a flat row-major offset.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn get_flat(&self, index: usize) -> f32 {
        self.elements[index]
    }

    /// Set the value at a flat row-major offset.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn set_flat(&mut self, index: usize, value: f32) {
        self.elements[index] = value;
    }

    /// Borrow row `index` without copying.
    ///
    /// # Panics
    /// Panics if `index >= height`.
    pub fn row_slice(&self, index: usize) -> &[f32] {
        assert!(
            index < self.shape.height,
            "row {} out of range for matrix {}",
            index,
            self.shape
        );
        let start = index * self.shape.width;
        &self.elements[start..start + self.shape.width]
    }

    /// Copy of row `index` (`width` values).
    ///
    /// # Panics
    /// Panics if `index >= height`.
    pub fn row(&self, index: usize) -> Vec<f32> {
        self.row_slice(index).to_vec()
    }

    /// Copy of column `index` (`height` values).
    ///
    /// # Panics
    /// Panics if `index >= width`.
    pub fn column(&self, index: usize) -> Vec<f32> {
        assert!(
            index < self.shape.width,
            "column {} out of range for matrix {}",
            index,
            self.shape
        );
        (0..self.shape.height)
            .map(|row| self.elements[self.flat_index(row, index)])
            .collect()
    }

    /// A new `width x height` matrix with `result[c, r] = self[r, c]`.
    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.shape.transposed());
        for row in 0..self.shape.height {
            for col in 0..self.shape.width {
                let dst = out.flat_index(col, row);
                out.elements[dst] = self.elements[self.flat_index(row, col)];
            }
        }
        out
    }

    /// Debug text: one line per row, values separated by spaces.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for row in 0..self.shape.height {
            for (i, value) in self.row_slice(row).iter().enumerate() {
                if i > 0 {
                    text.push(' ');
                }
                let _ = write!(text, "{}", value);
            }
            text.push('\n');
        }
        text
    }

    fn check_bounds(&self, row: usize, col: usize) {
        assert!(
            row < self.shape.height && col < self.shape.width,
            "index ({}, {}) out of range for matrix {}",
            row,
            col,
            self.shape
        );
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;

    fn index(&self, (row, col): (usize, usize)) -> &f32 {
        self.check_bounds(row, col);
        &self.elements[self.flat_index(row, col)]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f32 {
        self.check_bounds(row, col);
        let index = self.flat_index(row, col);
        &mut self.elements[index]
    }
}

impl Index<usize> for Matrix {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.elements[index]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.elements[index]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero_filled() {
        let m = Matrix::new(2, 3);
        assert_eq!(m.height(), 2);
        assert_eq!(m.width(), 3);
        assert_eq!(m.as_slice(), &[0.0; 6]);
    }

    #[test]
    fn test_empty_matrix() {
        let m = Matrix::new(0, 0);
        assert!(m.is_empty());
        assert_eq!(m.render(), "");
        assert_eq!(Matrix::new(3, 0).len(), 0);
    }

    #[test]
    fn test_incrementing() {
        let m = Matrix::incrementing(2, 3);
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.get(1, 2), 6.0);
        assert_eq!(m.get(0, 1), 2.0);
    }

    #[test]
    fn test_from_vec() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let err = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::LengthMismatch {
                expected: 4,
                got: 3
            }
        ));
    }

    #[test]
    fn test_from_vec_rejects_overflowing_shape() {
        let err = Matrix::from_vec(usize::MAX / 2 + 1, 2, vec![]).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeOverflow(shape) if shape.width == 2));
        assert!(Matrix::from_vec(usize::MAX, usize::MAX, vec![1.0]).is_err());
    }

    #[test]
    fn test_from_vec_huge_empty_dimension() {
        let m = Matrix::from_vec(usize::MAX, 0, vec![]).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.height(), usize::MAX);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn test_new_overflowing_shape_panics() {
        let _ = Matrix::new(usize::MAX / 2 + 1, 2);
    }

    #[test]
    fn test_set_and_add_value() {
        let mut m = Matrix::new(2, 2);
        m.set(0, 1, 5.0);
        m.add_value(0, 1, 2.5);
        m.add_value(1, 1, -1.0);
        assert_eq!(m.get(0, 1), 7.5);
        assert_eq!(m.get(1, 1), -1.0);
    }

    #[test]
    fn test_flat_access() {
        let mut m = Matrix::incrementing(2, 3);
        assert_eq!(m.get_flat(4), 5.0);
        m.set_flat(4, 40.0);
        assert_eq!(m.get(1, 1), 40.0);
        assert_eq!(m[4], 40.0);
        m[(0, 0)] = -1.0;
        assert_eq!(m[0], -1.0);
    }

    #[test]
    fn test_flat_to_coordinates() {
        let m = Matrix::new(3, 4);
        assert_eq!(m.flat_to_coordinates(0), (0, 0));
        assert_eq!(m.flat_to_coordinates(5), (1, 1));
        assert_eq!(m.flat_to_coordinates(11), (2, 3));
        assert_eq!(m.flat_index(2, 3), 11);
    }

    #[test]
    fn test_row_and_column_are_copies() {
        let mut m = Matrix::incrementing(2, 3);
        let row = m.row(1);
        let col = m.column(2);
        m.set(1, 2, 0.0);
        assert_eq!(row, vec![4.0, 5.0, 6.0]);
        assert_eq!(col, vec![3.0, 6.0]);
    }

    #[test]
    fn test_transpose() {
        let t = Matrix::incrementing(2, 3).transpose();
        assert_eq!(t.shape(), Shape::new(3, 2));
        assert_eq!(t.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_is_involutive() {
        let m = Matrix::incrementing(3, 5);
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn test_render() {
        let m = Matrix::incrementing(2, 2);
        assert_eq!(m.render(), "1 2\n3 4\n");
        assert_eq!(m.to_string(), m.render());
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds_panics() {
        let m = Matrix::new(2, 2);
        let _ = m.get(2, 0);
    }

    #[test]
    #[should_panic]
    fn test_get_column_past_width_panics() {
        // (0, 2) would alias (1, 0) in the flat buffer; the column check must
        // catch it instead.
        let m = Matrix::new(2, 2);
        let _ = m.get(0, 2);
    }

    #[test]
    #[should_panic]
    fn test_flat_out_of_bounds_panics() {
        let m = Matrix::new(2, 2);
        let _ = m.get_flat(4);
    }

    #[test]
    #[should_panic]
    fn test_row_out_of_bounds_panics() {
        let _ = Matrix::new(2, 2).row(2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_bounds_panics() {
        Matrix::new(2, 2).set(0, 2, 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_add_value_out_of_bounds_panics() {
        Matrix::new(2, 2).add_value(2, 0, 1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_column_out_of_bounds_panics() {
        let _ = Matrix::new(2, 3).column(3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_mut_out_of_bounds_panics() {
        let mut m = Matrix::new(2, 2);
        m[(1, 2)] = 1.0;
    }

    #[test]
    #[should_panic]
    fn test_set_flat_out_of_bounds_panics() {
        Matrix::new(2, 2).set_flat(4, 1.0);
    }
}
