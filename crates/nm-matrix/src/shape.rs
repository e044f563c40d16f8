use std::fmt;

/// The (height, width) of a matrix.
///
/// Height is the number of rows, width the number of columns. Elements are
/// addressed in row-major order, so `(row, col)` lives at `row * width + col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
}

impl Shape {
    /// Create a new shape from a row count and a column count.
    pub fn new(height: usize, width: usize) -> Self {
        Shape { height, width }
    }

    /// Total number of elements (height * width).
    ///
    /// # Panics
    /// Panics if the product overflows `usize`. Use [`Shape::checked_numel`]
    /// for shapes that have not been validated.
    pub fn numel(&self) -> usize {
        self.checked_numel()
            .unwrap_or_else(|| panic!("element count of {} overflows usize", self))
    }

    /// Total number of elements, or `None` if `height * width` overflows.
    pub fn checked_numel(&self) -> Option<usize> {
        self.height.checked_mul(self.width)
    }

    /// Returns true if the shape holds no elements.
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Flat row-major offset of `(row, col)`.
    ///
    /// No bounds check is performed; callers index the element buffer with the
    /// result, which is where out-of-range access is caught.
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Inverse of [`Shape::flat_index`] for this shape's width.
    ///
    /// # Panics
    /// Panics if the width is zero.
    pub fn coordinates(&self, index: usize) -> (usize, usize) {
        flat_to_coordinates(index, self.width)
    }

    /// The shape with height and width swapped.
    pub fn transposed(&self) -> Shape {
        Shape::new(self.width, self.height)
    }
}

/// Decompose a flat row-major index into `(row, col)` for a matrix of the given
/// width: `row = index / width`, `col = index % width`.
///
/// Accelerator kernels use the same formula, so both execution paths map
/// element indices to coordinates identically.
///
/// # Panics
/// Panics if `width` is zero.
pub fn flat_to_coordinates(index: usize, width: usize) -> (usize, usize) {
    (index / width, index % width)
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}x{}]", self.height, self.width)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((height, width): (usize, usize)) -> Self {
        Shape::new(height, width)
    }
}
