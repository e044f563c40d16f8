use std::fmt;
use std::str::FromStr;

use crate::error::{MatrixError, Result};
use crate::shape::Shape;

/// The binary matrix operations that have both a sequential and an
/// accelerated implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Element-wise addition.
    Add,
    /// Element-wise subtraction.
    Subtract,
    /// Matrix-matrix product.
    Multiply,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 3] = [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply];

    /// Lower-case name used in logs and configuration strings.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
        }
    }

    /// Validate operand shapes and return the shape of the result.
    ///
    /// Add and subtract require identical shapes. Multiply requires
    /// `left.width == right.height` and yields `left.height x right.width`,
    /// which must not overflow `usize` elements.
    pub fn output_shape(self, left: Shape, right: Shape) -> Result<Shape> {
        let compatible = match self {
            BinaryOp::Add | BinaryOp::Subtract => left == right,
            BinaryOp::Multiply => left.width == right.height,
        };
        if !compatible {
            return Err(MatrixError::DimensionMismatch {
                op: self,
                left,
                right,
            });
        }
        let shape = match self {
            BinaryOp::Add | BinaryOp::Subtract => left,
            BinaryOp::Multiply => Shape::new(left.height, right.width),
        };
        // Empty operands can still describe a product too large to allocate.
        shape
            .checked_numel()
            .map(|_| shape)
            .ok_or(MatrixError::ShapeOverflow(shape))
    }

    fn bit(self) -> u8 {
        match self {
            BinaryOp::Add => 1,
            BinaryOp::Subtract => 1 << 1,
            BinaryOp::Multiply => 1 << 2,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BinaryOp {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(BinaryOp::Add),
            "subtract" | "sub" => Ok(BinaryOp::Subtract),
            "multiply" | "mul" | "matmul" => Ok(BinaryOp::Multiply),
            other => Err(MatrixError::Config(format!("unknown operation '{}'", other))),
        }
    }
}

/// A set of [`BinaryOp`]s, used to describe which operations have an
/// accelerator program registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpSet {
    bits: u8,
}

impl OpSet {
    /// The empty set: every operation runs sequentially.
    pub fn none() -> Self {
        OpSet { bits: 0 }
    }

    /// Every binary operation.
    pub fn all() -> Self {
        BinaryOp::ALL.into_iter().collect()
    }

    pub fn with(mut self, op: BinaryOp) -> Self {
        self.insert(op);
        self
    }

    pub fn insert(&mut self, op: BinaryOp) {
        self.bits |= op.bit();
    }

    pub fn remove(&mut self, op: BinaryOp) {
        self.bits &= !op.bit();
    }

    pub fn contains(&self, op: BinaryOp) -> bool {
        self.bits & op.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterate members in declaration order (add, subtract, multiply).
    pub fn iter(&self) -> impl Iterator<Item = BinaryOp> + '_ {
        BinaryOp::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl FromIterator<BinaryOp> for OpSet {
    fn from_iter<I: IntoIterator<Item = BinaryOp>>(iter: I) -> Self {
        let mut set = OpSet::none();
        for op in iter {
            set.insert(op);
        }
        set
    }
}

impl fmt::Display for OpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, op) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(op.name())?;
        }
        Ok(())
    }
}

impl FromStr for OpSet {
    type Err = MatrixError;

    /// Parse a comma-separated list such as `"add,multiply"`. `"all"` selects
    /// every operation; `"none"` or an empty string selects nothing.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => return Ok(OpSet::none()),
            "all" => return Ok(OpSet::all()),
            _ => {}
        }
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse::<BinaryOp>)
            .collect()
    }
}
