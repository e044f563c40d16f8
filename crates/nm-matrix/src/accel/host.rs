use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rayon::prelude::*;

use super::device::{shape_descriptor, ComputeDevice, KernelArgs};
use super::GROUP_SIZE;
use crate::cpu::matmul::dot_strided;
use crate::error::{MatrixError, Result};
use crate::op::BinaryOp;
use crate::shape::{flat_to_coordinates, Shape};

/// Storage owned by a [`HostDevice`].
#[derive(Debug)]
pub enum HostBuffer {
    /// Matrix elements. Kernels write output through the lock.
    Elements(RwLock<Vec<f32>>),
    /// A `[height, width]` descriptor.
    Shape([u32; 2]),
}

impl HostBuffer {
    fn elements(&self) -> Result<&RwLock<Vec<f32>>> {
        match self {
            HostBuffer::Elements(data) => Ok(data),
            HostBuffer::Shape(_) => Err(MatrixError::Backend(
                "shape descriptor bound where an element buffer was expected".to_string(),
            )),
        }
    }

    fn shape(&self) -> Result<Shape> {
        match self {
            HostBuffer::Shape([height, width]) => {
                Ok(Shape::new(*height as usize, *width as usize))
            }
            HostBuffer::Elements(_) => Err(MatrixError::Backend(
                "element buffer bound where a shape descriptor was expected".to_string(),
            )),
        }
    }
}

/// Compiled form of one operation on the host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostKernel {
    op: BinaryOp,
}

/// Everything a kernel invocation reads.
struct KernelInputs<'a> {
    lhs: &'a [f32],
    rhs: &'a [f32],
    lhs_shape: Shape,
    rhs_shape: Shape,
    out_shape: Shape,
}

impl HostKernel {
    pub fn op(&self) -> BinaryOp {
        self.op
    }

    /// Check the bound buffers against their descriptors before any element
    /// is computed, so a bad binding fails instead of panicking mid-dispatch.
    fn validate(&self, inputs: &KernelInputs<'_>) -> Result<()> {
        let lhs_ok = inputs.lhs_shape.checked_numel() == Some(inputs.lhs.len());
        let rhs_ok = inputs.rhs_shape.checked_numel() == Some(inputs.rhs.len());
        let shapes_ok = self
            .op
            .output_shape(inputs.lhs_shape, inputs.rhs_shape)
            .map(|shape| shape == inputs.out_shape)
            .unwrap_or(false);
        if lhs_ok && rhs_ok && shapes_ok {
            Ok(())
        } else {
            Err(MatrixError::Backend(format!(
                "{} kernel bound to inconsistent buffers: \
                 lhs {} ({} values), rhs {} ({} values), out {}",
                self.op,
                inputs.lhs_shape,
                inputs.lhs.len(),
                inputs.rhs_shape,
                inputs.rhs.len(),
                inputs.out_shape
            )))
        }
    }

    /// The value of output element `index`.
    fn element(&self, index: usize, inputs: &KernelInputs<'_>) -> f32 {
        match self.op {
            BinaryOp::Add => inputs.lhs[index] + inputs.rhs[index],
            BinaryOp::Subtract => inputs.lhs[index] - inputs.rhs[index],
            BinaryOp::Multiply => {
                let (row, col) = flat_to_coordinates(index, inputs.out_shape.width);
                dot_strided(
                    inputs.lhs,
                    inputs.rhs,
                    row,
                    col,
                    inputs.lhs_shape.width,
                    inputs.rhs_shape.width,
                )
            }
        }
    }
}

/// A data-parallel device backed by the rayon thread pool.
///
/// Each work-group is one task that fills up to [`GROUP_SIZE`] consecutive
/// output elements. The device counts live buffers so callers can confirm
/// that every dispatch gave its storage back.
#[derive(Debug, Default)]
pub struct HostDevice {
    live_buffers: AtomicUsize,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers allocated and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::SeqCst)
    }

    fn track(&self, buffer: HostBuffer) -> HostBuffer {
        self.live_buffers.fetch_add(1, Ordering::SeqCst);
        buffer
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;
    type Program = HostKernel;

    fn name(&self) -> &str {
        "host"
    }

    fn load_program(&self, op: BinaryOp) -> Result<HostKernel> {
        Ok(HostKernel { op })
    }

    fn upload_elements(&self, _label: &str, data: &[f32]) -> Result<HostBuffer> {
        Ok(self.track(HostBuffer::Elements(RwLock::new(data.to_vec()))))
    }

    fn upload_shape(&self, _label: &str, shape: Shape) -> Result<HostBuffer> {
        Ok(self.track(HostBuffer::Shape(shape_descriptor(shape)?)))
    }

    fn allocate_output(&self, _label: &str, len: usize) -> Result<HostBuffer> {
        Ok(self.track(HostBuffer::Elements(RwLock::new(vec![0.0; len]))))
    }

    fn dispatch(
        &self,
        program: &HostKernel,
        args: &KernelArgs<'_, HostBuffer>,
        groups: usize,
    ) -> Result<()> {
        let out_shape = args.out_shape.shape()?;
        let len = out_shape
            .checked_numel()
            .ok_or(MatrixError::ShapeOverflow(out_shape))?;
        if groups.saturating_mul(GROUP_SIZE) < len {
            return Err(MatrixError::Backend(format!(
                "{} work-groups cannot cover {} output elements",
                groups, len
            )));
        }

        let lhs = args.lhs.elements()?.read();
        let rhs = args.rhs.elements()?.read();
        let inputs = KernelInputs {
            lhs: lhs.as_slice(),
            rhs: rhs.as_slice(),
            lhs_shape: args.lhs_shape.shape()?,
            rhs_shape: args.rhs_shape.shape()?,
            out_shape,
        };
        program.validate(&inputs)?;

        let mut out = args.out.elements()?.try_write().ok_or_else(|| {
            MatrixError::Backend("output buffer is also bound as an input".to_string())
        })?;
        if out.len() != len {
            return Err(MatrixError::Backend(format!(
                "output buffer holds {} elements but {} needs {}",
                out.len(),
                out_shape,
                len
            )));
        }

        out.par_chunks_mut(GROUP_SIZE)
            .enumerate()
            .for_each(|(group, chunk)| {
                let base = group * GROUP_SIZE;
                for (offset, slot) in chunk.iter_mut().enumerate() {
                    *slot = program.element(base + offset, &inputs);
                }
            });
        Ok(())
    }

    fn read_elements(&self, buffer: &HostBuffer, out: &mut [f32]) -> Result<()> {
        let data = buffer.elements()?.read();
        if data.len() != out.len() {
            return Err(MatrixError::Backend(format!(
                "read of {} elements from a buffer of {}",
                out.len(),
                data.len()
            )));
        }
        out.copy_from_slice(&data);
        Ok(())
    }

    fn release(&self, _buffer: &HostBuffer) {
        self.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}
