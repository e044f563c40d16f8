use std::fmt::Debug;

use crate::error::{MatrixError, Result};
use crate::op::BinaryOp;
use crate::shape::Shape;

/// The buffers bound to one kernel invocation.
///
/// Binding order matches the kernels: the two operands, the output, then one
/// `(height, width)` descriptor for each of them.
#[derive(Debug)]
pub struct KernelArgs<'a, B> {
    pub lhs: &'a B,
    pub rhs: &'a B,
    pub out: &'a B,
    pub lhs_shape: &'a B,
    pub rhs_shape: &'a B,
    pub out_shape: &'a B,
}

/// A parallel execution target that runs precompiled arithmetic kernels.
///
/// Buffers returned by a device must be handed back through
/// [`ComputeDevice::release`] exactly once; the bridge does this from a drop
/// guard so it also happens when a later step fails.
pub trait ComputeDevice: Send + Sync + Debug {
    /// Device-visible storage.
    type Buffer: Send + Sync;
    /// A compiled kernel for one operation kind (the accelerator program
    /// handle).
    type Program: Send + Sync + Debug;

    /// Returns the name of this device (e.g. "host", "wgpu").
    fn name(&self) -> &str;

    /// Build the kernel for `op`.
    fn load_program(&self, op: BinaryOp) -> Result<Self::Program>;

    /// Allocate a buffer and copy `data` into it.
    fn upload_elements(&self, label: &str, data: &[f32]) -> Result<Self::Buffer>;

    /// Allocate a buffer holding a `(height, width)` descriptor.
    fn upload_shape(&self, label: &str, shape: Shape) -> Result<Self::Buffer>;

    /// Allocate a zeroed buffer of `len` elements for kernel output.
    fn allocate_output(&self, label: &str, len: usize) -> Result<Self::Buffer>;

    /// Run `program` over `groups` work-groups and block until it finishes.
    fn dispatch(
        &self,
        program: &Self::Program,
        args: &KernelArgs<'_, Self::Buffer>,
        groups: usize,
    ) -> Result<()>;

    /// Copy the contents of `buffer` into `out`, which must match its length.
    fn read_elements(&self, buffer: &Self::Buffer, out: &mut [f32]) -> Result<()>;

    /// Give the storage behind `buffer` back to the device.
    fn release(&self, buffer: &Self::Buffer);
}

/// Encode a shape as the `[height, width]` pair kernels read.
pub fn shape_descriptor(shape: Shape) -> Result<[u32; 2]> {
    let encode = |dim: usize| {
        u32::try_from(dim).map_err(|_| {
            MatrixError::Backend(format!(
                "dimension {} of {} does not fit a kernel shape descriptor",
                dim, shape
            ))
        })
    };
    Ok([encode(shape.height)?, encode(shape.width)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_descriptor() {
        assert_eq!(shape_descriptor(Shape::new(3, 7)).unwrap(), [3, 7]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_shape_descriptor_overflow() {
        let huge = u32::MAX as usize + 1;
        assert!(shape_descriptor(Shape::new(1, huge)).is_err());
    }
}
