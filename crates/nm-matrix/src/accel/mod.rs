//! The accelerated execution path.
//!
//! [`AcceleratorBridge`] marshals matrices onto a [`ComputeDevice`], splits the
//! output into work-groups of [`GROUP_SIZE`] elements, runs the registered
//! kernel and reads the result back. [`HostDevice`] is the always-available
//! device; the `wgpu` feature adds a GPU device.

pub mod bridge;
pub mod device;
pub mod host;

pub use bridge::AcceleratorBridge;
pub use device::{ComputeDevice, KernelArgs};
pub use host::{HostBuffer, HostDevice, HostKernel};

/// Output elements covered by one work-group.
pub const GROUP_SIZE: usize = 1024;

/// Number of work-groups needed to cover `elements` outputs.
///
/// Always at least one, so outputs smaller than a group (including empty
/// ones) still get a dispatch.
pub fn work_group_count(elements: usize) -> usize {
    elements.div_ceil(GROUP_SIZE).max(1)
}
