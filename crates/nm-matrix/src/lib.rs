//! `nm-matrix` - dense matrices for neural-network layers.
//!
//! This crate provides:
//! - A row-major `f32` [`Matrix`] with element, row and column access
//! - Element-wise addition, subtraction and matrix multiplication
//! - A sequential [`CpuBackend`] and an accelerated path ([`AcceleratorBridge`])
//!   that splits work into groups of [`GROUP_SIZE`] output elements
//! - A [`Dispatcher`] that picks the path per operation at construction time
//! - An optional wgpu device behind the `wgpu` feature

pub mod accel;
pub mod backend;
pub mod config;
pub mod cpu;
pub mod dispatch;
pub mod error;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod matrix;
pub mod op;
pub mod shape;

// Re-export primary types at the crate root for convenience.
pub use accel::{work_group_count, AcceleratorBridge, ComputeDevice, HostDevice, GROUP_SIZE};
pub use backend::ComputeBackend;
pub use config::AcceleratorConfig;
pub use cpu::{dot, CpuBackend};
pub use dispatch::Dispatcher;
pub use error::{MatrixError, Result};
#[cfg(feature = "wgpu")]
pub use gpu::WgpuDevice;
pub use matrix::Matrix;
pub use op::{BinaryOp, OpSet};
pub use shape::{flat_to_coordinates, Shape};
