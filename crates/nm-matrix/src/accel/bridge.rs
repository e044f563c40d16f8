use std::collections::HashMap;

use super::device::{ComputeDevice, KernelArgs};
use super::work_group_count;
use crate::backend::ComputeBackend;
use crate::config::AcceleratorConfig;
use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;
use crate::op::{BinaryOp, OpSet};
use crate::shape::Shape;

/// A device buffer that is released when it goes out of scope.
struct Transient<'d, D: ComputeDevice> {
    device: &'d D,
    buffer: D::Buffer,
}

impl<'d, D: ComputeDevice> Transient<'d, D> {
    fn new(device: &'d D, buffer: D::Buffer) -> Self {
        Transient { device, buffer }
    }
}

impl<D: ComputeDevice> Drop for Transient<'_, D> {
    fn drop(&mut self) {
        self.device.release(&self.buffer);
    }
}

/// The device-side state of a single dispatch.
///
/// Every buffer is a [`Transient`], so all of them go back to the device when
/// the job is dropped, whether the dispatch succeeded or not. Buffers staged
/// before a failing allocation are released the same way.
struct AcceleratorJob<'d, D: ComputeDevice> {
    lhs: Transient<'d, D>,
    rhs: Transient<'d, D>,
    out: Transient<'d, D>,
    lhs_shape: Transient<'d, D>,
    rhs_shape: Transient<'d, D>,
    out_shape: Transient<'d, D>,
    shape: Shape,
}

impl<'d, D: ComputeDevice> AcceleratorJob<'d, D> {
    fn stage(device: &'d D, a: &Matrix, b: &Matrix, shape: Shape) -> Result<Self> {
        let lhs = Transient::new(device, device.upload_elements("lhs", a.as_slice())?);
        let rhs = Transient::new(device, device.upload_elements("rhs", b.as_slice())?);
        let out = Transient::new(device, device.allocate_output("out", shape.numel())?);
        let lhs_shape = Transient::new(device, device.upload_shape("lhs_shape", a.shape())?);
        let rhs_shape = Transient::new(device, device.upload_shape("rhs_shape", b.shape())?);
        let out_shape = Transient::new(device, device.upload_shape("out_shape", shape)?);
        Ok(AcceleratorJob {
            lhs,
            rhs,
            out,
            lhs_shape,
            rhs_shape,
            out_shape,
            shape,
        })
    }

    fn args(&self) -> KernelArgs<'_, D::Buffer> {
        KernelArgs {
            lhs: &self.lhs.buffer,
            rhs: &self.rhs.buffer,
            out: &self.out.buffer,
            lhs_shape: &self.lhs_shape.buffer,
            rhs_shape: &self.rhs_shape.buffer,
            out_shape: &self.out_shape.buffer,
        }
    }

    /// Run `program` and read the full output back.
    fn execute(&self, device: &D, program: &D::Program) -> Result<Matrix> {
        let groups = work_group_count(self.shape.numel());
        device.dispatch(program, &self.args(), groups)?;

        let mut values = vec![0.0f32; self.shape.numel()];
        device.read_elements(&self.out.buffer, &mut values)?;
        Matrix::from_vec(self.shape.height, self.shape.width, values)
    }
}

/// Runs binary matrix operations on a [`ComputeDevice`].
///
/// Holds one compiled program per registered operation. The set of
/// registered operations is fixed once the bridge is handed to a
/// [`Dispatcher`](crate::Dispatcher).
#[derive(Debug)]
pub struct AcceleratorBridge<D: ComputeDevice> {
    device: D,
    programs: HashMap<BinaryOp, D::Program>,
}

impl<D: ComputeDevice> AcceleratorBridge<D> {
    /// A bridge with no programs registered.
    pub fn new(device: D) -> Self {
        AcceleratorBridge {
            device,
            programs: HashMap::new(),
        }
    }

    /// A bridge with a program for every operation in `config.ops`.
    pub fn from_config(device: D, config: &AcceleratorConfig) -> Result<Self> {
        let mut bridge = Self::new(device);
        for op in config.ops.iter() {
            bridge.register(op)?;
        }
        Ok(bridge)
    }

    /// Compile and register the program for `op`, replacing any existing one.
    pub fn register(&mut self, op: BinaryOp) -> Result<()> {
        let program = self.device.load_program(op)?;
        tracing::debug!(op = %op, device = self.device.name(), "registered accelerator program");
        self.programs.insert(op, program);
        Ok(())
    }

    pub fn with(mut self, op: BinaryOp) -> Result<Self> {
        self.register(op)?;
        Ok(self)
    }

    /// Operations with a registered program.
    pub fn registered(&self) -> OpSet {
        self.programs.keys().copied().collect()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Run `op` on the device.
    ///
    /// Shapes are validated here as well as in the dispatcher, so the bridge
    /// rejects mismatches on its own. The result is either fully read back or
    /// not returned at all.
    pub fn run(&self, op: BinaryOp, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let shape = op.output_shape(a.shape(), b.shape())?;
        let program = self
            .programs
            .get(&op)
            .ok_or(MatrixError::ProgramNotRegistered(op))?;

        tracing::debug!(
            op = %op,
            device = self.device.name(),
            elements = shape.numel(),
            groups = work_group_count(shape.numel()),
            "accelerator dispatch"
        );

        let job = AcceleratorJob::stage(&self.device, a, b, shape)?;
        let result = job.execute(&self.device, program);
        drop(job);
        tracing::trace!(op = %op, "released transient buffers");
        result
    }
}

impl<D: ComputeDevice> ComputeBackend for AcceleratorBridge<D> {
    fn name(&self) -> &str {
        self.device.name()
    }

    fn supports(&self, op: BinaryOp) -> bool {
        self.programs.contains_key(&op)
    }

    fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.run(BinaryOp::Add, a, b)
    }

    fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.run(BinaryOp::Subtract, a, b)
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.run(BinaryOp::Multiply, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::host::{HostBuffer, HostDevice, HostKernel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Which step of a dispatch the test device should fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        /// The n-th allocation (0-based).
        Allocation(usize),
        Dispatch,
        Read,
    }

    /// A host device that fails one chosen step.
    #[derive(Debug)]
    struct FaultyDevice {
        inner: HostDevice,
        fail_at: FailAt,
        allocations: AtomicUsize,
    }

    impl FaultyDevice {
        fn new(fail_at: FailAt) -> Self {
            FaultyDevice {
                inner: HostDevice::new(),
                fail_at,
                allocations: AtomicUsize::new(0),
            }
        }

        fn allocation(&self) -> Result<()> {
            let n = self.allocations.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == FailAt::Allocation(n) {
                return Err(MatrixError::Backend(format!("allocation {} failed", n)));
            }
            Ok(())
        }
    }

    impl ComputeDevice for FaultyDevice {
        type Buffer = HostBuffer;
        type Program = HostKernel;

        fn name(&self) -> &str {
            "faulty"
        }

        fn load_program(&self, op: BinaryOp) -> Result<HostKernel> {
            self.inner.load_program(op)
        }

        fn upload_elements(&self, label: &str, data: &[f32]) -> Result<HostBuffer> {
            self.allocation()?;
            self.inner.upload_elements(label, data)
        }

        fn upload_shape(&self, label: &str, shape: Shape) -> Result<HostBuffer> {
            self.allocation()?;
            self.inner.upload_shape(label, shape)
        }

        fn allocate_output(&self, label: &str, len: usize) -> Result<HostBuffer> {
            self.allocation()?;
            self.inner.allocate_output(label, len)
        }

        fn dispatch(
            &self,
            program: &HostKernel,
            args: &KernelArgs<'_, HostBuffer>,
            groups: usize,
        ) -> Result<()> {
            if self.fail_at == FailAt::Dispatch {
                return Err(MatrixError::Backend("device lost".to_string()));
            }
            self.inner.dispatch(program, args, groups)
        }

        fn read_elements(&self, buffer: &HostBuffer, out: &mut [f32]) -> Result<()> {
            if self.fail_at == FailAt::Read {
                return Err(MatrixError::Backend("map failed".to_string()));
            }
            self.inner.read_elements(buffer, out)
        }

        fn release(&self, buffer: &HostBuffer) {
            self.inner.release(buffer)
        }
    }

    fn all_ops(device: HostDevice) -> AcceleratorBridge<HostDevice> {
        AcceleratorBridge::from_config(device, &AcceleratorConfig::with_ops(OpSet::all())).unwrap()
    }

    #[test]
    fn test_from_config_registers_configured_ops() {
        let bridge =
            AcceleratorBridge::from_config(HostDevice::new(), &AcceleratorConfig::default())
                .unwrap();
        assert!(bridge.supports(BinaryOp::Add));
        assert!(bridge.supports(BinaryOp::Multiply));
        assert!(!bridge.supports(BinaryOp::Subtract));
        assert_eq!(bridge.registered().to_string(), "add,multiply");
    }

    #[test]
    fn test_run_add() {
        let bridge = all_ops(HostDevice::new());
        let a = Matrix::incrementing(2, 2);
        let r = bridge.add(&a, &a).unwrap();
        assert_eq!(r.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(bridge.device().live_buffers(), 0);
    }

    #[test]
    fn test_run_multiply() {
        let bridge = all_ops(HostDevice::new());
        let r = bridge
            .multiply(&Matrix::incrementing(2, 3), &Matrix::incrementing(3, 2))
            .unwrap();
        assert_eq!(r.shape(), Shape::new(2, 2));
        assert_eq!(r.as_slice(), &[22.0, 28.0, 49.0, 64.0]);
    }

    #[test]
    fn test_run_subtract_requires_registration() {
        let bridge = AcceleratorBridge::new(HostDevice::new())
            .with(BinaryOp::Add)
            .unwrap();
        let a = Matrix::incrementing(2, 2);
        let err = bridge.subtract(&a, &a).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::ProgramNotRegistered(BinaryOp::Subtract)
        ));
        assert_eq!(bridge.device().live_buffers(), 0);
    }

    #[test]
    fn test_bridge_rejects_mismatch_before_allocating() {
        let bridge = all_ops(HostDevice::new());
        let err = bridge
            .add(&Matrix::new(2, 3), &Matrix::new(3, 2))
            .unwrap_err();
        assert!(matches!(err, MatrixError::DimensionMismatch { .. }));
        assert_eq!(bridge.device().live_buffers(), 0);
    }

    #[test]
    fn test_empty_output_still_dispatches_one_group() {
        let bridge = all_ops(HostDevice::new());
        let r = bridge.add(&Matrix::new(0, 0), &Matrix::new(0, 0)).unwrap();
        assert!(r.is_empty());
        let r = bridge.multiply(&Matrix::new(2, 0), &Matrix::new(0, 3)).unwrap();
        assert_eq!(r.as_slice(), &[0.0; 6]);
    }

    #[test]
    fn test_large_output_spans_groups() {
        let bridge = all_ops(HostDevice::new());
        let a = Matrix::incrementing(40, 60);
        let b = Matrix::incrementing(60, 50);
        let expected = crate::cpu::CpuBackend::new().multiply(&a, &b).unwrap();
        assert_eq!(bridge.multiply(&a, &b).unwrap(), expected);
    }

    #[test]
    fn test_buffers_released_when_dispatch_fails() {
        let device = FaultyDevice::new(FailAt::Dispatch);
        let bridge = AcceleratorBridge::new(device).with(BinaryOp::Add).unwrap();
        let a = Matrix::incrementing(2, 2);
        let err = bridge.add(&a, &a).unwrap_err();
        assert!(matches!(err, MatrixError::Backend(_)));
        assert_eq!(bridge.device().inner.live_buffers(), 0);
    }

    #[test]
    fn test_buffers_released_when_read_fails() {
        let device = FaultyDevice::new(FailAt::Read);
        let bridge = AcceleratorBridge::new(device)
            .with(BinaryOp::Multiply)
            .unwrap();
        let a = Matrix::incrementing(3, 3);
        assert!(bridge.multiply(&a, &a).is_err());
        assert_eq!(bridge.device().inner.live_buffers(), 0);
    }

    #[test]
    fn test_buffers_released_when_allocation_fails_midway() {
        for n in 0..6 {
            let device = FaultyDevice::new(FailAt::Allocation(n));
            let bridge = AcceleratorBridge::new(device).with(BinaryOp::Add).unwrap();
            let a = Matrix::incrementing(2, 2);
            assert!(bridge.add(&a, &a).is_err(), "allocation {} should fail", n);
            assert_eq!(bridge.device().inner.live_buffers(), 0);
        }
    }
}
