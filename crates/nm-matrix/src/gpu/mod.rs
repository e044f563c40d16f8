//! GPU compute device built on wgpu.
//!
//! Runs the add, subtract and multiply kernels on any adapter wgpu can open
//! (Vulkan, Metal, DX12, GL). All calls block: each dispatch is submitted
//! and waited on before returning.

pub mod kernels;

use std::borrow::Cow;
use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

use wgpu::util::DeviceExt;

use crate::accel::device::{shape_descriptor, ComputeDevice, KernelArgs};
use crate::config::AcceleratorConfig;
use crate::error::{MatrixError, Result};
use crate::op::BinaryOp;
use crate::shape::Shape;

const ELEMENT_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// A storage buffer on the GPU and the number of f32 elements it carries.
#[derive(Debug)]
pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

/// A compiled compute pipeline for one operation.
#[derive(Debug)]
pub struct WgpuProgram {
    op: BinaryOp,
    pipeline: wgpu::ComputePipeline,
}

impl WgpuProgram {
    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    max_groups: u32,
    timeout: Option<Duration>,
}

impl WgpuDevice {
    /// Open the highest-performance adapter available.
    ///
    /// # Errors
    /// Returns [`MatrixError::Backend`] when no adapter or device can be opened.
    pub fn new(config: &AcceleratorConfig) -> Result<Self> {
        pollster::block_on(Self::request(config))
    }

    async fn request(config: &AcceleratorConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| MatrixError::Backend(format!("no compatible GPU adapter: {}", e)))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "wgpu adapter selected"
        );

        // Six storage bindings per kernel; the downlevel default is four.
        let required_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 6,
            ..wgpu::Limits::downlevel_defaults()
        };
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nm-matrix"),
                required_features: wgpu::Features::empty(),
                required_limits,
                ..Default::default()
            })
            .await
            .map_err(|e| MatrixError::Backend(format!("failed to open GPU device: {}", e)))?;

        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..6)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding != 2,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nm-matrix kernel bindings"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nm-matrix kernel layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let max_groups = device.limits().max_compute_workgroups_per_dimension;

        Ok(WgpuDevice {
            device,
            queue,
            adapter_info,
            bind_group_layout,
            pipeline_layout,
            max_groups,
            timeout: config.dispatch_timeout,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Block until the submission finishes, or the configured timeout passes.
    fn wait(&self, submission: wgpu::SubmissionIndex) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: self.timeout,
            })
            .map_err(|e| MatrixError::Backend(format!("waiting for the GPU failed: {}", e)))?;
        Ok(())
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("max_groups", &self.max_groups)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ComputeDevice for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;

    fn name(&self) -> &str {
        "wgpu"
    }

    fn load_program(&self, op: BinaryOp) -> Result<WgpuProgram> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(op.name()),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(kernels::source(op))),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(op.name()),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });
        Ok(WgpuProgram { op, pipeline })
    }

    fn upload_elements(&self, label: &str, data: &[f32]) -> Result<WgpuBuffer> {
        // Zero-sized bindings are invalid; empty matrices get one padding element.
        let padding = [0.0f32];
        let contents = if data.is_empty() { &padding[..] } else { data };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });
        Ok(WgpuBuffer {
            buffer,
            len: data.len(),
        })
    }

    fn upload_shape(&self, label: &str, shape: Shape) -> Result<WgpuBuffer> {
        let descriptor = shape_descriptor(shape)?;
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&descriptor),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });
        Ok(WgpuBuffer { buffer, len: 2 })
    }

    fn allocate_output(&self, label: &str, len: usize) -> Result<WgpuBuffer> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: len.max(1) as u64 * ELEMENT_BYTES,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(WgpuBuffer { buffer, len })
    }

    fn dispatch(
        &self,
        program: &WgpuProgram,
        args: &KernelArgs<'_, WgpuBuffer>,
        groups: usize,
    ) -> Result<()> {
        let groups = u32::try_from(groups)
            .ok()
            .filter(|g| *g <= self.max_groups)
            .ok_or_else(|| {
                MatrixError::Backend(format!(
                    "{} work-groups exceeds the device limit of {}",
                    groups, self.max_groups
                ))
            })?;

        let bindings = [
            args.lhs,
            args.rhs,
            args.out,
            args.lhs_shape,
            args.rhs_shape,
            args.out_shape,
        ];
        let entries: Vec<wgpu::BindGroupEntry<'_>> = bindings
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.op.name()),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(program.op.name()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.op.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        let submission = self.queue.submit([encoder.finish()]);
        self.wait(submission)
    }

    fn read_elements(&self, buffer: &WgpuBuffer, out: &mut [f32]) -> Result<()> {
        if buffer.len != out.len() {
            return Err(MatrixError::Backend(format!(
                "read of {} elements from a buffer of {}",
                out.len(),
                buffer.len
            )));
        }
        if out.is_empty() {
            return Ok(());
        }

        let size = out.len() as u64 * ELEMENT_BYTES;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
        let submission = self.queue.submit([encoder.finish()]);

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait(submission)?;
        rx.recv()
            .map_err(|_| MatrixError::Backend("buffer mapping was abandoned".to_string()))?
            .map_err(|e| MatrixError::Backend(format!("buffer mapping failed: {}", e)))?;

        {
            let view = slice.get_mapped_range();
            out.copy_from_slice(bytemuck::cast_slice(&view[..]));
        }
        staging.unmap();
        staging.destroy();
        Ok(())
    }

    fn release(&self, buffer: &WgpuBuffer) {
        buffer.buffer.destroy();
    }
}
