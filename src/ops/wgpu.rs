//! GPU execution for the managed kernel set, using WGPU + WGSL.
//!
//! Handles GPU context initialization (cached once per process via
//! `lazy_static`), shader validation, and compute dispatch for the float
//! binary arithmetic operations. Lanes are copied to the GPU as f32 and
//! returned as f64 to integrate with the rest of the crate.
//!
//! Every entry point returns `Option`: `None` means "use the host path",
//! never an error the caller must handle.

use std::sync::Mutex;

use briny::prelude::*;
use wgpu::util::DeviceExt;

use crate::container::Container;
use crate::ops::BinaryKind;

const ELEMENTWISE: &str = include_str!("shaders/elementwise.wgsl");

/// Basic wrapper for common GPU errors.
#[derive(Debug)]
pub enum GpuError {
    /// Requesting the adapter failed.
    Adapter(wgpu::RequestAdapterError),
    /// Requesting the device failed.
    Device(wgpu::RequestDeviceError),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::Adapter(e) => write!(f, "adapter error: {e}"),
            GpuError::Device(e) => write!(f, "device error: {e}"),
        }
    }
}

impl std::error::Error for GpuError {}

/// Holds the WGPU device and queue used for executing compute pipelines.
///
/// Initialized once globally and reused for all operations.
pub struct GpuContext {
    /// The GPU device.
    pub device: wgpu::Device,
    /// The submission queue for the device.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initializes a new GPU context, selecting the default adapter and
    /// creating a device + queue.
    ///
    /// # Returns
    /// - `Ok(GpuContext)` if the GPU is successfully initialized
    /// - `Err(GpuError)` if adapter or device acquisition fails
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        Ok(Self { device, queue })
    }
}

/// Wrapper for WGSL source code, validated before compilation.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("@compute") {
            return Err(ValidationError);
        }

        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        Ok(())
    }
}

lazy_static::lazy_static! {
    // The context is allowed to be absent: machines without a usable
    // adapter fall back to the host kernels.
    static ref GPU_CONTEXT: Option<GpuContext> = GpuContext::new().ok();
    static ref GPU_LOCK: Mutex<()> = Mutex::new(());
}

fn entry_point(op: BinaryKind) -> Option<&'static str> {
    Some(match op {
        BinaryKind::Add => "add_main",
        BinaryKind::Subtract => "subtract_main",
        BinaryKind::Multiply => "multiply_main",
        BinaryKind::Divide => "divide_main",
        _ => return None,
    })
}

fn as_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_f32(data: &[u8]) -> Option<Vec<f32>> {
    if data.len() % 4 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

/// Attempts the GPU path for one float binary arithmetic operation.
///
/// Returns the result as f64 lanes, or `None` when the operation or the
/// element types are outside the GPU path, or when any GPU step fails —
/// the caller then uses the host kernels.
pub(crate) fn try_float_binary(op: BinaryKind, a: &Container, b: &Container) -> Option<Vec<f64>> {
    entry_point(op)?;
    let ka = a.elem_kind().ok()?;
    let kb = b.elem_kind().ok()?;
    if !ka.is_float() || ka != kb {
        return None;
    }
    if a.shape().ok()? != b.shape().ok()? {
        return None;
    }

    let la: Vec<f32> = a.f64_lanes().ok()?.iter().map(|&v| v as f32).collect();
    let lb: Vec<f32> = b.f64_lanes().ok()?.iter().map(|&v| v as f32).collect();
    let out = run_elementwise(op, &la, &lb)?;
    Some(out.into_iter().map(f64::from).collect())
}

fn run_elementwise(op: BinaryKind, a: &[f32], b: &[f32]) -> Option<Vec<f32>> {
    let ctx = GPU_CONTEXT.as_ref()?;
    // Pipelines are tiny; serializing submissions keeps queue use simple.
    let _guard = GPU_LOCK.lock().ok()?;

    WgslSource(ELEMENTWISE).validate().ok()?;
    let device = &ctx.device;
    let queue = &ctx.queue;

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("elementwise"),
        source: wgpu::ShaderSource::Wgsl(ELEMENTWISE.into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("elementwise_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("elementwise_pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("elementwise_pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: entry_point(op),
        cache: None,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    });

    let a_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("lhs"),
        contents: &as_bytes(a),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let b_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("rhs"),
        contents: &as_bytes(b),
        usage: wgpu::BufferUsages::STORAGE,
    });

    let size = (a.len() * 4) as u64;
    let result_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("result"),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("elementwise_bind_group"),
        layout: &bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: a_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: b_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: result_buffer.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("elementwise_encoder"),
    });

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("elementwise_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((a.len() as u32).div_ceil(64), 1, 1);
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("elementwise_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    encoder.copy_buffer_to_buffer(&result_buffer, 0, &staging, 0, size);
    queue.submit(Some(encoder.finish()));

    staging.slice(..).map_async(wgpu::MapMode::Read, |_| {});
    device.poll(wgpu::PollType::Wait).ok()?;

    let view = staging.slice(..).get_mapped_range();
    let result = bytes_to_f32(&view);
    drop(view);
    staging.unmap();

    result
}
