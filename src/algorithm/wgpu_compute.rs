//! [`ComputeContext`] backed by a wgpu compute shader.
//!
//! Two dispatches of the same separable kernel (horizontal then vertical) over storage buffers
//! of packed RGBA8 texels, followed by a blocking readback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::algorithm::compute::{ComputeContext, MAX_COMPUTE_RADIUS};
use crate::algorithm::software::gaussian_kernel_q16;
use crate::foundation::core::Size;
use crate::foundation::error::{BlurError, BlurResult};

const WORKGROUP_SIZE: u32 = 256;
const MAX_TAPS: u64 = (2 * MAX_COMPUTE_RADIUS as u64) + 1;

const BLUR_WGSL: &str = r#"
struct Params {
    width: u32,
    height: u32,
    radius: u32,
    horizontal: u32,
}

@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;
@group(0) @binding(2) var<uniform> params: Params;
@group(0) @binding(3) var<storage, read> weights: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let total = params.width * params.height;
    let i = id.x;
    if (i >= total) {
        return;
    }
    let x = i32(i % params.width);
    let y = i32(i / params.width);
    let r = i32(params.radius);
    var acc = vec4<u32>(0u);
    for (var k = -r; k <= r; k = k + 1) {
        var sx = x;
        var sy = y;
        if (params.horizontal == 1u) {
            sx = clamp(x + k, 0, i32(params.width) - 1);
        } else {
            sy = clamp(y + k, 0, i32(params.height) - 1);
        }
        let p = src[u32(sy) * params.width + u32(sx)];
        let c = vec4<u32>(p & 0xffu, (p >> 8u) & 0xffu, (p >> 16u) & 0xffu, p >> 24u);
        acc = acc + c * weights[u32(k + r)];
    }
    let o = min((acc + vec4<u32>(32768u)) >> vec4<u32>(16u), vec4<u32>(255u));
    dst[i] = o.x | (o.y << 8u) | (o.z << 16u) | (o.w << 24u);
}
"#;

struct Buffers {
    size: Size,
    byte_len: u64,
    src: wgpu::Buffer,
    dst: wgpu::Buffer,
    readback: wgpu::Buffer,
    params_h: wgpu::Buffer,
    params_v: wgpu::Buffer,
    weights: wgpu::Buffer,
    group_h: wgpu::BindGroup,
    group_v: wgpu::BindGroup,
}

/// wgpu device, pipeline and per-size buffers.
pub struct WgpuComputeContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    buffers: Option<Buffers>,
    alive: Arc<AtomicBool>,
}

impl WgpuComputeContext {
    /// Open the default adapter and compile the blur pipeline.
    ///
    /// Fails with [`BlurError::Unavailable`] when no adapter or device can be obtained.
    pub fn new() -> BlurResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                BlurError::unavailable("no gpu adapter available")
            }
            other => BlurError::unavailable(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("blurview_compute_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BlurError::unavailable(format!("wgpu request_device failed: {e:?}")))?;

        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        device.set_device_lost_callback(move |reason, msg| {
            tracing::warn!(?reason, %msg, "compute device lost");
            flag.store(false, Ordering::Release);
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blurview_blur_shader"),
            source: wgpu::ShaderSource::Wgsl(BLUR_WGSL.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("blurview_blur_pipeline"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            buffers: None,
            alive,
        })
    }

    fn storage(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn bind_group(
        &self,
        label: &str,
        src: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        params: &wgpu::Buffer,
        weights: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let layout = self.pipeline.get_bind_group_layout(0);
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: weights.as_entire_binding(),
                },
            ],
        })
    }
}

fn params_bytes(size: Size, radius: u32, horizontal: bool) -> Vec<u8> {
    [size.width, size.height, radius, u32::from(horizontal)]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

impl ComputeContext for WgpuComputeContext {
    fn is_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn allocate(&mut self, size: Size) -> BlurResult<()> {
        let byte_len = (size.area() as u64).saturating_mul(4);
        if byte_len == 0 {
            return Err(BlurError::validation("compute buffers need a non-empty size"));
        }
        let groups = (size.area() as u64).div_ceil(u64::from(WORKGROUP_SIZE));
        if groups > u64::from(self.device.limits().max_compute_workgroups_per_dimension) {
            return Err(BlurError::backend(format!(
                "{}x{} exceeds the compute dispatch limit",
                size.width, size.height
            )));
        }

        use wgpu::BufferUsages as U;
        let src = self.storage("blurview_src", byte_len, U::STORAGE | U::COPY_DST);
        let tmp = self.storage("blurview_tmp", byte_len, U::STORAGE);
        let dst = self.storage("blurview_dst", byte_len, U::STORAGE | U::COPY_SRC);
        let readback = self.storage("blurview_readback", byte_len, U::COPY_DST | U::MAP_READ);
        let params_h = self.storage("blurview_params_h", 16, U::UNIFORM | U::COPY_DST);
        let params_v = self.storage("blurview_params_v", 16, U::UNIFORM | U::COPY_DST);
        let weights = self.storage("blurview_weights", MAX_TAPS * 4, U::STORAGE | U::COPY_DST);
        let group_h = self.bind_group("blurview_blur_h", &src, &tmp, &params_h, &weights);
        let group_v = self.bind_group("blurview_blur_v", &tmp, &dst, &params_v, &weights);

        self.buffers = Some(Buffers {
            size,
            byte_len,
            src,
            dst,
            readback,
            params_h,
            params_v,
            weights,
            group_h,
            group_v,
        });
        Ok(())
    }

    fn blur(&mut self, input: &[u8], output: &mut [u8], size: Size, radius: u32) -> BlurResult<()> {
        if !self.is_valid() {
            return Err(BlurError::backend("compute device lost"));
        }
        let Some(b) = self.buffers.as_ref() else {
            return Err(BlurError::backend("compute buffers not allocated"));
        };
        if b.size != size || input.len() as u64 != b.byte_len || output.len() as u64 != b.byte_len {
            return Err(BlurError::backend("compute buffer size mismatch"));
        }

        let radius = radius.min(MAX_COMPUTE_RADIUS);
        let kernel = gaussian_kernel_q16(radius, radius as f32 / 2.0)?;
        let kernel_bytes: Vec<u8> = kernel.iter().flat_map(|w| w.to_le_bytes()).collect();

        self.queue.write_buffer(&b.src, 0, input);
        self.queue.write_buffer(&b.weights, 0, &kernel_bytes);
        self.queue.write_buffer(&b.params_h, 0, &params_bytes(size, radius, true));
        self.queue.write_buffer(&b.params_v, 0, &params_bytes(size, radius, false));

        let groups = (size.area() as u32).div_ceil(WORKGROUP_SIZE);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("blurview_blur_encoder"),
        });
        for group in [&b.group_h, &b.group_v] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("blurview_blur_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&b.dst, 0, &b.readback, 0, b.byte_len);
        self.queue.submit(Some(encoder.finish()));

        let slice = b.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BlurError::backend(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| BlurError::backend("readback channel closed"))?
            .map_err(|e| BlurError::backend(format!("readback map failed: {e:?}")))?;

        {
            let mapped = slice.get_mapped_range();
            output.copy_from_slice(&mapped);
        }
        b.readback.unmap();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(b) = self.buffers.take() {
            for buf in [&b.src, &b.dst, &b.readback, &b.params_h, &b.params_v, &b.weights] {
                buf.destroy();
            }
        }
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for WgpuComputeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuComputeContext")
            .field("allocated", &self.buffers.as_ref().map(|b| b.size))
            .field("valid", &self.is_valid())
            .finish()
    }
}
