// Instanced clipmap terrain: wgpu side of `geoclipmap::TerrainBackend`.

use geoclipmap::{
    BackendError, ClipmapGeometry, FenceStatus, GpuFences, GridMesh, InstanceKind, RasterBuffers,
    TerrainBackend, TerrainUniforms,
};
use glam::Mat4;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainParams {
    /// World to clip space.
    pub view_proj: [[f32; 4]; 4],  // 64 B
    pub terrain: TerrainUniforms,  // +64 -> 128
}

// Compile‑time safety check: buffer size must match WGSL‑reflected size.
const _: [(); 128] = [(); core::mem::size_of::<TerrainParams>()];

const INSTANCE_STRIDE: u64 = core::mem::size_of::<Mat4>() as u64;

const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    1 => Float32x4,
    2 => Float32x4,
    3 => Float32x4,
    4 => Float32x4,
];

/// Completion marker for one submitted frame.
///
/// `armed` is set once the frame's command buffer has been submitted and a
/// completion callback registered; `signaled` once the GPU has finished it.
#[derive(Clone, Debug, Default)]
pub struct GpuFence {
    armed: Arc<AtomicBool>,
    signaled: Arc<AtomicBool>,
}

impl GpuFence {
    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

struct MeshGpu {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl MeshGpu {
    fn upload(device: &wgpu::Device, kind: InstanceKind, mesh: &GridMesh) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kind.label()),
            contents: bytemuck::cast_slice(&mesh.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kind.label()),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
        }
    }
}

fn slot(kind: InstanceKind) -> usize {
    match kind {
        InstanceKind::RingBlock => 0,
        InstanceKind::RingFixUp => 1,
        InstanceKind::InteriorTrim => 2,
        InstanceKind::InteriorBlock => 3,
    }
}

fn template(geometry: &ClipmapGeometry, kind: InstanceKind) -> &GridMesh {
    match kind {
        InstanceKind::RingBlock => &geometry.block,
        InstanceKind::RingFixUp => &geometry.ring_fix_up,
        InstanceKind::InteriorTrim => &geometry.interior_trim,
        InstanceKind::InteriorBlock => &geometry.interior_block,
    }
}

pub struct TerrainGpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,

    // Created once the terrain exists.
    bind_group: Option<wgpu::BindGroup>,
    _rasters: Vec<wgpu::Buffer>,
    meshes: Vec<MeshGpu>,
    instances: Vec<wgpu::Buffer>,

    view_proj: Mat4,
    draws: Vec<(InstanceKind, u32)>,
    unsubmitted: Option<GpuFence>,
}

impl TerrainGpu {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label:              Some("Terrain Uniform Buffer"),
            size:               core::mem::size_of::<TerrainParams>() as u64,
            usage:              wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let storage = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Terrain BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            core::mem::size_of::<TerrainParams>() as u64,
                        ),
                    },
                    count: None,
                },
                storage(1),
                storage(2),
                storage(3),
                storage(4),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label:  Some("Terrain WGSL"),
            source: wgpu::ShaderSource::Wgsl(TERRAIN_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label:                Some("Terrain Pipeline Layout"),
            bind_group_layouts:   &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let vbuf_layouts = [
            // Unit-grid template vertices
            wgpu::VertexBufferLayout {
                array_stride: core::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[wgpu::VertexAttribute {
                    shader_location: 0,
                    offset: 0,
                    format: wgpu::VertexFormat::Float32x2,
                }],
            },
            // Per-instance model matrix, one column per attribute
            wgpu::VertexBufferLayout {
                array_stride: INSTANCE_STRIDE,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &INSTANCE_ATTRS,
            },
        ];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Terrain Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Rotated fix-ups flip winding.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_fmt,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            bind_group: None,
            _rasters: Vec::new(),
            meshes: Vec::new(),
            instances: Vec::new(),
            view_proj: Mat4::IDENTITY,
            draws: Vec::new(),
            unsubmitted: None,
        }
    }

    /// Uploads the four grid templates and allocates instance storage for
    /// `levels` clipmap levels.
    pub fn upload_geometry(&mut self, geometry: &ClipmapGeometry, levels: u32) {
        self.meshes = InstanceKind::ALL
            .iter()
            .map(|&kind| MeshGpu::upload(&self.device, kind, template(geometry, kind)))
            .collect();
        self.instances = InstanceKind::ALL
            .iter()
            .map(|&kind| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(kind.label()),
                    size: kind.capacity(levels).max(1) as u64 * INSTANCE_STRIDE,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let templates = InstanceKind::ALL.map(|kind| template(geometry, kind));
        log::debug!(
            "Uploaded clipmap templates: {} vertices, {} triangles",
            templates.iter().map(|m| m.vertex_count()).sum::<usize>(),
            templates.iter().map(|m| m.triangle_count()).sum::<usize>()
        );
    }

    /// Starts recording a frame seen through `view_proj`.
    pub fn begin_frame(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj;
        self.draws.clear();
    }

    /// Replays the draws recorded by the terrain this frame.
    pub fn encode<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        let Some(bind_group) = self.bind_group.as_ref() else {
            return;
        };
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        for &(kind, count) in &self.draws {
            let (Some(mesh), Some(instances)) =
                (self.meshes.get(slot(kind)), self.instances.get(slot(kind)))
            else {
                continue;
            };
            rpass.set_vertex_buffer(0, mesh.vertices.slice(..));
            rpass.set_vertex_buffer(1, instances.slice(..));
            rpass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..mesh.index_count, 0, 0..count);
        }
    }

    /// Hooks the fence inserted this frame to the submission just made.
    /// Call right after `Queue::submit`.
    pub fn arm_submitted(&mut self) {
        let Some(fence) = self.unsubmitted.take() else {
            return;
        };
        let signaled = fence.signaled.clone();
        self.queue.on_submitted_work_done(move || {
            signaled.store(true, Ordering::Release);
        });
        fence.armed.store(true, Ordering::Release);
    }
}

impl GpuFences for TerrainGpu {
    type Fence = GpuFence;

    fn insert_fence(&mut self) -> GpuFence {
        let fence = GpuFence::default();
        self.unsubmitted = Some(fence.clone());
        fence
    }

    fn client_wait(&mut self, fence: &GpuFence, timeout: Duration) -> FenceStatus {
        // Never submitted: nothing on the GPU references this frame.
        if !fence.armed.load(Ordering::Acquire) {
            return FenceStatus::WaitFailed;
        }
        let start = Instant::now();
        loop {
            if fence.is_signaled() {
                return FenceStatus::Signaled;
            }
            if start.elapsed() >= timeout {
                return FenceStatus::TimeoutExpired;
            }
            self.device.poll(wgpu::Maintain::Poll);
            std::thread::yield_now();
        }
    }

    fn release_fence(&mut self, fence: GpuFence) {
        drop(fence);
    }
}

impl TerrainBackend for TerrainGpu {
    fn create_raster_buffers(&mut self, rasters: RasterBuffers<'_>) -> Result<(), BackendError> {
        check_buffer_limits(&rasters, &self.device.limits())?;

        // Allocation failures surface here instead of in the uncaptured
        // error handler, which panics.
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let storage = |label: &str, data: &[f32]| {
            // Bindings must not be empty.
            let data = if data.is_empty() { &[0.0f32][..] } else { data };
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE,
            })
        };
        let buffers = vec![
            storage("Terrain Elevations", rasters.elevations),
            storage("Terrain Reds", rasters.reds),
            storage("Terrain Greens", rasters.greens),
            storage("Terrain Blues", rasters.blues),
        ];
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(BackendError::Rejected {
                what: "raster buffers",
                reason: err.to_string(),
            });
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniform_buffer.as_entire_binding(),
        }];
        entries.extend(buffers.iter().enumerate().map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: buffer.as_entire_binding(),
        }));
        self.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Terrain Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }));
        self._rasters = buffers;

        log::info!(
            "Uploaded raster buffers: {} elevation, {} colour samples ({:.1} MiB)",
            rasters.elevations.len(),
            rasters.reds.len(),
            (rasters.elevations.len() + 3 * rasters.reds.len()) as f64 * 4.0 / (1024.0 * 1024.0)
        );
        Ok(())
    }

    fn flush_instances(&mut self, kind: InstanceKind, range: Range<usize>, transforms: &[Mat4]) {
        let Some(buffer) = self.instances.get(slot(kind)) else {
            log::warn!("Dropping {} update: geometry not uploaded", kind.label());
            return;
        };
        self.queue.write_buffer(
            buffer,
            range.start as u64 * INSTANCE_STRIDE,
            bytemuck::cast_slice(transforms),
        );
    }

    fn bind_material(&mut self, uniforms: &TerrainUniforms) {
        let params = TerrainParams {
            view_proj: self.view_proj.to_cols_array_2d(),
            terrain: *uniforms,
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));
    }

    fn draw_instanced(&mut self, kind: InstanceKind, instance_count: u32) {
        if instance_count > 0 {
            self.draws.push((kind, instance_count));
        }
    }
}

/// Every raster array must fit one buffer and one storage binding.
pub fn check_buffer_limits(
    rasters: &RasterBuffers<'_>,
    limits: &wgpu::Limits,
) -> Result<(), BackendError> {
    let limit = limits
        .max_buffer_size
        .min(limits.max_storage_buffer_binding_size as u64);
    match rasters.byte_sizes().into_iter().find(|&(_, size)| size > limit) {
        Some((what, size)) => Err(BackendError::BufferTooLarge { what, size, limit }),
        None => Ok(()),
    }
}

pub const TERRAIN_WGSL: &str = r#"
struct TerrainParams {
    view_proj: mat4x4<f32>,
    dem_upper_left: vec2<f32>,
    dem_scale: vec2<f32>,
    image_upper_left: vec2<f32>,
    image_scale: vec2<f32>,
    dem_dims: vec2<u32>,
    image_dims: vec2<u32>,
    vertical_exaggeration: f32,
    alpha: f32,
    dem_no_data: f32,
    _pad: f32,
};
@group(0) @binding(0) var<uniform> P: TerrainParams;
@group(0) @binding(1) var<storage, read> elevations: array<f32>;
@group(0) @binding(2) var<storage, read> reds: array<f32>;
@group(0) @binding(3) var<storage, read> greens: array<f32>;
@group(0) @binding(4) var<storage, read> blues: array<f32>;

// Row-major sample index under `world`, or -1 outside the raster.
fn sample_index(world: vec2<f32>, ul: vec2<f32>, scale: vec2<f32>, dims: vec2<u32>) -> i32 {
    let px = floor(vec2<f32>((world.x - ul.x) / scale.x, (ul.y - world.y) / scale.y));
    if (px.x < 0.0 || px.y < 0.0 || px.x >= f32(dims.x) || px.y >= f32(dims.y)) {
        return -1;
    }
    return i32(px.y) * i32(dims.x) + i32(px.x);
}

struct VSIn {
    @location(0) corner: vec2<f32>,
    @location(1) m0: vec4<f32>,
    @location(2) m1: vec4<f32>,
    @location(3) m2: vec4<f32>,
    @location(4) m3: vec4<f32>,
}

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec2<f32>,
    // 1 where the vertex has elevation, 0 over no-data or outside the DEM.
    @location(1) valid: f32,
}

@vertex
fn vs_main(in: VSIn) -> VSOut {
    let model = mat4x4<f32>(in.m0, in.m1, in.m2, in.m3);
    let world = (model * vec4<f32>(in.corner, 0.0, 1.0)).xy;

    var z = 0.0;
    var valid = 0.0;
    let i = sample_index(world, P.dem_upper_left, P.dem_scale, P.dem_dims);
    if (i >= 0) {
        let e = elevations[i];
        if (e != P.dem_no_data) {
            z = e * P.vertical_exaggeration;
            valid = 1.0;
        }
    }

    var out: VSOut;
    out.clip = P.view_proj * vec4<f32>(world, z, 1.0);
    out.world = world;
    out.valid = valid;
    return out;
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    if (in.valid < 0.999) {
        discard;
    }
    var rgb = vec3<f32>(0.32, 0.33, 0.36);
    let i = sample_index(in.world, P.image_upper_left, P.image_scale, P.image_dims);
    if (i >= 0) {
        rgb = vec3<f32>(reds[i], greens[i], blues[i]);
    }
    return vec4<f32>(rgb, P.alpha);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn rasters<'a>(elevations: &'a [f32], colors: &'a [f32]) -> RasterBuffers<'a> {
        RasterBuffers {
            elevations,
            reds: colors,
            greens: colors,
            blues: colors,
        }
    }

    #[test]
    fn smallest_limit_bounds_every_raster() {
        let limits = wgpu::Limits {
            max_buffer_size: 1024,
            max_storage_buffer_binding_size: 64,
            ..wgpu::Limits::default()
        };
        let small = vec![0.0f32; 16];
        let big = vec![0.0f32; 17];

        assert!(check_buffer_limits(&rasters(&small, &small), &limits).is_ok());
        assert_eq!(
            check_buffer_limits(&rasters(&small, &big), &limits),
            Err(BackendError::BufferTooLarge {
                what: "reds",
                size: 68,
                limit: 64
            })
        );
    }

    #[test]
    fn buffer_size_limit_applies_when_smaller() {
        let limits = wgpu::Limits {
            max_buffer_size: 32,
            max_storage_buffer_binding_size: 1 << 20,
            ..wgpu::Limits::default()
        };
        let dem = vec![0.0f32; 9];
        assert_eq!(
            check_buffer_limits(&rasters(&dem, &[]), &limits),
            Err(BackendError::BufferTooLarge {
                what: "elevations",
                size: 36,
                limit: 32
            })
        );
        assert!(check_buffer_limits(&rasters(&[], &[]), &limits).is_ok());
    }
}
