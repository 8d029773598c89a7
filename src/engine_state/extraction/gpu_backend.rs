//! # GPU Backend
//!
//! Runs the marching-cubes kernel (`assets/shaders/marching_cubes.wgsl`) as a
//! wgpu compute pipeline. All buffers live in a `BufferState` registry:
//!
//! - `points`: N³ `vec4<f32>` records, read-only storage
//! - `triangles`: append output, nine floats per triangle
//! - `triangle_count`: the atomic append counter
//! - `count_staging` / `triangle_staging`: `MAP_READ` copies for readback
//! - `extraction_params`: resolution, iso-level and capacity uniform
//! - `tri_table`: the case table, uploaded once
//!
//! Every readback submits its copy and then blocks on `device.poll` before
//! mapping, so reads never observe a partially finished dispatch.

use log::{debug, info};
use wgpu::{BindGroup, BindGroupLayout, ComputePipeline, Device};

use super::{
    backend::ExtractionBackend, triangulation::TRI_TABLE, BufferLayout, Triangle,
};
use crate::{
    application_state::Graphics,
    core::StSystem,
    engine_state::{buffer_state::BufferState, voxels::DensityPoint},
    error::{Result, TerrainError},
};

pub const POINTS_BUFFER_NAME: &str = "points";
pub const TRIANGLES_BUFFER_NAME: &str = "triangles";
pub const TRIANGLE_COUNT_BUFFER_NAME: &str = "triangle_count";
pub const COUNT_STAGING_BUFFER_NAME: &str = "count_staging";
pub const TRIANGLE_STAGING_BUFFER_NAME: &str = "triangle_staging";
pub const PARAMS_BUFFER_NAME: &str = "extraction_params";
pub const TRI_TABLE_BUFFER_NAME: &str = "tri_table";

/// Buffers that are sized per resolution and released on every reallocation.
const PER_RESOLUTION_BUFFERS: [&str; 5] = [
    POINTS_BUFFER_NAME,
    TRIANGLES_BUFFER_NAME,
    TRIANGLE_COUNT_BUFFER_NAME,
    COUNT_STAGING_BUFFER_NAME,
    TRIANGLE_STAGING_BUFFER_NAME,
];

const TRIANGLE_SIZE: u64 = std::mem::size_of::<Triangle>() as u64;
const POINT_SIZE: u64 = std::mem::size_of::<DensityPoint>() as u64;

/// Uniform block read by the kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ExtractionParams {
    num_points_per_axis: u32,
    iso_level: f32,
    max_triangles: u32,
    _pad: u32,
}

/// Marching cubes on the GPU.
pub struct GpuBackend {
    device: StSystem<Device>,
    buffer_state: BufferState,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    bind_group: Option<BindGroup>,
    layout: Option<BufferLayout>,
}

impl GpuBackend {
    /// Builds the pipeline on the device of `graphics`.
    pub fn from_graphics(graphics: &Graphics) -> Result<Self> {
        Self::new(graphics.device.clone(), graphics.queue.clone())
    }

    /// Compiles the kernel and uploads the case table.
    pub fn new(device: StSystem<Device>, queue: StSystem<wgpu::Queue>) -> Result<Self> {
        let mut buffer_state = BufferState::new(device.clone(), queue);

        let (pipeline, bind_group_layout) = {
            let device_ref = device.get();

            let shader = device_ref.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Marching Cubes Shader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("../../../assets/shaders/marching_cubes.wgsl").into(),
                ),
            });

            let bind_group_layout =
                device_ref.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Marching Cubes Bind Group Layout"),
                    entries: &[
                        storage_entry(0, true),
                        storage_entry(1, false),
                        storage_entry(2, false),
                        storage_entry(3, true),
                        wgpu::BindGroupLayoutEntry {
                            binding: 4,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

            let pipeline_layout =
                device_ref.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Marching Cubes Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

            let pipeline = device_ref.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Marching Cubes Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            (pipeline, bind_group_layout)
        };

        let table_bytes: &[u8] = bytemuck::cast_slice(&TRI_TABLE[..]);
        buffer_state.create_buffer(
            TRI_TABLE_BUFFER_NAME,
            wgpu::BufferDescriptor {
                label: Some("Triangle Table Buffer"),
                size: table_bytes.len() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        )?;
        buffer_state.write_buffer(TRI_TABLE_BUFFER_NAME, 0, table_bytes)?;

        buffer_state.create_buffer(
            PARAMS_BUFFER_NAME,
            wgpu::BufferDescriptor {
                label: Some("Extraction Params Buffer"),
                size: std::mem::size_of::<ExtractionParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        )?;

        info!("Marching cubes compute pipeline ready");

        Ok(Self {
            device,
            buffer_state,
            pipeline,
            bind_group_layout,
            bind_group: None,
            layout: None,
        })
    }

    /// Bytes currently allocated on the device by this backend.
    pub fn allocated_bytes(&self) -> u64 {
        self.buffer_state.get_total_allocated_memory()
    }

    fn create_sized_buffer(
        &mut self,
        name: &'static str,
        label: &'static str,
        size: u64,
        usage: wgpu::BufferUsages,
        binding_limit: Option<u64>,
    ) -> Result<()> {
        let limit = binding_limit.unwrap_or(self.device.get().limits().max_buffer_size);
        if size > limit {
            return Err(TerrainError::BufferTooLarge {
                name,
                requested: size,
                limit,
            });
        }
        self.buffer_state.create_buffer(
            name,
            wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            },
        )
    }

    fn create_bind_group(&self) -> Result<BindGroup> {
        let buffers = &self.buffer_state;
        Ok(self
            .device
            .get()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Marching Cubes Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.get_entire_binding(POINTS_BUFFER_NAME)?,
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.get_entire_binding(TRIANGLES_BUFFER_NAME)?,
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.get_entire_binding(TRIANGLE_COUNT_BUFFER_NAME)?,
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: buffers.get_entire_binding(TRI_TABLE_BUFFER_NAME)?,
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: buffers.get_entire_binding(PARAMS_BUFFER_NAME)?,
                    },
                ],
            }))
    }

    fn layout(&self) -> Result<BufferLayout> {
        self.layout.ok_or(TerrainError::NotAllocated)
    }

    /// Copies `size` bytes from `source` into `staging`, waits for the copy
    /// and returns the mapped bytes.
    fn read_back(
        &self,
        source: &'static str,
        staging: &'static str,
        size: u64,
    ) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let device = self.device.get();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Extraction Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(
            self.buffer_state.get_buffer(source)?,
            0,
            self.buffer_state.get_buffer(staging)?,
            0,
            size,
        );
        self.buffer_state.queue.get().submit(Some(encoder.finish()));
        drop(device);

        self.buffer_state.read_buffer(staging, size)
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl ExtractionBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
        self.release();

        let storage_limit = self.device.get().limits().max_storage_buffer_binding_size as u64;
        let points_size = layout.point_count * POINT_SIZE;
        let triangles_size = layout.max_triangles as u64 * TRIANGLE_SIZE;

        let result = (|| -> Result<BindGroup> {
            self.create_sized_buffer(
                POINTS_BUFFER_NAME,
                "Points Buffer",
                points_size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                Some(storage_limit),
            )?;
            self.create_sized_buffer(
                TRIANGLES_BUFFER_NAME,
                "Triangles Buffer",
                triangles_size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                Some(storage_limit),
            )?;
            self.create_sized_buffer(
                TRIANGLE_COUNT_BUFFER_NAME,
                "Triangle Count Buffer",
                4,
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                None,
            )?;
            self.create_sized_buffer(
                COUNT_STAGING_BUFFER_NAME,
                "Triangle Count Staging Buffer",
                4,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                None,
            )?;
            self.create_sized_buffer(
                TRIANGLE_STAGING_BUFFER_NAME,
                "Triangle Staging Buffer",
                triangles_size,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                None,
            )?;
            self.create_bind_group()
        })();

        match result {
            Ok(bind_group) => {
                self.bind_group = Some(bind_group);
                self.layout = Some(layout);
                debug!(
                    "GPU extraction buffers hold {} bytes",
                    self.buffer_state.get_total_allocated_memory()
                );
                Ok(())
            }
            Err(error) => {
                self.release();
                Err(error)
            }
        }
    }

    fn release(&mut self) {
        self.bind_group = None;
        self.layout = None;
        for name in PER_RESOLUTION_BUFFERS {
            self.buffer_state.destroy_buffer(name);
        }
    }

    fn allocated_layout(&self) -> Option<BufferLayout> {
        self.layout
    }

    fn reset_counter(&mut self) -> Result<()> {
        self.layout()?;
        self.buffer_state
            .write_buffer(TRIANGLE_COUNT_BUFFER_NAME, 0, bytemuck::bytes_of(&0u32))
    }

    fn upload_points(&mut self, points: &[DensityPoint]) -> Result<()> {
        let layout = self.layout()?;
        if points.len() as u64 != layout.point_count {
            return Err(TerrainError::StaleBuffers {
                allocated: layout.point_count as usize,
                provided: points.len(),
            });
        }
        self.buffer_state
            .write_buffer(POINTS_BUFFER_NAME, 0, bytemuck::cast_slice(points))
    }

    fn dispatch(&mut self, workgroups: [u32; 3], iso_level: f32) -> Result<()> {
        let layout = self.layout()?;
        let bind_group = self.bind_group.as_ref().ok_or(TerrainError::NotAllocated)?;

        let params = ExtractionParams {
            num_points_per_axis: layout.resolution,
            iso_level,
            max_triangles: layout.max_triangles,
            _pad: 0,
        };
        self.buffer_state
            .write_buffer(PARAMS_BUFFER_NAME, 0, bytemuck::bytes_of(&params))?;

        let device = self.device.get();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Marching Cubes Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Marching Cubes Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }
        self.buffer_state.queue.get().submit(Some(encoder.finish()));

        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| TerrainError::BufferMap {
                name: TRIANGLES_BUFFER_NAME,
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn read_triangle_count(&mut self) -> Result<u32> {
        self.layout()?;
        let bytes = self.read_back(TRIANGLE_COUNT_BUFFER_NAME, COUNT_STAGING_BUFFER_NAME, 4)?;
        Ok(bytemuck::pod_read_unaligned::<u32>(&bytes))
    }

    fn read_triangles(&mut self, count: u32) -> Result<Vec<Triangle>> {
        let layout = self.layout()?;
        if count > layout.max_triangles {
            return Err(TerrainError::TriangleReadOutOfRange {
                requested: count,
                available: layout.max_triangles,
            });
        }
        let bytes = self.read_back(
            TRIANGLES_BUFFER_NAME,
            TRIANGLE_STAGING_BUFFER_NAME,
            count as u64 * TRIANGLE_SIZE,
        )?;
        Ok(bytes
            .chunks_exact(TRIANGLE_SIZE as usize)
            .map(bytemuck::pod_read_unaligned::<Triangle>)
            .collect())
    }
}
