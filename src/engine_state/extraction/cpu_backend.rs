//! Host emulation of the triangulation unit.
//!
//! Walks the same work-group grid a GPU dispatch would, skips invocations
//! outside the cell range, and appends through a counter that keeps counting
//! past the buffer capacity exactly like the atomic on the device. Output
//! order is deterministic (work groups and local ids in x, y, z order).

use log::trace;

use super::{
    backend::ExtractionBackend, triangulation::march_cell, BufferLayout, Triangle,
    WORKGROUP_SIZE,
};
use crate::{
    engine_state::voxels::DensityPoint,
    error::{Result, TerrainError},
};

struct HostBuffers {
    layout: BufferLayout,
    points: Vec<DensityPoint>,
    triangles: Vec<Triangle>,
    counter: u32,
}

/// Runs marching cubes on the CPU.
#[derive(Default)]
pub struct CpuBackend {
    buffers: Option<HostBuffers>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&self) -> Result<&HostBuffers> {
        self.buffers.as_ref().ok_or(TerrainError::NotAllocated)
    }

    fn buffers_mut(&mut self) -> Result<&mut HostBuffers> {
        self.buffers.as_mut().ok_or(TerrainError::NotAllocated)
    }
}

fn reserve<T>(what: &'static str, len: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| TerrainError::HostAllocation {
            what,
            bytes: (len as u64).saturating_mul(std::mem::size_of::<T>() as u64),
        })?;
    Ok(buffer)
}

impl ExtractionBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
        self.release();
        let points = reserve("point buffer", layout.point_count as usize)?;
        let triangles = reserve("triangle buffer", layout.max_triangles as usize)?;
        self.buffers = Some(HostBuffers {
            layout,
            points,
            triangles,
            counter: 0,
        });
        Ok(())
    }

    fn release(&mut self) {
        if self.buffers.take().is_some() {
            trace!("Released host extraction buffers");
        }
    }

    fn allocated_layout(&self) -> Option<BufferLayout> {
        self.buffers.as_ref().map(|buffers| buffers.layout)
    }

    fn reset_counter(&mut self) -> Result<()> {
        let buffers = self.buffers_mut()?;
        buffers.counter = 0;
        buffers.triangles.clear();
        Ok(())
    }

    fn upload_points(&mut self, points: &[DensityPoint]) -> Result<()> {
        let buffers = self.buffers_mut()?;
        if points.len() as u64 != buffers.layout.point_count {
            return Err(TerrainError::StaleBuffers {
                allocated: buffers.layout.point_count as usize,
                provided: points.len(),
            });
        }
        buffers.points.clear();
        buffers.points.extend_from_slice(points);
        Ok(())
    }

    fn dispatch(&mut self, workgroups: [u32; 3], iso_level: f32) -> Result<()> {
        let buffers = self.buffers_mut()?;
        let n = buffers.layout.resolution;
        let cells = n - 1;
        let capacity = buffers.layout.max_triangles;
        let index = |x: u32, y: u32, z: u32| (x * n * n + y * n + z) as usize;

        let HostBuffers {
            points,
            triangles,
            counter,
            ..
        } = buffers;

        for gx in 0..workgroups[0] {
            for gy in 0..workgroups[1] {
                for gz in 0..workgroups[2] {
                    for lx in 0..WORKGROUP_SIZE {
                        for ly in 0..WORKGROUP_SIZE {
                            for lz in 0..WORKGROUP_SIZE {
                                let x = gx * WORKGROUP_SIZE + lx;
                                let y = gy * WORKGROUP_SIZE + ly;
                                let z = gz * WORKGROUP_SIZE + lz;
                                if x >= cells || y >= cells || z >= cells {
                                    continue;
                                }

                                let corners = [
                                    points[index(x, y, z)],
                                    points[index(x + 1, y, z)],
                                    points[index(x + 1, y, z + 1)],
                                    points[index(x, y, z + 1)],
                                    points[index(x, y + 1, z)],
                                    points[index(x + 1, y + 1, z)],
                                    points[index(x + 1, y + 1, z + 1)],
                                    points[index(x, y + 1, z + 1)],
                                ];

                                march_cell(&corners, iso_level, |triangle| {
                                    if *counter < capacity {
                                        triangles.push(triangle);
                                    }
                                    *counter = counter.saturating_add(1);
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn read_triangle_count(&mut self) -> Result<u32> {
        Ok(self.buffers()?.counter)
    }

    fn read_triangles(&mut self, count: u32) -> Result<Vec<Triangle>> {
        let buffers = self.buffers()?;
        let available = buffers.triangles.len() as u32;
        if count > available {
            return Err(TerrainError::TriangleReadOutOfRange {
                requested: count,
                available,
            });
        }
        Ok(buffers.triangles[..count as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::DensityField;

    #[test]
    fn calls_before_allocate_fail() {
        let mut backend = CpuBackend::new();
        assert!(matches!(
            backend.reset_counter(),
            Err(TerrainError::NotAllocated)
        ));
        assert!(backend.read_triangle_count().is_err());
    }

    #[test]
    fn upload_rejects_mismatched_size() {
        let mut backend = CpuBackend::new();
        backend.allocate(BufferLayout::for_resolution(3).unwrap()).unwrap();
        let field = DensityField::allocate(4, 1.0).unwrap();
        let err = backend.upload_points(field.points()).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::StaleBuffers {
                allocated: 27,
                provided: 64
            }
        ));
    }

    #[test]
    fn read_beyond_count_fails() {
        let mut backend = CpuBackend::new();
        let layout = BufferLayout::for_resolution(2).unwrap();
        backend.allocate(layout).unwrap();
        let field = DensityField::allocate(2, 1.0).unwrap();
        backend.reset_counter().unwrap();
        backend.upload_points(field.points()).unwrap();
        backend.dispatch(layout.workgroups(), 0.5).unwrap();

        // All corners at zero are below 0.5: no surface.
        assert_eq!(backend.read_triangle_count().unwrap(), 0);
        assert!(backend.read_triangles(1).is_err());
    }

    #[test]
    fn release_drops_layout() {
        let mut backend = CpuBackend::new();
        backend.allocate(BufferLayout::for_resolution(5).unwrap()).unwrap();
        assert_eq!(backend.allocated_layout().map(|l| l.resolution), Some(5));
        backend.release();
        assert_eq!(backend.allocated_layout(), None);
    }
}
