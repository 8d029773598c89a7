//! The calling contract of the triangulation unit.

use super::{BufferLayout, Triangle};
use crate::{engine_state::voxels::DensityPoint, error::Result};

/// An implementation of the triangulation unit together with the point,
/// triangle and counter buffers it reads and writes.
///
/// The bridge drives a backend through one fixed sequence per extraction:
/// `reset_counter`, `upload_points`, `dispatch`, `read_triangle_count`,
/// `read_triangles`. Each call observes the completed effects of the
/// previous one.
pub trait ExtractionBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Allocates buffers for `layout`, releasing any previous set first.
    fn allocate(&mut self, layout: BufferLayout) -> Result<()>;

    /// Releases all per-resolution buffers. Safe to call when nothing is
    /// allocated.
    fn release(&mut self);

    /// Layout of the currently allocated buffers.
    fn allocated_layout(&self) -> Option<BufferLayout>;

    /// Sets the append counter back to zero.
    fn reset_counter(&mut self) -> Result<()>;

    /// Copies every point record into the point buffer. The slice length must
    /// equal the allocated point count.
    fn upload_points(&mut self, points: &[DensityPoint]) -> Result<()>;

    /// Runs one invocation per cell over the given work-group grid and waits
    /// for it to finish.
    fn dispatch(&mut self, workgroups: [u32; 3], iso_level: f32) -> Result<()>;

    /// Value of the append counter after the last dispatch. May exceed the
    /// triangle capacity if the kernel overflowed it.
    fn read_triangle_count(&mut self) -> Result<u32>;

    /// The first `count` triangles of the output buffer.
    fn read_triangles(&mut self, count: u32) -> Result<Vec<Triangle>>;
}
