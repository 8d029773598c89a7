//! # Surface Extraction
//!
//! Host-side orchestration of the marching-cubes triangulation unit.
//!
//! ## Architecture
//!
//! * **SurfaceExtractionBridge**: owns a backend, keeps its buffers sized for
//!   the current field and runs one extraction per call
//! * **ExtractionBackend**: the triangulation unit contract, implemented by
//!   `GpuBackend` (wgpu compute) and `CpuBackend` (host emulation)
//! * **triangulation**: the case table shared by both backends
//!
//! ## Extraction Sequence
//!
//! 1. Reallocate buffers if the field resolution changed
//! 2. Reset the append counter and upload every point record
//! 3. Dispatch `ceil((N-1)/8)` work groups per axis
//! 4. Read the counter, then read back exactly that many triangles
//!
//! Every step blocks until the previous one has completed on the device, so
//! the counter and triangle reads always observe the finished dispatch.

pub mod backend;
pub mod cpu_backend;
pub mod gpu_backend;
pub mod triangulation;

pub use backend::ExtractionBackend;
pub use cpu_backend::CpuBackend;
pub use gpu_backend::GpuBackend;

use log::{debug, info, warn};
use web_time::Instant;

use crate::{
    engine_state::voxels::DensityField,
    error::{Result, TerrainError},
};
use triangulation::MAX_TRIANGLES_PER_CELL;

/// Edge length of a compute work group in invocations.
pub const WORKGROUP_SIZE: u32 = 8;

/// One output triangle, three unshared vertex positions.
///
/// # Memory Layout
/// - a, b, c: 3x f32 each (36 bytes total, no padding)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Triangle {
    pub a: [f32; 3],
    pub b: [f32; 3],
    pub c: [f32; 3],
}

impl Triangle {
    /// Vertex `i` (0, 1 or 2).
    pub fn vertex(&self, i: usize) -> [f32; 3] {
        match i {
            0 => self.a,
            1 => self.b,
            _ => self.c,
        }
    }

    /// Unnormalised face normal `(b - a) × (c - a)`. Its length is twice the
    /// triangle's area.
    pub fn normal(&self) -> [f32; 3] {
        let u = [
            self.b[0] - self.a[0],
            self.b[1] - self.a[1],
            self.b[2] - self.a[2],
        ];
        let v = [
            self.c[0] - self.a[0],
            self.c[1] - self.a[1],
            self.c[2] - self.a[2],
        ];
        [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ]
    }
}

/// Buffer sizes derived from a field resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    /// Samples per axis
    pub resolution: u32,
    /// `resolution³` point records
    pub point_count: u64,
    /// Worst case `(resolution-1)³ * 5` triangles
    pub max_triangles: u32,
}

impl BufferLayout {
    /// Layout for a field with `resolution` samples per axis.
    ///
    /// # Errors
    /// `InvalidConfig` when the worst-case triangle count does not fit the
    /// `u32` append counter.
    pub fn for_resolution(resolution: u32) -> Result<Self> {
        let n = resolution as u64;
        let cells = n.saturating_sub(1);
        let max_triangles = cells
            .checked_mul(cells)
            .and_then(|plane| plane.checked_mul(cells))
            .and_then(|volume| volume.checked_mul(MAX_TRIANGLES_PER_CELL as u64))
            .and_then(|slots| u32::try_from(slots).ok())
            .ok_or_else(|| {
                TerrainError::InvalidConfig(format!(
                    "resolution {resolution} needs more triangle slots than the counter can address"
                ))
            })?;
        Ok(Self {
            resolution,
            point_count: n * n * n,
            max_triangles,
        })
    }

    /// Work groups per axis, `ceil((N-1)/8)`.
    pub fn workgroup_count(&self) -> u32 {
        self.resolution.saturating_sub(1).div_ceil(WORKGROUP_SIZE)
    }

    /// The 3D dispatch grid.
    pub fn workgroups(&self) -> [u32; 3] {
        let count = self.workgroup_count();
        [count, count, count]
    }
}

/// Drives a triangulation backend for a density field.
pub struct SurfaceExtractionBridge {
    backend: Box<dyn ExtractionBackend>,
}

impl SurfaceExtractionBridge {
    pub fn new(backend: Box<dyn ExtractionBackend>) -> Self {
        info!("Surface extraction using {} backend", backend.name());
        Self { backend }
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Layout of the backend's current buffers.
    pub fn allocated_layout(&self) -> Option<BufferLayout> {
        self.backend.allocated_layout()
    }

    /// Makes sure the backend's buffers match `resolution`, releasing and
    /// reallocating them when they do not.
    pub fn ensure_buffers(&mut self, resolution: u32) -> Result<BufferLayout> {
        let layout = BufferLayout::for_resolution(resolution)?;
        if self.backend.allocated_layout() != Some(layout) {
            if let Some(previous) = self.backend.allocated_layout() {
                info!(
                    "Resolution changed {} -> {}, reallocating extraction buffers",
                    previous.resolution, resolution
                );
            }
            self.backend.release();
            self.backend.allocate(layout)?;
            info!(
                "Allocated {} buffers: {} points, {} max triangles",
                self.backend.name(),
                layout.point_count,
                layout.max_triangles
            );
        }
        Ok(layout)
    }

    /// Extracts the iso-surface of `field` at `iso_level`.
    ///
    /// Returns exactly as many triangles as the unit reports producing. An
    /// empty list is a valid result.
    pub fn extract(&mut self, field: &DensityField, iso_level: f32) -> Result<Vec<Triangle>> {
        let start = Instant::now();
        let layout = self.ensure_buffers(field.resolution())?;

        self.backend.reset_counter()?;
        self.backend.upload_points(field.points())?;
        self.backend.dispatch(layout.workgroups(), iso_level)?;

        let produced = self.backend.read_triangle_count()?;
        let count = if produced > layout.max_triangles {
            warn!(
                "Triangle counter reported {} but capacity is {}; truncating",
                produced, layout.max_triangles
            );
            layout.max_triangles
        } else {
            produced
        };

        let triangles = self.backend.read_triangles(count)?;
        debug!(
            "Extracted {} triangles from {}³ field in {:?}",
            triangles.len(),
            layout.resolution,
            start.elapsed()
        );
        Ok(triangles)
    }

    /// Releases the backend's buffers.
    pub fn release(&mut self) {
        self.backend.release();
    }
}

impl Drop for SurfaceExtractionBridge {
    fn drop(&mut self) {
        self.backend.release();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::engine_state::voxels::DensityPoint;

    #[test]
    fn layout_sizes() {
        let layout = BufferLayout::for_resolution(50).unwrap();
        assert_eq!(layout.point_count, 125_000);
        assert_eq!(layout.max_triangles, 49 * 49 * 49 * 5);
        assert_eq!(layout.workgroup_count(), 7);

        assert_eq!(BufferLayout::for_resolution(2).unwrap().workgroup_count(), 1);
        assert_eq!(BufferLayout::for_resolution(9).unwrap().workgroup_count(), 1);
        assert_eq!(BufferLayout::for_resolution(10).unwrap().workgroup_count(), 2);
    }

    #[test]
    fn layout_rejects_counter_overflow() {
        // 949³ * 5 still fits a u32 counter, 999³ * 5 does not.
        assert!(BufferLayout::for_resolution(950).is_ok());
        assert!(matches!(
            BufferLayout::for_resolution(1000),
            Err(TerrainError::InvalidConfig(_))
        ));
        assert!(BufferLayout::for_resolution(u32::MAX).is_err());
    }

    #[test]
    fn face_normal_follows_winding() {
        let triangle = Triangle {
            a: [0.0, 0.0, 0.0],
            b: [0.0, 0.0, 1.0],
            c: [1.0, 0.0, 0.0],
        };
        assert_eq!(triangle.normal(), [0.0, 1.0, 0.0]);
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum BackendEvent {
        Allocate(u32),
        Release,
    }

    /// Logs buffer lifecycle calls and can be made to overflow its counter.
    #[derive(Default)]
    struct RecordingBackend {
        layout: Option<BufferLayout>,
        events: Rc<RefCell<Vec<BackendEvent>>>,
        reported_count: u32,
    }

    impl ExtractionBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
            self.layout = Some(layout);
            self.events
                .borrow_mut()
                .push(BackendEvent::Allocate(layout.resolution));
            Ok(())
        }
        fn release(&mut self) {
            self.layout = None;
            self.events.borrow_mut().push(BackendEvent::Release);
        }
        fn allocated_layout(&self) -> Option<BufferLayout> {
            self.layout
        }
        fn reset_counter(&mut self) -> Result<()> {
            Ok(())
        }
        fn upload_points(&mut self, _points: &[DensityPoint]) -> Result<()> {
            Ok(())
        }
        fn dispatch(&mut self, _workgroups: [u32; 3], _iso_level: f32) -> Result<()> {
            Ok(())
        }
        fn read_triangle_count(&mut self) -> Result<u32> {
            Ok(self.reported_count)
        }
        fn read_triangles(&mut self, count: u32) -> Result<Vec<Triangle>> {
            Ok(vec![Triangle::default(); count as usize])
        }
    }

    fn recording_bridge() -> (SurfaceExtractionBridge, Rc<RefCell<Vec<BackendEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let bridge = SurfaceExtractionBridge::new(Box::new(RecordingBackend {
            events: events.clone(),
            ..Default::default()
        }));
        (bridge, events)
    }

    fn allocations(events: &[BackendEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, BackendEvent::Allocate(_)))
            .count()
    }

    #[test]
    fn overflowing_counter_is_clamped() {
        let mut bridge = SurfaceExtractionBridge::new(Box::new(RecordingBackend {
            reported_count: 1_000,
            ..Default::default()
        }));
        let field = DensityField::allocate(2, 1.0).unwrap();
        let triangles = bridge.extract(&field, 0.5).unwrap();
        assert_eq!(triangles.len(), 5);
    }

    #[test]
    fn buffers_reallocate_only_on_resolution_change() {
        let (mut bridge, events) = recording_bridge();
        let small = DensityField::allocate(3, 1.0).unwrap();
        let large = DensityField::allocate(6, 1.0).unwrap();

        bridge.extract(&small, 0.5).unwrap();
        bridge.extract(&small, 0.5).unwrap();
        assert_eq!(allocations(&events.borrow()), 1);
        assert_eq!(bridge.allocated_layout().map(|l| l.resolution), Some(3));

        bridge.extract(&large, 0.5).unwrap();
        assert_eq!(allocations(&events.borrow()), 2);
        assert_eq!(bridge.allocated_layout().map(|l| l.resolution), Some(6));
    }

    #[test]
    fn old_buffers_are_released_before_reallocation_and_on_drop() {
        let (mut bridge, events) = recording_bridge();
        bridge
            .extract(&DensityField::allocate(3, 1.0).unwrap(), 0.5)
            .unwrap();
        events.borrow_mut().clear();

        bridge
            .extract(&DensityField::allocate(5, 1.0).unwrap(), 0.5)
            .unwrap();
        assert_eq!(
            *events.borrow(),
            vec![BackendEvent::Release, BackendEvent::Allocate(5)]
        );

        drop(bridge);
        assert_eq!(
            *events.borrow(),
            vec![
                BackendEvent::Release,
                BackendEvent::Allocate(5),
                BackendEvent::Release
            ]
        );
    }
}
