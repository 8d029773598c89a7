//! # Density Field
//!
//! A dense N×N×N grid of scalar samples covering a cube of `bounds_size`
//! world units with one corner at the origin. Every sample is stored as an
//! `(x, y, z, density)` record so the whole grid can be uploaded to the GPU
//! without repacking.
//!
//! ## Layout
//!
//! Samples are stored row-major with index `x*N*N + y*N + z`. Sample
//! `(x, y, z)` sits at world position `(x, y, z) * spacing` where
//! `spacing = bounds_size / (N - 1)`, so the outermost samples lie exactly on
//! the bounds.
//!
//! The grid is never resized in place. A resolution or bounds change goes
//! through `allocate`, which replaces every sample.

use cgmath::Point3;
use log::debug;

use crate::error::{Result, TerrainError};

/// One grid sample as seen by the triangulation unit.
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Density: f32 (4 bytes)
///
/// Total size: 16 bytes, matching a WGSL `vec4<f32>`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DensityPoint {
    /// World-space position of the sample
    pub position: [f32; 3],
    /// Scalar density; negative is solid, positive is empty
    pub density: f32,
}

impl DensityPoint {
    /// Position as a cgmath point.
    pub fn point(&self) -> Point3<f32> {
        Point3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// The dense sample grid.
#[derive(Debug, Clone)]
pub struct DensityField {
    resolution: u32,
    bounds_size: f32,
    spacing: f32,
    points: Vec<DensityPoint>,
}

impl DensityField {
    /// Allocates a field of `resolution³` samples with every density at zero.
    ///
    /// # Arguments
    /// * `resolution` - Samples per axis, at least 2
    /// * `bounds_size` - World-space edge length, positive and finite
    ///
    /// # Errors
    /// `InvalidConfig` for a degenerate size, `HostAllocation` when the sample
    /// buffer cannot be reserved.
    pub fn allocate(resolution: u32, bounds_size: f32) -> Result<Self> {
        if resolution < 2 {
            return Err(TerrainError::InvalidConfig(format!(
                "resolution must be at least 2, got {resolution}"
            )));
        }
        if !(bounds_size.is_finite() && bounds_size > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "bounds_size must be positive, got {bounds_size}"
            )));
        }

        let n = resolution as usize;
        let len = n
            .checked_mul(n)
            .and_then(|plane| plane.checked_mul(n))
            .ok_or(TerrainError::HostAllocation {
                what: "density field",
                bytes: u64::MAX,
            })?;

        let mut points = Vec::new();
        points
            .try_reserve_exact(len)
            .map_err(|_| TerrainError::HostAllocation {
                what: "density field",
                bytes: (len as u64).saturating_mul(std::mem::size_of::<DensityPoint>() as u64),
            })?;

        let spacing = bounds_size / (resolution - 1) as f32;
        for x in 0..resolution {
            for y in 0..resolution {
                for z in 0..resolution {
                    points.push(DensityPoint {
                        position: [x as f32 * spacing, y as f32 * spacing, z as f32 * spacing],
                        density: 0.0,
                    });
                }
            }
        }

        debug!(
            "Allocated density field: {}³ samples, spacing {:.4}",
            resolution, spacing
        );

        Ok(Self {
            resolution,
            bounds_size,
            spacing,
            points,
        })
    }

    /// Samples per axis.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// World-space edge length.
    pub fn bounds_size(&self) -> f32 {
        self.bounds_size
    }

    /// Distance between neighbouring samples along an axis.
    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Total number of samples, always `resolution³`.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A field always holds at least eight samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Flat index of grid coordinate `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let n = self.resolution as usize;
        x as usize * n * n + y as usize * n + z as usize
    }

    /// Inverse of `index`.
    #[inline]
    pub fn grid_coords(&self, index: usize) -> Point3<u32> {
        let n = self.resolution as usize;
        Point3::new(
            (index / (n * n)) as u32,
            ((index / n) % n) as u32,
            (index % n) as u32,
        )
    }

    /// The sample at `(x, y, z)`, or `None` outside the grid.
    pub fn sample(&self, x: u32, y: u32, z: u32) -> Option<DensityPoint> {
        if x >= self.resolution || y >= self.resolution || z >= self.resolution {
            return None;
        }
        Some(self.points[self.index(x, y, z)])
    }

    /// Adds `delta` to the density at `index` and returns the new value.
    /// Out-of-range indices are ignored.
    pub fn add_density(&mut self, index: usize, delta: f32) -> Option<f32> {
        let point = self.points.get_mut(index)?;
        point.density += delta;
        Some(point.density)
    }

    /// All samples in index order.
    pub fn points(&self) -> &[DensityPoint] {
        &self.points
    }

    /// Mutable access to every sample. Positions must not be modified.
    pub fn points_mut(&mut self) -> &mut [DensityPoint] {
        &mut self.points
    }

    /// Iterates `(grid coordinate, sample)` pairs in index order.
    pub fn iter_grid(&self) -> impl Iterator<Item = (Point3<u32>, &DensityPoint)> {
        self.points
            .iter()
            .enumerate()
            .map(move |(index, point)| (self.grid_coords(index), point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_produces_cubic_sample_count() {
        for n in [2u32, 3, 7, 16] {
            let field = DensityField::allocate(n, 10.0).unwrap();
            assert_eq!(field.len(), (n * n * n) as usize);
        }
    }

    #[test]
    fn positions_follow_spacing() {
        let field = DensityField::allocate(5, 20.0).unwrap();
        assert_eq!(field.spacing(), 5.0);

        let sample = field.sample(1, 2, 4).unwrap();
        assert_eq!(sample.position, [5.0, 10.0, 20.0]);
        assert_eq!(sample.density, 0.0);
        assert!(field.sample(5, 0, 0).is_none());
    }

    #[test]
    fn index_is_x_major() {
        let field = DensityField::allocate(4, 3.0).unwrap();
        assert_eq!(field.index(0, 0, 1), 1);
        assert_eq!(field.index(0, 1, 0), 4);
        assert_eq!(field.index(1, 0, 0), 16);
        assert_eq!(field.grid_coords(27), Point3::new(1, 2, 3));
    }

    #[test]
    fn add_density_accumulates() {
        let mut field = DensityField::allocate(2, 1.0).unwrap();
        field.add_density(3, 0.3);
        field.add_density(3, 0.3);
        assert!((field.points()[3].density - 0.6).abs() < 1e-6);
        assert_eq!(field.add_density(8, 1.0), None);
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(DensityField::allocate(1, 10.0).is_err());
        assert!(DensityField::allocate(4, 0.0).is_err());
        assert!(DensityField::allocate(4, f32::NAN).is_err());
    }
}
