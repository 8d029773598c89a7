//! # Sculpting
//!
//! Spherical brush edits on a density field. Every sample whose position lies
//! within `radius` of the brush centre (inclusive) moves by a fixed step:
//! up when erasing, down when building. There is no falloff.
//!
//! Only the grid-aligned box around the sphere is visited, which touches the
//! same samples a full scan would.

use cgmath::{MetricSpace, Point3};
use log::trace;

use super::density_field::DensityField;

/// Applies brush strokes to a density field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SculptEditor {
    /// Density change per application
    pub step: f32,
    /// Optional `[min, max]` range edited densities saturate to
    pub clamp: Option<[f32; 2]>,
}

impl SculptEditor {
    /// Creates an editor with the given step and no clamp.
    pub fn new(step: f32) -> Self {
        Self { step, clamp: None }
    }

    /// Saturates edited samples to `[min, max]`.
    pub fn with_clamp(mut self, clamp: Option<[f32; 2]>) -> Self {
        self.clamp = clamp;
        self
    }

    /// Applies one brush stroke and returns the number of samples changed.
    ///
    /// # Arguments
    /// * `field` - The field to edit
    /// * `world_point` - Brush centre in world space
    /// * `radius` - Brush radius in world units
    /// * `erase` - Raise density (carve) instead of lowering it (build)
    pub fn apply(
        &self,
        field: &mut DensityField,
        world_point: Point3<f32>,
        radius: f32,
        erase: bool,
    ) -> usize {
        let finite_center =
            world_point.x.is_finite() && world_point.y.is_finite() && world_point.z.is_finite();
        if !(finite_center && radius.is_finite() && radius >= 0.0) {
            return 0;
        }
        let Some((min, max)) = Self::grid_box(field, world_point, radius) else {
            return 0;
        };

        let delta = if erase { self.step } else { -self.step };
        let mut touched = 0;

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    let index = field.index(x, y, z);
                    let point = &mut field.points_mut()[index];
                    if point.point().distance(world_point) > radius {
                        continue;
                    }
                    let mut density = point.density + delta;
                    if let Some([lo, hi]) = self.clamp {
                        density = density.clamp(lo, hi);
                    }
                    point.density = density;
                    touched += 1;
                }
            }
        }

        trace!(
            "{} brush at ({:.2}, {:.2}, {:.2}) touched {} samples",
            if erase { "Erase" } else { "Build" },
            world_point.x,
            world_point.y,
            world_point.z,
            touched
        );
        touched
    }

    /// Inclusive grid-coordinate box covering the brush sphere, clipped to the
    /// field. `None` when the sphere misses the field entirely.
    fn grid_box(
        field: &DensityField,
        center: Point3<f32>,
        radius: f32,
    ) -> Option<(Point3<u32>, Point3<u32>)> {
        let spacing = field.spacing();
        let last = (field.resolution() - 1) as f32;

        let axis = |c: f32| -> Option<(u32, u32)> {
            let lo = ((c - radius) / spacing).floor().max(0.0);
            let hi = ((c + radius) / spacing).ceil().min(last);
            (lo <= hi).then_some((lo as u32, hi as u32))
        };

        let (x0, x1) = axis(center.x)?;
        let (y0, y1) = axis(center.y)?;
        let (z0, z1) = axis(center.z)?;
        Some((Point3::new(x0, y0, z0), Point3::new(x1, y1, z1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_field() -> DensityField {
        DensityField::allocate(11, 10.0).unwrap()
    }

    #[test]
    fn build_lowers_density_inside_radius_only() {
        let mut field = flat_field();
        let center = Point3::new(5.0, 5.0, 5.0);
        let touched = SculptEditor::new(0.3).apply(&mut field, center, 2.0, false);

        let mut inside = 0;
        for point in field.points() {
            if point.point().distance(center) <= 2.0 {
                assert!((point.density + 0.3).abs() < 1e-6);
                inside += 1;
            } else {
                assert_eq!(point.density, 0.0);
            }
        }
        assert_eq!(touched, inside);
        // 33 lattice points lie within distance 2 of a lattice point.
        assert_eq!(inside, 33);
    }

    #[test]
    fn erase_then_build_restores_zero_field() {
        let mut field = flat_field();
        let editor = SculptEditor::new(0.3);
        let center = Point3::new(3.0, 4.0, 7.0);
        editor.apply(&mut field, center, 3.0, true);
        editor.apply(&mut field, center, 3.0, false);
        assert!(field.points().iter().all(|p| p.density.abs() < 1e-6));
    }

    #[test]
    fn brush_outside_field_is_noop() {
        let mut field = flat_field();
        let touched =
            SculptEditor::new(0.3).apply(&mut field, Point3::new(-50.0, 5.0, 5.0), 2.0, true);
        assert_eq!(touched, 0);
        assert!(field.points().iter().all(|p| p.density == 0.0));
    }

    #[test]
    fn brush_overlapping_edge_is_clipped() {
        let mut field = flat_field();
        let touched =
            SculptEditor::new(0.3).apply(&mut field, Point3::new(0.0, 0.0, 0.0), 1.0, true);
        // Origin plus its three in-field axis neighbours.
        assert_eq!(touched, 4);
    }

    #[test]
    fn clamp_saturates_repeated_edits() {
        let mut field = flat_field();
        let editor = SculptEditor::new(0.3).with_clamp(Some([-1.0, 1.0]));
        let center = Point3::new(5.0, 5.0, 5.0);
        for _ in 0..10 {
            editor.apply(&mut field, center, 0.5, true);
        }
        let index = field.index(5, 5, 5);
        assert_eq!(field.points()[index].density, 1.0);
    }
}
