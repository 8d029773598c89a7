//! # Terrain Generation
//!
//! Fills a density field with a height-map terrain. Each column `(x, z)` gets
//! a height from 2D Perlin noise, and every sample in the column stores
//! `y*spacing - height`: negative below the ground, positive above.
//!
//! The noise is sampled at `grid / resolution * frequency + offset`. The
//! offset is drawn once per session so each run produces different terrain,
//! while seeding twice with the same offset is bit-identical.

use log::info;
use noise::{NoiseFn, Perlin};
use web_time::Instant;

use super::density_field::DensityField;

/// Upper bound (exclusive) for randomly drawn terrain offsets.
pub const MAX_RANDOM_OFFSET: f64 = 1000.0;

/// Terrain height for a grid column.
pub trait HeightFunction {
    /// Height in world units of column `(x, z)` of a field with `resolution`
    /// samples per axis.
    fn height(&self, x: u32, z: u32, resolution: u32, offset: f64) -> f32;
}

impl<F> HeightFunction for F
where
    F: Fn(u32, u32, u32, f64) -> f32,
{
    fn height(&self, x: u32, z: u32, resolution: u32, offset: f64) -> f32 {
        self(x, z, resolution, offset)
    }
}

/// Perlin-noise height map shifted by a base height.
pub struct TerrainHeight {
    perlin: Perlin,
    /// Multiplier applied to normalised grid coordinates
    pub frequency: f64,
    /// Amplitude of the noise contribution
    pub height_scale: f32,
    /// Height of the terrain where the noise is zero
    pub base_height: f32,
}

impl TerrainHeight {
    /// Creates a height map from a noise seed and shape parameters.
    pub fn new(seed: u32, frequency: f32, height_scale: f32, base_height: f32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            frequency: frequency as f64,
            height_scale,
            base_height,
        }
    }

    /// A flat terrain at `base_height`.
    pub fn flat(base_height: f32) -> Self {
        Self::new(0, 0.0, 0.0, base_height)
    }

    /// Noise remapped from `[-1, 1]` to `[0, 1]`.
    fn unit_noise(&self, u: f64, v: f64) -> f32 {
        let raw = self.perlin.get([u, v]);
        (raw * 0.5 + 0.5).clamp(0.0, 1.0) as f32
    }
}

impl HeightFunction for TerrainHeight {
    fn height(&self, x: u32, z: u32, resolution: u32, offset: f64) -> f32 {
        if self.height_scale == 0.0 {
            return self.base_height;
        }
        let u = x as f64 / resolution as f64 * self.frequency + offset;
        let v = z as f64 / resolution as f64 * self.frequency + offset;
        self.unit_noise(u, v) * self.height_scale + self.base_height
    }
}

/// Populates density fields from a height function.
pub struct ProceduralSeeder;

impl ProceduralSeeder {
    /// Overwrites every density in `field` with `y*spacing - height(x, z)`.
    ///
    /// Heights are computed once per column. Positions are left untouched.
    pub fn seed(field: &mut DensityField, height_fn: &dyn HeightFunction, offset: f64) {
        let start = Instant::now();
        let resolution = field.resolution();
        let spacing = field.spacing();

        for x in 0..resolution {
            for z in 0..resolution {
                let height = height_fn.height(x, z, resolution, offset);
                for y in 0..resolution {
                    let index = field.index(x, y, z);
                    field.points_mut()[index].density = y as f32 * spacing - height;
                }
            }
        }

        info!(
            "Seeded {}³ density field (offset {:.3}) in {:?}",
            resolution,
            offset,
            start.elapsed()
        );
    }

    /// Draws a fresh per-session offset in `[0, MAX_RANDOM_OFFSET)`.
    pub fn random_offset() -> f64 {
        fastrand::f64() * MAX_RANDOM_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_height_above_ground() {
        let mut field = DensityField::allocate(5, 4.0).unwrap();
        ProceduralSeeder::seed(&mut field, &TerrainHeight::flat(2.0), 0.0);

        for (coords, point) in field.iter_grid() {
            let expected = coords.y as f32 * field.spacing() - 2.0;
            assert_eq!(point.density, expected);
        }
    }

    #[test]
    fn same_offset_is_bit_identical() {
        let height = TerrainHeight::new(7, 2.0, 5.0, 5.0);
        let mut a = DensityField::allocate(12, 20.0).unwrap();
        let mut b = DensityField::allocate(12, 20.0).unwrap();
        ProceduralSeeder::seed(&mut a, &height, 431.25);
        ProceduralSeeder::seed(&mut b, &height, 431.25);

        let bits = |field: &DensityField| -> Vec<u32> {
            field.points().iter().map(|p| p.density.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn heights_stay_within_amplitude() {
        let height = TerrainHeight::new(3, 2.0, 5.0, 5.0);
        for x in 0..20 {
            for z in 0..20 {
                let h = height.height(x, z, 20, 17.5);
                assert!((5.0..=10.0).contains(&h), "height {h} out of range");
            }
        }
    }

    #[test]
    fn closures_are_height_functions() {
        let mut field = DensityField::allocate(3, 2.0).unwrap();
        let ramp = |x: u32, _z: u32, _n: u32, _offset: f64| x as f32;
        ProceduralSeeder::seed(&mut field, &ramp, 0.0);
        assert_eq!(field.sample(2, 0, 0).unwrap().density, -2.0);
        assert_eq!(field.sample(0, 1, 0).unwrap().density, 1.0);
    }

    #[test]
    fn random_offset_in_range() {
        for _ in 0..100 {
            let offset = ProceduralSeeder::random_offset();
            assert!((0.0..MAX_RANDOM_OFFSET).contains(&offset));
        }
    }
}
