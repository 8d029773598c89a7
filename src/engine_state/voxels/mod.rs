//! # Voxel Field
//!
//! The host-side scalar field the surface is extracted from.
//!
//! ## Components
//!
//! * **DensityField**: the dense `(x, y, z, density)` sample grid
//! * **ProceduralSeeder**: fills a fresh field from a height function
//! * **SculptEditor**: spherical build/erase brush edits
//!
//! ## Data Flow
//!
//! 1. The field is allocated for a resolution and bounds size
//! 2. The seeder writes the initial terrain once
//! 3. Brush edits mutate densities in place between extractions
//! 4. The extraction bridge uploads the whole field every frame

pub mod density_field;
pub mod sculpting;
pub mod terrain_generation;

pub use density_field::{DensityField, DensityPoint};
pub use sculpting::SculptEditor;
pub use terrain_generation::{HeightFunction, ProceduralSeeder, TerrainHeight};
