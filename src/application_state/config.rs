//! # Terrain Configuration
//!
//! Construction-time settings for the field, the terrain generator, the brush
//! and the extraction backend. Values are read from JSON with `serde_json`;
//! any field missing from the file keeps its default.
//!
//! ```json
//! {
//!     "resolution": 50,
//!     "bounds_size": 20.0,
//!     "iso_level": 0.5,
//!     "brush_radius": 5.0,
//!     "backend": "auto"
//! }
//! ```

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Default number of samples per axis
pub const DEFAULT_RESOLUTION: u32 = 50;
/// Default edge length of the cubic world volume
pub const DEFAULT_BOUNDS_SIZE: f32 = 20.0;
/// Default iso-level separating solid from empty space
pub const DEFAULT_ISO_LEVEL: f32 = 0.5;
/// Default density change applied by one brush application
pub const DEFAULT_BRUSH_STEP: f32 = 0.3;
/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "TERRAIN_CONFIG";
/// Configuration file used when the environment variable is unset
pub const DEFAULT_CONFIG_PATH: &str = "assets/config/terrain.json";

/// Which implementation of the triangulation unit to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Use the GPU when an adapter is available, otherwise the CPU
    #[default]
    Auto,
    /// Require the GPU compute backend
    Gpu,
    /// Always run the host emulation
    Cpu,
}

/// How vertex normals are derived from the unindexed triangle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalMode {
    /// Average face normals over every vertex at the same position
    #[default]
    Smooth,
    /// Each triangle keeps its own face normal
    Flat,
}

/// All tunables for a terrain session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Samples per axis (N); the field holds N³ samples
    pub resolution: u32,
    /// World-space edge length covered by the field
    pub bounds_size: f32,
    /// Density threshold where the surface is placed
    pub iso_level: f32,
    /// Radius of the spherical sculpt brush in world units
    pub brush_radius: f32,
    /// Density change per brush application
    pub brush_step: f32,
    /// Height added to every terrain column
    pub base_height: f32,
    /// Frequency multiplier applied to grid coordinates before sampling noise
    pub noise_frequency: f32,
    /// Amplitude of the noise contribution to terrain height
    pub noise_height_scale: f32,
    /// Seed for the Perlin permutation table
    pub noise_seed: u32,
    /// Fixed terrain offset; drawn at random for each run when absent
    pub terrain_offset: Option<f64>,
    /// Optional `[min, max]` range sculpted densities saturate to
    pub density_clamp: Option<[f32; 2]>,
    /// Normal derivation used by the mesh assembler
    pub normal_mode: NormalMode,
    /// Triangulation backend selection
    pub backend: BackendPreference,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            bounds_size: DEFAULT_BOUNDS_SIZE,
            iso_level: DEFAULT_ISO_LEVEL,
            brush_radius: 5.0,
            brush_step: DEFAULT_BRUSH_STEP,
            base_height: 5.0,
            noise_frequency: 2.0,
            noise_height_scale: 5.0,
            noise_seed: 0,
            terrain_offset: None,
            density_clamp: None,
            normal_mode: NormalMode::Smooth,
            backend: BackendPreference::Auto,
        }
    }
}

impl TerrainConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TerrainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| TerrainError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Loads the session configuration: the file named by `TERRAIN_CONFIG`,
    /// else `assets/config/terrain.json` when it exists, else the defaults.
    pub fn discover() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading configuration from {} ({})", path, CONFIG_ENV_VAR);
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            info!("Loading configuration from {}", default_path.display());
            return Self::load(default_path);
        }
        info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Checks every value against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(TerrainError::InvalidConfig(format!(
                "resolution must be at least 2, got {}",
                self.resolution
            )));
        }
        if !(self.bounds_size.is_finite() && self.bounds_size > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "bounds_size must be positive, got {}",
                self.bounds_size
            )));
        }
        if !(self.brush_radius.is_finite() && self.brush_radius > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "brush_radius must be positive, got {}",
                self.brush_radius
            )));
        }
        let finite = [
            ("iso_level", self.iso_level),
            ("brush_step", self.brush_step),
            ("base_height", self.base_height),
            ("noise_frequency", self.noise_frequency),
            ("noise_height_scale", self.noise_height_scale),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, value)| !value.is_finite()) {
            return Err(TerrainError::InvalidConfig(format!(
                "{name} must be finite, got {value}"
            )));
        }
        if let Some(offset) = self.terrain_offset {
            if !offset.is_finite() {
                return Err(TerrainError::InvalidConfig(format!(
                    "terrain_offset must be finite, got {offset}"
                )));
            }
        }
        if let Some([min, max]) = self.density_clamp {
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(TerrainError::InvalidConfig(format!(
                    "density_clamp must be an ordered finite range, got [{min}, {max}]"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_session() {
        let config = TerrainConfig::default();
        assert_eq!(config.resolution, 50);
        assert_eq!(config.bounds_size, 20.0);
        assert_eq!(config.iso_level, 0.5);
        assert_eq!(config.brush_step, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            TerrainConfig::from_json_str(r#"{ "resolution": 16, "backend": "cpu" }"#).unwrap();
        assert_eq!(config.resolution, 16);
        assert_eq!(config.backend, BackendPreference::Cpu);
        assert_eq!(config.brush_radius, 5.0);
        assert_eq!(config.normal_mode, NormalMode::Smooth);
    }

    #[test]
    fn rejects_degenerate_resolution() {
        let err = TerrainConfig::from_json_str(r#"{ "resolution": 1 }"#).unwrap_err();
        assert!(matches!(err, TerrainError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_clamp() {
        let config = TerrainConfig {
            density_clamp: Some([1.0, -1.0]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/config/terrain.json");
        assert_eq!(TerrainConfig::load(path).unwrap(), TerrainConfig::default());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TerrainConfig::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, TerrainError::ConfigIo { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = TerrainConfig::from_json_str("{ resolution: ").unwrap_err();
        assert!(matches!(err, TerrainError::ConfigParse(_)));
    }
}
