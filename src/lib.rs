#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Marching Terrain
//!
//! Interactive terrain built from a dense scalar density field and surfaced
//! with GPU marching cubes.
//!
//! ## Key Modules
//!
//! * `application_state` - Configuration, pointer input and the GPU context
//! * `core` - Shared single-threaded handles
//! * `engine_state` - The field, the extraction pipeline and mesh assembly
//! * `error` - The crate error type
//!
//! ## Pipeline
//!
//! The field is seeded once from Perlin-noise heights. Each frame the brush
//! optionally edits it, the whole field is uploaded to the triangulation
//! backend, the variable-length triangle list is read back, and a fresh mesh
//! is published to every attached sink.
//!
//! ## Usage
//!
//! ```no_run
//! use cgmath::Point3;
//! use marching_terrain::{
//!     application_state::{SculptInput, TerrainConfig},
//!     engine_state::{select_backend, TerrainEngine},
//! };
//!
//! let config = TerrainConfig::default();
//! let backend = select_backend(&config)?;
//! let mut engine = TerrainEngine::new(config, backend)?;
//!
//! let mesh = engine.tick(&SculptInput::build(Point3::new(10.0, 7.5, 10.0)))?;
//! println!("{} triangles", mesh.triangle_count());
//! # Ok::<(), marching_terrain::TerrainError>(())
//! ```

use std::{cell::RefCell, rc::Rc};

use cgmath::Point3;
use log::info;
use winit::event::{ElementState, MouseButton};

use application_state::{InputManager, TerrainConfig};
use engine_state::{
    rendering::{Mesh, MeshSink},
    select_backend, TerrainEngine,
};

pub mod application_state;
pub mod core;
pub mod engine_state;
pub mod error;

pub use error::{Result, TerrainError};

/// Frames the scripted session holds each brush button for.
const SCRIPTED_STROKE_FRAMES: u32 = 5;

/// Logs statistics for every mesh it receives.
#[derive(Default)]
struct MeshStatsLogger {
    received: u64,
}

impl MeshSink for MeshStatsLogger {
    fn update_mesh(&mut self, mesh: Rc<Mesh>) {
        self.received += 1;
        info!(
            "Mesh #{}: {} triangles, bounds ({:.2}, {:.2}, {:.2}) - ({:.2}, {:.2}, {:.2})",
            self.received,
            mesh.triangle_count(),
            mesh.bounds.min.x,
            mesh.bounds.min.y,
            mesh.bounds.min.z,
            mesh.bounds.max.x,
            mesh.bounds.max.y,
            mesh.bounds.max.z,
        );
    }
}

/// Surface vertex closest to the vertical centre line of the field, standing
/// in for a pointer ray cast.
fn center_surface_point(mesh: &Mesh, bounds_size: f32) -> Option<Point3<f32>> {
    let c = bounds_size * 0.5;
    mesh.positions
        .iter()
        .min_by(|a, b| {
            let da = (a[0] - c).powi(2) + (a[2] - c).powi(2);
            let db = (b[0] - c).powi(2) + (b[2] - c).powi(2);
            da.total_cmp(&db)
        })
        .map(|p| Point3::new(p[0], p[1], p[2]))
}

/// Runs a headless sculpting session: seeds the terrain, holds the build
/// button, then the erase button, over the centre of the field and logs each
/// rebuilt mesh.
pub fn run() -> Result<()> {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = TerrainConfig::discover()?;
    let bounds_size = config.bounds_size;
    let backend = select_backend(&config)?;
    let mut engine = TerrainEngine::new(config, backend)?;
    info!(
        "Session offset {:.3}, extraction on {}",
        engine.offset(),
        engine.backend_name()
    );

    engine.attach_sink(Rc::new(RefCell::new(MeshStatsLogger::default())));

    let mut input_manager = InputManager::new();
    for (button, label) in [(MouseButton::Left, "build"), (MouseButton::Right, "erase")] {
        info!("Holding {} for {} frames", label, SCRIPTED_STROKE_FRAMES);
        input_manager.intake_mouse_button(button, ElementState::Pressed);
        for _ in 0..SCRIPTED_STROKE_FRAMES {
            let hit = center_surface_point(&engine.current_mesh(), bounds_size);
            input_manager.intake_hit_point(hit);
            engine.tick(&input_manager.take_frame_input())?;
        }
        input_manager.intake_mouse_button(button, ElementState::Released);
    }

    engine.tick(&input_manager.take_frame_input())?;
    info!("Session finished after {} frames", engine.frame());
    Ok(())
}
