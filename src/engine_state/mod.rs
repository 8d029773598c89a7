//! # Engine State Module
//!
//! The per-frame terrain pipeline.
//!
//! ## Key Components
//!
//! * `TerrainEngine` - Owns the field and drives sculpt, extract and rebuild
//! * `buffer_state` - Named GPU buffer registry
//! * `extraction` - Triangulation backends and the bridge that drives them
//! * `rendering` - Mesh assembly and the render/physics boundary
//! * `voxels` - The density field, the terrain seeder and the sculpt brush
//!
//! ## Frame Sequence
//!
//! `TerrainEngine::tick` runs strictly in order: apply the brush (only with
//! an active mode and a valid point), extract the surface, assemble the mesh,
//! publish it to every sink. Nothing runs concurrently with an extraction.
//! When any step fails the frame is abandoned and the previous mesh stays
//! current.

use std::rc::Rc;

use log::{debug, error, info, warn};
use web_time::Instant;

use crate::{
    application_state::{BackendPreference, GraphicsBuilder, SculptInput, TerrainConfig},
    error::Result,
};
use extraction::{CpuBackend, ExtractionBackend, GpuBackend, SurfaceExtractionBridge};
use rendering::{Mesh, MeshAssembler, SharedMeshSink};
use voxels::{DensityField, ProceduralSeeder, SculptEditor, TerrainHeight};

pub mod buffer_state;
pub mod extraction;
pub mod rendering;
pub mod voxels;

/// Creates the extraction backend requested by `config`.
///
/// `Auto` tries the GPU first and falls back to the CPU with a warning when no
/// adapter or device is available. `Gpu` propagates the failure instead.
pub fn select_backend(config: &TerrainConfig) -> Result<Box<dyn ExtractionBackend>> {
    let gpu = || -> Result<Box<dyn ExtractionBackend>> {
        let graphics = GraphicsBuilder::new().build_blocking()?;
        Ok(Box::new(GpuBackend::from_graphics(&graphics)?))
    };

    match config.backend {
        BackendPreference::Cpu => Ok(Box::new(CpuBackend::new())),
        BackendPreference::Gpu => gpu(),
        BackendPreference::Auto => gpu().or_else(|e| {
            warn!("GPU extraction unavailable ({e}); falling back to CPU");
            Ok(Box::new(CpuBackend::new()) as Box<dyn ExtractionBackend>)
        }),
    }
}

/// The interactive terrain: one density field, one surface.
pub struct TerrainEngine {
    config: TerrainConfig,
    field: DensityField,
    height: TerrainHeight,
    offset: f64,
    editor: SculptEditor,
    bridge: SurfaceExtractionBridge,
    assembler: MeshAssembler,
    sinks: Vec<SharedMeshSink>,
    current_mesh: Rc<Mesh>,
    frame: u64,
}

impl TerrainEngine {
    /// Seeds the field and extracts the first surface.
    ///
    /// The terrain offset comes from `config.terrain_offset`, or is drawn at
    /// random once for the whole session.
    pub fn new(config: TerrainConfig, backend: Box<dyn ExtractionBackend>) -> Result<Self> {
        config.validate()?;

        let offset = config
            .terrain_offset
            .unwrap_or_else(ProceduralSeeder::random_offset);
        let height = TerrainHeight::new(
            config.noise_seed,
            config.noise_frequency,
            config.noise_height_scale,
            config.base_height,
        );

        let mut field = DensityField::allocate(config.resolution, config.bounds_size)?;
        ProceduralSeeder::seed(&mut field, &height, offset);

        let mut engine = Self {
            editor: SculptEditor::new(config.brush_step).with_clamp(config.density_clamp),
            assembler: MeshAssembler::new(config.normal_mode),
            bridge: SurfaceExtractionBridge::new(backend),
            config,
            field,
            height,
            offset,
            sinks: Vec::new(),
            current_mesh: Rc::new(Mesh::default()),
            frame: 0,
        };

        let mesh = engine.rebuild()?;
        engine.current_mesh = mesh;
        info!(
            "Terrain ready: {} triangles from {}³ field",
            engine.current_mesh.triangle_count(),
            engine.config.resolution
        );
        Ok(engine)
    }

    /// Attaches a mesh consumer and hands it the current mesh.
    pub fn attach_sink(&mut self, sink: SharedMeshSink) {
        sink.borrow_mut().update_mesh(self.current_mesh.clone());
        self.sinks.push(sink);
    }

    /// Runs one frame: sculpt if requested, then rebuild and publish.
    ///
    /// # Errors
    ///
    /// Any extraction failure. Nothing is published and `current_mesh` keeps
    /// the last good surface.
    pub fn tick(&mut self, input: &SculptInput) -> Result<Rc<Mesh>> {
        let start = Instant::now();
        self.frame += 1;

        if let Some((point, erase)) = input.edit() {
            self.editor
                .apply(&mut self.field, point, self.config.brush_radius, erase);
        }

        let mesh = match self.rebuild() {
            Ok(mesh) => mesh,
            Err(e) => {
                error!("Frame {} abandoned: {}", self.frame, e);
                return Err(e);
            }
        };
        self.publish(mesh.clone());

        debug!(
            "Frame {}: {} triangles in {:?}",
            self.frame,
            mesh.triangle_count(),
            start.elapsed()
        );
        Ok(mesh)
    }

    /// Reallocates the field at a new size, reseeds it with the session
    /// offset and publishes the new surface. Previous sculpt edits are lost.
    pub fn resize(&mut self, resolution: u32, bounds_size: f32) -> Result<Rc<Mesh>> {
        let mut config = self.config.clone();
        config.resolution = resolution;
        config.bounds_size = bounds_size;
        config.validate()?;

        let mut field = DensityField::allocate(resolution, bounds_size)?;
        ProceduralSeeder::seed(&mut field, &self.height, self.offset);
        info!(
            "Resized field {}³ -> {}³ (bounds {})",
            self.config.resolution, resolution, bounds_size
        );
        self.field = field;
        self.config = config;

        let mesh = self.rebuild().inspect_err(|e| {
            error!("Rebuild after resize failed: {}", e);
        })?;
        self.publish(mesh.clone());
        Ok(mesh)
    }

    /// The last successfully built mesh.
    pub fn current_mesh(&self) -> Rc<Mesh> {
        self.current_mesh.clone()
    }

    pub fn field(&self) -> &DensityField {
        &self.field
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Terrain offset used for seeding this session.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn backend_name(&self) -> &'static str {
        self.bridge.backend_name()
    }

    /// Number of ticks run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn rebuild(&mut self) -> Result<Rc<Mesh>> {
        let triangles = self.bridge.extract(&self.field, self.config.iso_level)?;
        Ok(Rc::new(self.assembler.build(&triangles)))
    }

    fn publish(&mut self, mesh: Rc<Mesh>) {
        self.current_mesh = mesh.clone();
        for sink in &self.sinks {
            sink.borrow_mut().update_mesh(mesh.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use cgmath::Point3;

    use super::*;
    use crate::{
        application_state::BrushMode,
        engine_state::{
            extraction::{BufferLayout, Triangle},
            rendering::LatestMesh,
            voxels::DensityPoint,
        },
        error::TerrainError,
    };

    fn small_config() -> TerrainConfig {
        TerrainConfig {
            resolution: 12,
            bounds_size: 11.0,
            base_height: 4.0,
            noise_height_scale: 0.0,
            terrain_offset: Some(0.0),
            backend: BackendPreference::Cpu,
            ..Default::default()
        }
    }

    fn cpu_engine(config: TerrainConfig) -> TerrainEngine {
        TerrainEngine::new(config, Box::new(CpuBackend::new())).unwrap()
    }

    #[test]
    fn sinks_receive_the_same_mesh() {
        let mut engine = cpu_engine(small_config());
        let renderer = Rc::new(RefCell::new(LatestMesh::default()));
        let collider = Rc::new(RefCell::new(LatestMesh::default()));
        engine.attach_sink(renderer.clone());
        engine.attach_sink(collider.clone());

        let mesh = engine.tick(&SculptInput::idle()).unwrap();
        let rendered = renderer.borrow().mesh.clone().unwrap();
        let collided = collider.borrow().mesh.clone().unwrap();
        assert!(Rc::ptr_eq(&rendered, &mesh));
        assert!(Rc::ptr_eq(&collided, &mesh));
        assert_eq!(renderer.borrow().updates, 2);
    }

    #[test]
    fn idle_tick_leaves_field_unchanged() {
        let mut engine = cpu_engine(small_config());
        let before: Vec<f32> = engine.field().points().iter().map(|p| p.density).collect();
        engine.tick(&SculptInput::idle()).unwrap();
        engine
            .tick(&SculptInput {
                world_point: None,
                mode: BrushMode::Build,
            })
            .unwrap();
        let after: Vec<f32> = engine.field().points().iter().map(|p| p.density).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn build_raises_the_surface() {
        let mut engine = cpu_engine(small_config());
        let top_before = engine.current_mesh().bounds.max.y;
        let mesh = engine
            .tick(&SculptInput::build(Point3::new(5.0, 4.5, 5.0)))
            .unwrap();
        assert!(mesh.bounds.max.y > top_before);
    }

    #[test]
    fn resize_reseeds_with_session_offset() {
        let mut engine = cpu_engine(small_config());
        let mesh = engine.resize(6, 11.0).unwrap();
        assert_eq!(engine.field().resolution(), 6);
        assert_eq!(engine.offset(), 0.0);
        assert!(!mesh.is_empty());
        assert!(engine.resize(1, 11.0).is_err());
        assert_eq!(engine.field().resolution(), 6);
    }

    /// Fails every dispatch after the first allocation.
    struct FailingBackend {
        inner: CpuBackend,
        dispatches: usize,
    }

    impl ExtractionBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
            self.inner.allocate(layout)
        }
        fn release(&mut self) {
            self.inner.release()
        }
        fn allocated_layout(&self) -> Option<BufferLayout> {
            self.inner.allocated_layout()
        }
        fn reset_counter(&mut self) -> Result<()> {
            self.inner.reset_counter()
        }
        fn upload_points(&mut self, points: &[DensityPoint]) -> Result<()> {
            self.inner.upload_points(points)
        }
        fn dispatch(&mut self, workgroups: [u32; 3], iso_level: f32) -> Result<()> {
            self.dispatches += 1;
            if self.dispatches > 1 {
                return Err(TerrainError::GpuAllocation {
                    name: "triangles",
                    message: "out of memory".into(),
                });
            }
            self.inner.dispatch(workgroups, iso_level)
        }
        fn read_triangle_count(&mut self) -> Result<u32> {
            self.inner.read_triangle_count()
        }
        fn read_triangles(&mut self, count: u32) -> Result<Vec<Triangle>> {
            self.inner.read_triangles(count)
        }
    }

    #[test]
    fn failed_frame_keeps_previous_mesh() {
        let mut engine = TerrainEngine::new(
            small_config(),
            Box::new(FailingBackend {
                inner: CpuBackend::new(),
                dispatches: 0,
            }),
        )
        .unwrap();
        let sink = Rc::new(RefCell::new(LatestMesh::default()));
        engine.attach_sink(sink.clone());
        let before = engine.current_mesh();

        assert!(engine.tick(&SculptInput::idle()).is_err());
        assert!(Rc::ptr_eq(&engine.current_mesh(), &before));
        assert_eq!(sink.borrow().updates, 1);
    }
}
