//! End-to-end extraction on the host backend.

use std::collections::HashMap;

use cgmath::Point3;
use marching_terrain::{
    application_state::{BackendPreference, NormalMode, SculptInput, TerrainConfig},
    engine_state::{
        extraction::{BufferLayout, CpuBackend, SurfaceExtractionBridge, Triangle},
        rendering::MeshAssembler,
        voxels::{DensityField, ProceduralSeeder, TerrainHeight},
        TerrainEngine,
    },
};

fn cpu_bridge() -> SurfaceExtractionBridge {
    SurfaceExtractionBridge::new(Box::new(CpuBackend::new()))
}

/// A single cell whose densities come from `density(x, y, z)` over {0,1}³.
fn single_cell(density: impl Fn(u32, u32, u32) -> f32) -> DensityField {
    let mut field = DensityField::allocate(2, 1.0).unwrap();
    for index in 0..field.len() {
        let c = field.grid_coords(index);
        field.points_mut()[index].density = density(c.x, c.y, c.z);
    }
    field
}

fn flat_config(base_height: f32, iso_level: f32) -> TerrainConfig {
    TerrainConfig {
        resolution: 11,
        bounds_size: 20.0,
        iso_level,
        base_height,
        noise_height_scale: 0.0,
        terrain_offset: Some(0.0),
        backend: BackendPreference::Cpu,
        ..Default::default()
    }
}

#[test]
fn half_below_cell_produces_bounded_surface() {
    let splits: [fn(u32, u32, u32) -> u32; 3] = [|x, _, _| x, |_, y, _| y, |_, _, z| z];
    for split in splits {
        let field = single_cell(|x, y, z| split(x, y, z) as f32);
        let triangles = cpu_bridge().extract(&field, 0.5).unwrap();
        assert!(
            (1..=5).contains(&triangles.len()),
            "got {} triangles",
            triangles.len()
        );
    }
}

#[test]
fn uniform_cells_produce_nothing() {
    let below = single_cell(|_, _, _| 0.0);
    let above = single_cell(|_, _, _| 1.0);
    let mut bridge = cpu_bridge();
    assert!(bridge.extract(&below, 0.5).unwrap().is_empty());
    assert!(bridge.extract(&above, 0.5).unwrap().is_empty());
}

#[test]
fn flat_terrain_at_zero_iso_sits_at_base_height() {
    let engine = TerrainEngine::new(flat_config(5.0, 0.0), Box::new(CpuBackend::new())).unwrap();
    let mesh = engine.current_mesh();

    // Ten cells per axis, two triangles each.
    assert_eq!(mesh.triangle_count(), 200);
    for position in &mesh.positions {
        assert!((position[1] - 5.0).abs() < 1e-4, "y = {}", position[1]);
    }
    for normal in &mesh.normals {
        assert!((normal[1] - 1.0).abs() < 1e-5);
    }
}

#[test]
fn flat_terrain_at_default_iso_is_offset_by_iso_level() {
    let engine = TerrainEngine::new(flat_config(5.0, 0.5), Box::new(CpuBackend::new())).unwrap();
    for position in &engine.current_mesh().positions {
        assert!((position[1] - 5.5).abs() < 1e-4, "y = {}", position[1]);
    }
}

#[test]
fn flat_normals_match_in_both_modes() {
    for normal_mode in [NormalMode::Smooth, NormalMode::Flat] {
        let config = TerrainConfig {
            normal_mode,
            ..flat_config(3.0, 0.5)
        };
        let engine = TerrainEngine::new(config, Box::new(CpuBackend::new())).unwrap();
        let mesh = engine.current_mesh();
        assert!(!mesh.is_empty());
        assert!(mesh.normals.iter().all(|n| (n[1] - 1.0).abs() < 1e-5));
        assert_eq!(mesh.indices.len(), mesh.positions.len());
    }
}

#[test]
fn extraction_is_idempotent() {
    let mut field = DensityField::allocate(16, 20.0).unwrap();
    ProceduralSeeder::seed(&mut field, &TerrainHeight::new(1, 2.0, 5.0, 5.0), 123.0);

    let mut bridge = cpu_bridge();
    let first = bridge.extract(&field, 0.5).unwrap();
    let second = bridge.extract(&field, 0.5).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn resolution_changes_never_leak_stale_triangles() {
    let height = TerrainHeight::new(4, 2.0, 5.0, 5.0);
    let mut bridge = cpu_bridge();

    for resolution in [10, 4, 17, 2, 9, 9] {
        let mut field = DensityField::allocate(resolution, 20.0).unwrap();
        ProceduralSeeder::seed(&mut field, &height, 42.0);

        let triangles = bridge.extract(&field, 0.5).unwrap();
        let fresh = cpu_bridge().extract(&field, 0.5).unwrap();
        assert_eq!(triangles, fresh, "resolution {resolution}");
        assert_eq!(
            bridge.allocated_layout(),
            Some(BufferLayout::for_resolution(resolution).unwrap())
        );
        let capacity = BufferLayout::for_resolution(resolution).unwrap().max_triangles;
        assert!(triangles.len() as u32 <= capacity);
        assert_vertices_inside(&triangles, 20.0);
    }
}

fn assert_vertices_inside(triangles: &[Triangle], bounds_size: f32) {
    for triangle in triangles {
        for i in 0..3 {
            for coord in triangle.vertex(i) {
                assert!(coord.is_finite());
                assert!((-1e-4..=bounds_size + 1e-4).contains(&coord));
            }
        }
    }
}

#[test]
fn sculpting_session_changes_and_restores_surface() {
    let config = TerrainConfig {
        resolution: 21,
        ..flat_config(5.0, 0.5)
    };
    let mut engine = TerrainEngine::new(config, Box::new(CpuBackend::new())).unwrap();
    let original = engine.current_mesh();
    let center = Point3::new(10.0, 5.5, 10.0);

    let built = engine.tick(&SculptInput::build(center)).unwrap();
    assert!(built.bounds.max.y > original.bounds.max.y);

    let restored = engine.tick(&SculptInput::erase(center)).unwrap();
    assert_eq!(restored.triangle_count(), original.triangle_count());
    for (a, b) in restored.positions.iter().zip(&original.positions) {
        for axis in 0..3 {
            assert!((a[axis] - b[axis]).abs() < 1e-4);
        }
    }
}

#[test]
fn mesh_matches_triangle_list() {
    let mut field = DensityField::allocate(8, 10.0).unwrap();
    ProceduralSeeder::seed(&mut field, &TerrainHeight::new(9, 3.0, 4.0, 3.0), 7.25);
    let triangles = cpu_bridge().extract(&field, 0.5).unwrap();
    let mesh = MeshAssembler::default().build(&triangles);

    assert_eq!(mesh.vertex_count(), triangles.len() * 3);
    for (i, triangle) in triangles.iter().enumerate() {
        assert_eq!(mesh.positions[3 * i], triangle.a);
        assert_eq!(mesh.positions[3 * i + 1], triangle.b);
        assert_eq!(mesh.positions[3 * i + 2], triangle.c);
        assert_eq!(mesh.indices[3 * i + 2], (3 * i + 2) as u32);
    }
    for position in &mesh.positions {
        assert!(mesh
            .bounds
            .contains(Point3::new(position[0], position[1], position[2]), 0.0));
    }
}

#[test]
fn shared_edges_yield_identical_vertices_and_normals() {
    let mut field = DensityField::allocate(30, 20.0).unwrap();
    ProceduralSeeder::seed(&mut field, &TerrainHeight::new(5, 2.0, 6.0, 6.0), 517.3);
    let triangles = cpu_bridge().extract(&field, 0.5).unwrap();
    let mesh = MeshAssembler::default().build(&triangles);
    assert!(!mesh.is_empty());

    let key = |p: [f32; 3]| p.map(|v| (v * 1e4).round() as i64);
    let mut groups: HashMap<[i64; 3], ([f32; 3], [f32; 3])> = HashMap::new();
    for (position, normal) in mesh.positions.iter().zip(&mesh.normals) {
        let (first_position, first_normal) =
            *groups.entry(key(*position)).or_insert((*position, *normal));
        assert_eq!(first_position, *position);
        assert_eq!(first_normal, *normal);
    }
    assert!(groups.len() < mesh.vertex_count());
}
