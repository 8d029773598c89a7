//! Render and physics boundary.
//!
//! The engine does not draw anything itself. Each rebuilt mesh is published
//! to every attached `MeshSink` (typically a renderer and a collider) as the
//! same shared `Rc<Mesh>`, so both always see the identical surface.

use std::{cell::RefCell, rc::Rc};

pub mod mesh;
mod vertex;

pub use mesh::{Aabb, Mesh, MeshAssembler};
pub use vertex::Vertex;

/// Consumer of rebuilt terrain meshes.
pub trait MeshSink {
    /// Called once per successful extraction with the new mesh. The previous
    /// mesh is fully replaced.
    fn update_mesh(&mut self, mesh: Rc<Mesh>);
}

/// A sink shared between the engine and its owner.
pub type SharedMeshSink = Rc<RefCell<dyn MeshSink>>;

/// Keeps the latest published mesh. Useful as a collider stand-in and in tests.
#[derive(Debug, Default)]
pub struct LatestMesh {
    pub mesh: Option<Rc<Mesh>>,
    pub updates: usize,
}

impl MeshSink for LatestMesh {
    fn update_mesh(&mut self, mesh: Rc<Mesh>) {
        self.mesh = Some(mesh);
        self.updates += 1;
    }
}
