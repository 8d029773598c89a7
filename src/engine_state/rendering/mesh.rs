//! # Mesh Assembly
//!
//! Turns the extracted triangle list into a renderable and collidable mesh.
//! Triangle `i` becomes vertices `3i`, `3i+1`, `3i+2` with a sequential index
//! list; nothing is welded or deduplicated. Bounds, normals and tangents are
//! derived afterwards from the positions alone.
//!
//! ## Normals
//!
//! In smooth mode every vertex gets the normalised sum of the (area-weighted)
//! face normals of all triangles that have a vertex at the same position.
//! Positions are compared after quantising to `POSITION_EPSILON`. In flat
//! mode each vertex keeps its own triangle's normal.
//!
//! ## Tangents
//!
//! Texture space is the planar `(x, z)` projection. Tangents are accumulated
//! the same way normals are, orthogonalised against the normal, and carry the
//! bitangent sign in `w`.

use std::collections::HashMap;

use cgmath::{InnerSpace, Point3, Vector3, Zero};

use super::vertex::Vertex;
use crate::{application_state::NormalMode, engine_state::extraction::Triangle};

/// Positions closer than this are treated as the same vertex when smoothing.
pub const POSITION_EPSILON: f32 = 1e-4;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for Aabb {
    /// The degenerate box at the origin, used for empty meshes.
    fn default() -> Self {
        Self {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(0.0, 0.0, 0.0),
        }
    }
}

impl Aabb {
    /// Smallest box containing every position, or the default box when
    /// `positions` is empty.
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        let Some(first) = positions.first() else {
            return Self::default();
        };
        let mut min = Point3::new(first[0], first[1], first[2]);
        let mut max = min;
        for p in &positions[1..] {
            min.x = min.x.min(p[0]);
            min.y = min.y.min(p[1]);
            min.z = min.z.min(p[2]);
            max.x = max.x.max(p[0]);
            max.y = max.y.max(p[1]);
            max.z = max.z.max(p[2]);
        }
        Self { min, max }
    }

    /// Whether `point` lies inside the box, widened by `tolerance`.
    pub fn contains(&self, point: Point3<f32>, tolerance: f32) -> bool {
        point.x >= self.min.x - tolerance
            && point.y >= self.min.y - tolerance
            && point.z >= self.min.z - tolerance
            && point.x <= self.max.x + tolerance
            && point.y <= self.max.y + tolerance
            && point.z <= self.max.z + tolerance
    }
}

/// A fully rebuilt terrain surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Three unshared positions per triangle
    pub positions: Vec<[f32; 3]>,
    /// `0..positions.len()` in order
    pub indices: Vec<u32>,
    /// Unit normal per vertex
    pub normals: Vec<[f32; 3]>,
    /// Unit tangent per vertex, bitangent sign in `w`
    pub tangents: Vec<[f32; 4]>,
    /// Bounds of all positions
    pub bounds: Aabb,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Interleaves positions, normals and tangents for a vertex buffer laid
    /// out as `Vertex::desc()`.
    pub fn interleaved_vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.tangents)
            .map(|((&position, &normal), &tangent)| Vertex {
                position,
                normal,
                tangent,
            })
            .collect()
    }
}

/// Builds meshes from triangle lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshAssembler {
    pub normal_mode: NormalMode,
}

type PositionKey = [i64; 3];

fn position_key(p: [f32; 3]) -> PositionKey {
    let q = |v: f32| (v / POSITION_EPSILON).round() as i64;
    [q(p[0]), q(p[1]), q(p[2])]
}

fn vector(p: [f32; 3]) -> Vector3<f32> {
    Vector3::new(p[0], p[1], p[2])
}

/// Any unit vector perpendicular to `n`.
fn orthogonal(n: Vector3<f32>) -> Vector3<f32> {
    let axis = if n.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_z()
    };
    (axis - n * n.dot(axis)).normalize()
}

/// Unnormalised tangent and bitangent of a triangle under the `(x, z)`
/// texture projection. Zero when the projection is degenerate.
fn face_tangent_frame(triangle: &Triangle) -> (Vector3<f32>, Vector3<f32>) {
    let (a, b, c) = (vector(triangle.a), vector(triangle.b), vector(triangle.c));
    let e1 = b - a;
    let e2 = c - a;
    let (du1, dv1) = (e1.x, e1.z);
    let (du2, dv2) = (e2.x, e2.z);
    let det = du1 * dv2 - du2 * dv1;
    if det.abs() <= f32::EPSILON {
        return (Vector3::zero(), Vector3::zero());
    }
    let r = 1.0 / det;
    ((e1 * dv2 - e2 * dv1) * r, (e2 * du1 - e1 * du2) * r)
}

impl MeshAssembler {
    pub fn new(normal_mode: NormalMode) -> Self {
        Self { normal_mode }
    }

    /// Builds a mesh with three vertices per triangle and derived
    /// bounds, normals and tangents.
    pub fn build(&self, triangles: &[Triangle]) -> Mesh {
        let vertex_count = triangles.len() * 3;
        let mut positions = Vec::with_capacity(vertex_count);
        for triangle in triangles {
            positions.extend_from_slice(&[triangle.a, triangle.b, triangle.c]);
        }
        let indices = (0..vertex_count as u32).collect();
        let bounds = Aabb::from_positions(&positions);

        let face_normals: Vec<Vector3<f32>> =
            triangles.iter().map(|t| vector(t.normal())).collect();
        let face_frames: Vec<_> = triangles.iter().map(face_tangent_frame).collect();

        let (vertex_normals, vertex_frames) = match self.normal_mode {
            NormalMode::Flat => {
                let normals: Vec<Vector3<f32>> =
                    face_normals.iter().flat_map(|&n| [n; 3]).collect();
                let frames: Vec<(Vector3<f32>, Vector3<f32>)> =
                    face_frames.iter().flat_map(|&f| [f; 3]).collect();
                (normals, frames)
            }
            NormalMode::Smooth => Self::smooth(&positions, &face_normals, &face_frames),
        };

        let mut normals = Vec::with_capacity(vertex_count);
        let mut tangents = Vec::with_capacity(vertex_count);
        for (i, (summed_normal, (tangent, bitangent))) in
            vertex_normals.iter().zip(&vertex_frames).enumerate()
        {
            let n = Self::unit_normal(*summed_normal, face_normals[i / 3]);
            let t = *tangent - n * n.dot(*tangent);
            let (t, w) = if t.magnitude2() > f32::EPSILON {
                let t = t.normalize();
                let w = if n.cross(t).dot(*bitangent) < 0.0 {
                    -1.0
                } else {
                    1.0
                };
                (t, w)
            } else {
                (orthogonal(n), 1.0)
            };
            normals.push([n.x, n.y, n.z]);
            tangents.push([t.x, t.y, t.z, w]);
        }

        Mesh {
            positions,
            indices,
            normals,
            tangents,
            bounds,
        }
    }

    /// Sums face normals and tangent frames over every vertex sharing a
    /// quantised position.
    #[allow(clippy::type_complexity)]
    fn smooth(
        positions: &[[f32; 3]],
        face_normals: &[Vector3<f32>],
        face_frames: &[(Vector3<f32>, Vector3<f32>)],
    ) -> (Vec<Vector3<f32>>, Vec<(Vector3<f32>, Vector3<f32>)>) {
        let mut sums: HashMap<PositionKey, (Vector3<f32>, Vector3<f32>, Vector3<f32>)> =
            HashMap::with_capacity(positions.len() / 2);

        for (i, &p) in positions.iter().enumerate() {
            let face = i / 3;
            let entry = sums
                .entry(position_key(p))
                .or_insert((Vector3::zero(), Vector3::zero(), Vector3::zero()));
            entry.0 += face_normals[face];
            entry.1 += face_frames[face].0;
            entry.2 += face_frames[face].1;
        }

        positions
            .iter()
            .map(|&p| {
                let (n, t, b) = sums[&position_key(p)];
                (n, (t, b))
            })
            .unzip()
    }

    /// Normalises `summed`, falling back to the face normal and then to +y
    /// for degenerate input.
    fn unit_normal(summed: Vector3<f32>, face: Vector3<f32>) -> Vector3<f32> {
        if summed.magnitude2() > f32::EPSILON * f32::EPSILON {
            summed.normalize()
        } else if face.magnitude2() > f32::EPSILON * f32::EPSILON {
            face.normalize()
        } else {
            Vector3::unit_y()
        }
    }
}
