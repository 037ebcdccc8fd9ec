//! Height, normal and ray queries against the terrain surface.
//!
//! Cells are split along the top-left to bottom-right diagonal, the same
//! split the mesh builder uses, so queried heights lie exactly on the
//! rendered surface.

use godot::prelude::*;

use crate::heightfield::Heightfield;
use crate::mesh_builder::{BatchKind, GeometryBatch};

/// Result of an exact surface query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSample {
    pub height: f32,
    /// Unit upward normal of the triangle hit, `None` when no triangle matched
    pub normal: Option<Vector3>,
}

impl SurfaceSample {
    pub const MISS: SurfaceSample = SurfaceSample {
        height: 0.0,
        normal: None,
    };
}

/// A half-line in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

impl Ray {
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f32) -> Vector3 {
        self.origin + self.direction * t
    }
}

/// Normalize, leaving near-zero vectors untouched.
pub(crate) fn normalize_or_zero(v: Vector3) -> Vector3 {
    let len = v.length();
    if len > 1e-6 {
        v / len
    } else {
        v
    }
}

/// Exact height and normal at a terrain-local position (displacement removed).
///
/// Positions outside the grid return the height at the nearest border.
pub fn exact_height_local(store: &Heightfield, local_x: f32, local_z: f32) -> SurfaceSample {
    let grid = store.grid();
    if store.is_empty() || grid.cell_size <= 0 {
        return SurfaceSample::MISS;
    }

    let size = grid.cell_size as f32;
    let x = local_x.clamp(0.0, (grid.cell_count_x - 1).max(0) as f32 * size);
    let z = local_z.clamp(0.0, (grid.cell_count_y - 1).max(0) as f32 * size);
    let cx = ((x / size) as i32).clamp(0, (grid.cell_count_x - 2).max(0));
    let cy = ((z / size) as i32).clamp(0, (grid.cell_count_y - 2).max(0));

    let top_left = store.local_position(cx, cy);
    let top_right = store.local_position(cx + 1, cy);
    let bottom_left = store.local_position(cx, cy + 1);
    let bottom_right = store.local_position(cx + 1, cy + 1);

    let upper = [top_left, bottom_right, top_right];
    let lower = [top_left, bottom_left, bottom_right];
    let tolerance = size * size * 1e-5;

    if let Some(sample) = vertical_intersection(&upper, x, z) {
        if inside_xz(&upper, x, z, tolerance) {
            return sample;
        }
    }
    vertical_intersection(&lower, x, z).unwrap_or(SurfaceSample::MISS)
}

/// Exact height and normal at a world-space XZ position.
pub fn exact_height_at(store: &Heightfield, world_x: f32, world_z: f32) -> SurfaceSample {
    let d = store.grid().displacement;
    exact_height_local(store, world_x - d.x, world_z - d.z)
}

fn vertical_intersection(tri: &[Vector3; 3], x: f32, z: f32) -> Option<SurfaceSample> {
    let [a, b, c] = *tri;
    let n = (b - a).cross(c - a);
    if n.y.abs() < 1e-6 {
        return None;
    }
    let height = a.y - (n.x * (x - a.x) + n.z * (z - a.z)) / n.y;
    let up = if n.y < 0.0 { -n } else { n };
    Some(SurfaceSample {
        height,
        normal: Some(normalize_or_zero(up)),
    })
}

fn inside_xz(tri: &[Vector3; 3], x: f32, z: f32, tolerance: f32) -> bool {
    let edge = |p: Vector3, q: Vector3| (q.x - p.x) * (z - p.z) - (q.z - p.z) * (x - p.x);
    let d = [edge(tri[0], tri[1]), edge(tri[1], tri[2]), edge(tri[2], tri[0])];
    let has_neg = d.iter().any(|&v| v < -tolerance);
    let has_pos = d.iter().any(|&v| v > tolerance);
    !(has_neg && has_pos)
}

/// Entry distance of `ray` into `aabb`, or `None` if missed.
pub fn ray_aabb(ray: &Ray, aabb: &Aabb) -> Option<f32> {
    let min = aabb.position;
    let max = aabb.position + aabb.size;
    let mut t_near = 0.0f32;
    let mut t_far = f32::MAX;

    for (o, d, lo, hi) in [
        (ray.origin.x, ray.direction.x, min.x, max.x),
        (ray.origin.y, ray.direction.y, min.y, max.y),
        (ray.origin.z, ray.direction.z, min.z, max.z),
    ] {
        if d.abs() < 1e-12 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    Some(t_near)
}

/// Two-sided ray/triangle distance (Moller-Trumbore).
pub fn ray_triangle(ray: &Ray, tri: &[Vector3; 3]) -> Option<f32> {
    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < 1e-9 {
        return None;
    }
    let inv = 1.0 / det;
    let s = ray.origin - tri[0];
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv;
    (t >= 0.0).then_some(t)
}

/// Triangle soup of a tile's terrain surface, built on first pick.
#[derive(Clone, Debug, Default)]
pub struct CollisionProxy {
    pub triangles: Vec<[Vector3; 3]>,
}

impl CollisionProxy {
    /// Collect the terrain triangles of `batches`; grass is not pickable.
    pub fn from_batches(batches: &[GeometryBatch]) -> Self {
        let triangles = batches
            .iter()
            .filter(|b| b.key.kind == BatchKind::Terrain)
            .flat_map(|b| {
                b.indices.chunks_exact(3).map(move |tri| {
                    [
                        b.vertices[tri[0] as usize].position,
                        b.vertices[tri[1] as usize].position,
                        b.vertices[tri[2] as usize].position,
                    ]
                })
            })
            .collect();
        Self { triangles }
    }

    /// Nearest hit distance along `ray`.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        self.triangles
            .iter()
            .filter_map(|tri| ray_triangle(ray, tri))
            .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))))
    }
}
