//! Pixy Heightfield: embedded object scattering
//!
//! Places copies of a template (tree, rock, prop) over the terrain surface.
//! Each copy gets a random Y rotation, sits slightly sunk into the ground and
//! is owned by the tile that covers it.

use godot::prelude::*;
use rand::Rng;

use crate::heightfield::Heightfield;
use crate::query::exact_height_local;

/// Fraction of the template height an object is sunk into the ground.
const SINK_FACTOR: f32 = 0.025;
/// Coverage below which a distribution places nothing.
const MIN_COVERAGE: f32 = 0.001;

/// A decorative object parented to a terrain tile.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedObject {
    pub id: u64,
    /// Template the object was created from
    pub template: String,
    /// World position
    pub position: Vector3,
    /// Y rotation in degrees
    pub rotation_y: f32,
}

/// Source object for scattering.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterTemplate {
    pub name: String,
    /// Local bounding box of the template mesh
    pub bounds: Aabb,
}

impl ScatterTemplate {
    pub fn new(name: impl Into<String>, bounds: Aabb) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }

    /// Ground footprint (width, depth), each at least 1.
    pub fn footprint(&self) -> (f32, f32) {
        (self.bounds.size.x.max(1.0), self.bounds.size.z.max(1.0))
    }

    pub fn height(&self) -> f32 {
        self.bounds.size.y
    }
}

/// Request to scatter one template over the terrain.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeDistribution {
    pub template: ScatterTemplate,
    /// Fraction of the terrain to cover, 0..1
    pub coverage: f32,
}

/// Scene graph side of embedded objects. Every method defaults to a no-op.
pub trait SceneHost {
    fn object_added(&mut self, _object: &EmbeddedObject, _tile: Vector2i) {}

    fn object_moved(&mut self, _id: u64, _position: Vector3) {}

    fn object_reparented(&mut self, _id: u64, _from: Vector2i, _to: Vector2i) {}

    fn object_removed(&mut self, _id: u64) {}
}

/// Scene host that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedScene;

impl SceneHost for DetachedScene {}

/// A placement computed by `scatter_placements`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// World position
    pub position: Vector3,
    pub rotation_y: f32,
}

/// Random placements for `template` covering `coverage` of the terrain,
/// capped at `max_count`.
pub fn scatter_placements<R: Rng + ?Sized>(
    store: &Heightfield,
    template: &ScatterTemplate,
    coverage: f32,
    max_count: usize,
    rng: &mut R,
) -> Vec<Placement> {
    let grid = store.grid();
    let side = grid.side_length as f32;
    let range = side - grid.cell_size as f32;
    if coverage < MIN_COVERAGE || range <= 0.0 || store.is_empty() {
        return Vec::new();
    }

    let (width, depth) = template.footprint();
    let wanted = ((side * side) / (width * depth) * coverage).max(0.0) as usize;
    let sink = template.height() * SINK_FACTOR;

    (0..wanted.min(max_count))
        .map(|_| {
            let rotation_y = rng.random::<f32>() * 360.0;
            let x = rng.random::<f32>() * range;
            let z = rng.random::<f32>() * range;
            let height = exact_height_local(store, x, z).height - sink;
            Placement {
                position: grid.local_to_world(Vector3::new(x, height, z)),
                rotation_y,
            }
        })
        .collect()
}
