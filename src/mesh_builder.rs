//! Tile geometry generation.
//!
//! Each tile owns a list of batches keyed by texture pair and kind. A batch
//! never reaches 65536 vertices or indices (16-bit index buffers); when an
//! emission would overflow, a new batch with the same key is opened.
//!
//! Geometry for a set of tiles is computed in parallel with rayon; the store
//! is only read during that phase.

use std::collections::HashMap;

use godot::prelude::*;
use rayon::prelude::*;

use crate::grass_planter::GrassInstance;
use crate::grid::{CellRect, GridParams};
use crate::heightfield::Heightfield;
use crate::query::{exact_height_local, normalize_or_zero, CollisionProxy};
use crate::scatter::EmbeddedObject;

/// Exclusive vertex limit of a batch.
pub const MAX_BATCH_VERTICES: usize = 65536;
/// Exclusive index limit of a batch.
pub const MAX_BATCH_INDICES: usize = 65536;

/// Triangle list of one terrain cell: TL, BR, TR then TL, BL, BR.
const QUAD_INDICES: [u16; 6] = [0, 3, 1, 0, 2, 3];
/// Corner offsets in TL, TR, BL, BR order.
const CORNER_OFFSETS: [(i32, i32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];

/// Triangle list of one grass card.
const GRASS_CARD_INDICES: [u16; 6] = [2, 1, 0, 2, 3, 1];
/// Rotation between the two crossed cards of a grass patch (radians).
const GRASS_CROSS_ANGLE: f32 = 1.34;
const GRASS_PATCH_VERTICES: usize = 8;
const GRASS_PATCH_INDICES: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Terrain,
    Grass,
}

/// Batch identity: textures and kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub texture: i32,
    /// Second texture for blended batches, `None` for single-texture batches
    pub blend_texture: Option<i32>,
    pub kind: BatchKind,
}

impl BatchKey {
    pub fn terrain(main: i32, blend: i32) -> Self {
        Self {
            texture: main,
            blend_texture: (blend != main).then_some(blend),
            kind: BatchKind::Terrain,
        }
    }

    pub fn grass(texture: i32) -> Self {
        Self {
            texture,
            blend_texture: None,
            kind: BatchKind::Grass,
        }
    }

    pub fn uses_texture(&self, index: i32) -> bool {
        self.texture == index || self.blend_texture == Some(index)
    }
}

/// Material switches the renderer applies to a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MaterialFlags {
    pub double_sided: bool,
    pub lit: bool,
    pub wind: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainVertex {
    pub position: Vector3,
    pub normal: Vector3,
    pub uv: Vector2,
    /// White, with the blend weight of the batch's second texture in alpha
    pub color: Color,
}

/// Vertex and 16-bit index buffers sharing one material.
#[derive(Clone, Debug)]
pub struct GeometryBatch {
    pub key: BatchKey,
    pub flags: MaterialFlags,
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u16>,
    pub aabb: Aabb,
}

impl GeometryBatch {
    pub fn new(key: BatchKey, flags: MaterialFlags) -> Self {
        Self {
            key,
            flags,
            vertices: Vec::new(),
            indices: Vec::new(),
            aabb: Aabb::default(),
        }
    }

    /// True if `vertices`/`indices` more elements keep the batch under its limits.
    pub fn can_accept(&self, vertices: usize, indices: usize) -> bool {
        self.vertices.len() + vertices < MAX_BATCH_VERTICES
            && self.indices.len() + indices < MAX_BATCH_INDICES
    }

    /// Append vertices with indices relative to the first of them.
    fn append(&mut self, vertices: &[TerrainVertex], pattern: &[u16]) {
        let base = self.vertices.len() as u16;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(pattern.iter().map(|i| base + i));
    }

    pub fn recompute_aabb(&mut self) {
        self.aabb = aabb_of(self.vertices.iter().map(|v| v.position));
    }
}

/// Per-rebuild settings taken from the terrain configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildSettings {
    pub texture_scale: f32,
    pub lit: bool,
    pub grass_uses_wind: bool,
}

impl BuildSettings {
    fn terrain_flags(&self) -> MaterialFlags {
        MaterialFlags {
            double_sided: false,
            lit: self.lit,
            wind: false,
        }
    }

    fn grass_flags(&self) -> MaterialFlags {
        MaterialFlags {
            double_sided: true,
            lit: self.lit,
            wind: self.grass_uses_wind,
        }
    }
}

/// A square block of cells with its geometry and embedded objects.
#[derive(Clone, Debug)]
pub struct Tile {
    /// Stable identifier, persisted with the terrain
    pub id: i32,
    pub coord: Vector2i,
    pub batches: Vec<GeometryBatch>,
    pub aabb: Aabb,
    pub objects: Vec<EmbeddedObject>,
    collision: Option<CollisionProxy>,
}

impl Tile {
    pub fn new(id: i32, coord: Vector2i) -> Self {
        Self {
            id,
            coord,
            batches: Vec::new(),
            aabb: Aabb::default(),
            objects: Vec::new(),
            collision: None,
        }
    }

    /// Replace the geometry, recompute bounds and invalidate collision.
    pub fn set_geometry(&mut self, mut batches: Vec<GeometryBatch>) {
        for batch in &mut batches {
            batch.recompute_aabb();
        }
        self.aabb = merge_aabbs(batches.iter().map(|b| b.aabb));
        self.batches = batches;
        self.collision = None;
    }

    pub fn has_collision(&self) -> bool {
        self.collision.is_some()
    }

    /// Collision proxy, built from the current geometry on first use.
    pub fn collision_proxy(&mut self) -> &CollisionProxy {
        let batches = &self.batches;
        self.collision
            .get_or_insert_with(|| CollisionProxy::from_batches(batches))
    }

    pub fn uses_texture(&self, index: i32) -> bool {
        self.batches.iter().any(|b| b.key.uses_texture(index))
    }

    pub fn vertex_count(&self) -> usize {
        self.batches.iter().map(|b| b.vertices.len()).sum()
    }
}

/// Batch list under construction for one tile.
struct BatchSet {
    batches: Vec<GeometryBatch>,
}

impl BatchSet {
    fn new() -> Self {
        Self { batches: Vec::new() }
    }

    /// Last batch with `key` that can take the incoming elements, or a new one.
    fn batch_for(
        &mut self,
        key: BatchKey,
        flags: MaterialFlags,
        vertices: usize,
        indices: usize,
    ) -> &mut GeometryBatch {
        let found = self
            .batches
            .iter()
            .rposition(|b| b.key == key && b.can_accept(vertices, indices));
        let index = match found {
            Some(i) => i,
            None => {
                self.batches.push(GeometryBatch::new(key, flags));
                self.batches.len() - 1
            }
        };
        &mut self.batches[index]
    }
}

fn plane_normal(a: Vector3, b: Vector3, c: Vector3) -> Vector3 {
    normalize_or_zero((b - a).cross(c - a))
}

/// Smoothed normal of the grid vertex `(x, y)` from its 4-neighborhood.
pub fn vertex_normal(store: &Heightfield, x: i32, y: i32) -> Vector3 {
    let v = store.world_position(x, y);
    let top = store.world_position(x, y - 1);
    let bottom = store.world_position(x, y + 1);
    let left = store.world_position(x - 1, y);
    let right = store.world_position(x + 1, y);

    let sum = plane_normal(top, v, left)
        + plane_normal(top, right, v)
        + plane_normal(v, right, bottom)
        + plane_normal(v, bottom, left);

    let n = -normalize_or_zero(sum);
    if n.length() < 0.5 {
        Vector3::UP
    } else {
        n
    }
}

fn emit_cell(set: &mut BatchSet, store: &Heightfield, x: i32, y: i32, settings: &BuildSettings) {
    let cell = store.get_clamped(x, y);
    let key = BatchKey::terrain(cell.main_texture, cell.blend_texture);

    let mut quad = [TerrainVertex {
        position: Vector3::ZERO,
        normal: Vector3::UP,
        uv: Vector2::ZERO,
        color: Color::WHITE,
    }; 4];
    for (corner, (dx, dy)) in CORNER_OFFSETS.iter().enumerate() {
        let position = store.world_position(x + dx, y + dy);
        quad[corner] = TerrainVertex {
            position,
            normal: vertex_normal(store, x + dx, y + dy),
            uv: Vector2::new(position.x, position.z) * settings.texture_scale,
            color: Color::from_rgba(1.0, 1.0, 1.0, cell.blend_weights[corner] as f32 / 255.0),
        };
    }

    set.batch_for(key, settings.terrain_flags(), quad.len(), QUAD_INDICES.len())
        .append(&quad, &QUAD_INDICES);
}

fn emit_grass(set: &mut BatchSet, store: &Heightfield, grass: &GrassInstance, settings: &BuildSettings) {
    let sample = exact_height_local(store, grass.pos_x, grass.pos_z);
    let normal = sample.normal.unwrap_or(Vector3::UP);
    let d = store.grid().displacement;
    let base = Vector3::new(grass.pos_x + d.x, sample.height, grass.pos_z + d.z);
    let half_width = grass.width * 0.5;

    let batch = set.batch_for(
        BatchKey::grass(grass.texture),
        settings.grass_flags(),
        GRASS_PATCH_VERTICES,
        GRASS_PATCH_INDICES,
    );

    for card in 0..2 {
        let r = grass.rotation + if card == 1 { GRASS_CROSS_ANGLE } else { 0.0 };
        let offset = Vector3::new(r.sin() * half_width, 0.0, r.cos() * half_width);
        let up = Vector3::new(0.0, grass.height, 0.0);
        let corners = [
            (base + offset, Vector2::new(0.0, 1.0)),
            (base - offset, Vector2::new(1.0, 1.0)),
            (base + offset + up, Vector2::new(0.0, 0.0)),
            (base - offset + up, Vector2::new(1.0, 0.0)),
        ];
        let card_vertices = corners.map(|(position, uv)| TerrainVertex {
            position,
            normal,
            uv,
            color: Color::WHITE,
        });
        batch.append(&card_vertices, &GRASS_CARD_INDICES);
    }
}

/// Geometry of one tile: a quad per cell, then the tile's grass patches.
pub fn build_tile_geometry(
    store: &Heightfield,
    tile_rect: &CellRect,
    grass: &[&GrassInstance],
    settings: &BuildSettings,
) -> Vec<GeometryBatch> {
    let mut set = BatchSet::new();
    for (x, y) in tile_rect.clamped(store.grid()).cells() {
        emit_cell(&mut set, store, x, y, settings);
    }
    for instance in grass {
        emit_grass(&mut set, store, instance, settings);
    }
    set.batches
}

/// Indices of tiles whose footprint intersects `rect`.
pub fn tiles_in_rect(grid: &GridParams, rect: &CellRect) -> Vec<usize> {
    let mut tiles = Vec::new();
    for ty in 0..grid.tile_count_y {
        for tx in 0..grid.tile_count_x {
            if grid.tile_rect(tx, ty).intersects(rect) {
                tiles.push(grid.tile_index(tx, ty));
            }
        }
    }
    tiles
}

/// Compute geometry for `tiles` in parallel. Results keep the input order.
pub fn build_tiles(
    store: &Heightfield,
    tiles: &[usize],
    grass: &[GrassInstance],
    settings: &BuildSettings,
) -> Vec<(usize, Vec<GeometryBatch>)> {
    let grid = store.grid();
    let mut grass_by_tile: HashMap<usize, Vec<&GrassInstance>> = HashMap::new();
    for instance in grass {
        if let Some(tile) = grid.tile_of_local(instance.pos_x, instance.pos_z) {
            grass_by_tile
                .entry(grid.tile_index(tile.x, tile.y))
                .or_default()
                .push(instance);
        }
    }

    tiles
        .par_iter()
        .map(|&index| {
            let coord = grid.tile_coord(index);
            let rect = grid.tile_rect(coord.x, coord.y);
            let patches = grass_by_tile.get(&index).map(Vec::as_slice).unwrap_or(&[]);
            (index, build_tile_geometry(store, &rect, patches, settings))
        })
        .collect()
}

pub fn aabb_of(points: impl IntoIterator<Item = Vector3>) -> Aabb {
    let mut iter = points.into_iter();
    let Some(first) = iter.next() else {
        return Aabb::default();
    };
    let (min, max) = iter.fold((first, first), |(lo, hi), p| {
        (
            Vector3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
            Vector3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
        )
    });
    Aabb::new(min, max - min)
}

pub fn merge_aabbs(boxes: impl IntoIterator<Item = Aabb>) -> Aabb {
    aabb_of(
        boxes
            .into_iter()
            .flat_map(|b| [b.position, b.position + b.size]),
    )
}
