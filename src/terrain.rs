//! The terrain: owner of the heightfield, its textures, grass, tiles and
//! embedded objects.
//!
//! Every operation runs to completion before returning. Geometry changes
//! mark tiles dirty; the host pushes them to its renderer with
//! `flush_dirty_tiles`.

use std::collections::BTreeSet;

use godot::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::blend::{resolve_all, resolve_region};
use crate::brush::{
    dome_factor, modified_height, raised_height, BrushFootprint, ModifyOp, BLEND_BORDER, TRACKING_BORDER,
};
use crate::config::{LightingType, TerrainConfig};
use crate::debug_log::debug_log;
use crate::error::{TerrainError, TerrainResult};
use crate::grass_planter::{
    distribute_grass, paint_patches, remove_in_rect, GrassDistribution, GrassInstance, HEIGHTMAP_GRASS_COVERAGE,
    HEIGHTMAP_GRASS_CUTOFF, HEIGHTMAP_GRASS_HEIGHT, HEIGHTMAP_GRASS_WIDTH,
};
use crate::grid::{CellRect, GridParams};
use crate::heightfield::{Cell, Heightfield};
use crate::mesh_builder::{build_tiles, tiles_in_rect, BuildSettings, Tile};
use crate::noise_field::{Topology, TopologyField};
use crate::query::{exact_height_at, exact_height_local, ray_aabb, Ray, SurfaceSample};
use crate::scatter::{scatter_placements, DetachedScene, EmbeddedObject, SceneHost, ScatterTemplate, TreeDistribution};
use crate::serialization::TerrainAttributes;
use crate::texture_table::{TextureHandle, TextureTable};
use crate::undo::{GrassSnapshot, NoUndo, TerrainSnapshot, UndoJournal};

/// Receives tile geometry whenever tiles are rebuilt.
pub trait TileRenderer {
    /// The grid was regenerated; previously uploaded tiles are stale.
    fn release_tiles(&mut self) {}

    fn upload_tile(&mut self, index: usize, tile: &Tile, textures: &TextureTable);
}

/// Arguments of procedural generation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerateParams {
    pub topology: Topology,
    pub side_length: i32,
    pub cell_size: i32,
    pub max_height: f32,
}

/// What an edit touched.
#[derive(Clone, Debug, PartialEq)]
pub struct EditReport {
    /// Cells whose blend state was recomputed
    pub resolved: Option<CellRect>,
    /// Cell rectangle whose tiles were rebuilt
    pub rebuilt: CellRect,
    /// Rebuilt tile indices
    pub tiles: Vec<usize>,
}

pub struct Terrain {
    config: TerrainConfig,
    store: Heightfield,
    textures: TextureTable,
    grass: Vec<GrassInstance>,
    tiles: Vec<Tile>,
    dirty: BTreeSet<usize>,
    tiles_released: bool,
    rng: ChaCha8Rng,
    scene: Box<dyn SceneHost>,
    texture_scale: f32,
    grass_uses_wind: bool,
    lighting: LightingType,
    next_object_id: u64,
    next_tile_id: i32,
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new(TerrainConfig::default())
    }
}

impl Terrain {
    pub fn new(config: TerrainConfig) -> Self {
        Self {
            textures: TextureTable::new(config.max_textures),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            texture_scale: config.texture_scale,
            grass_uses_wind: config.grass_uses_wind,
            lighting: config.lighting,
            config,
            store: Heightfield::default(),
            grass: Vec::new(),
            tiles: Vec::new(),
            dirty: BTreeSet::new(),
            tiles_released: false,
            scene: Box::new(DetachedScene),
            next_object_id: 1,
            next_tile_id: 0,
        }
    }

    pub fn set_scene_host(&mut self, scene: Box<dyn SceneHost>) {
        self.scene = scene;
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn store(&self) -> &Heightfield {
        &self.store
    }

    pub fn grid(&self) -> &GridParams {
        self.store.grid()
    }

    pub fn textures(&self) -> &TextureTable {
        &self.textures
    }

    pub fn grass(&self) -> &[GrassInstance] {
        &self.grass
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_generated(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn texture_scale(&self) -> f32 {
        self.texture_scale
    }

    pub fn grass_uses_wind(&self) -> bool {
        self.grass_uses_wind
    }

    pub fn lighting_type(&self) -> LightingType {
        self.lighting
    }

    /// One material per registered texture.
    pub fn material_count(&self) -> usize {
        self.textures.len()
    }

    pub fn bounding_box(&self) -> Aabb {
        self.grid().bounding_box(self.store.max_height)
    }

    pub fn objects(&self) -> impl Iterator<Item = &EmbeddedObject> {
        self.tiles.iter().flat_map(|t| t.objects.iter())
    }

    // ---- construction ----

    /// Discard all data and lay out an empty grid.
    fn reset(&mut self, grid: GridParams) {
        let stale: Vec<u64> = self.objects().map(|o| o.id).collect();
        for id in stale {
            self.scene.object_removed(id);
        }

        let tile_count = grid.tile_count();
        let coords: Vec<Vector2i> = (0..tile_count).map(|i| grid.tile_coord(i)).collect();
        self.store = Heightfield::new(grid);
        self.grass.clear();
        self.textures.clear();
        self.tiles = coords
            .into_iter()
            .map(|coord| {
                let id = self.next_tile_id;
                self.next_tile_id += 1;
                Tile::new(id, coord)
            })
            .collect();
        self.dirty.clear();
        self.tiles_released = true;
    }

    /// Procedurally generate a new terrain.
    ///
    /// All cells start on texture 0 (the first of `textures`).
    pub fn generate(
        &mut self,
        params: &GenerateParams,
        textures: &[TextureHandle],
        grass: &[GrassDistribution],
        trees: &[TreeDistribution],
    ) -> TerrainResult<()> {
        let grid = GridParams::new(params.side_length, params.cell_size, self.config.cells_per_tile_side)?;
        debug_log(&format!(
            "[generate] {:?} side={} cells={}x{} tiles={}",
            params.topology,
            grid.side_length,
            grid.cell_count_x,
            grid.cell_count_y,
            grid.tile_count()
        ));

        self.reset(grid);
        for texture in textures {
            self.textures.find_or_add(texture)?;
        }

        let field = TopologyField::new(params.topology, params.max_height, params.cell_size, self.config.seed as u32);
        self.store.fill_procedural(&field);
        self.store.max_height = params.max_height;
        self.texture_scale = self.config.texture_scale;
        resolve_all(&mut self.store, self.config.blend_intensity);

        for distribution in grass {
            self.add_grass_distribution(distribution)?;
        }
        self.rebuild_all();

        for tree in trees {
            self.distribute_meshes(&tree.template, tree.coverage, &mut NoUndo);
        }
        Ok(())
    }

    /// Build a terrain from a `width * height` row-major height array.
    ///
    /// With three textures, cells are textured by height band; with a grass
    /// texture, the low band is covered with grass.
    pub fn load_from_heightmap(
        &mut self,
        width: i32,
        height: i32,
        cell_size: i32,
        samples: &[f32],
        textures: &[TextureHandle],
        grass_texture: Option<&TextureHandle>,
    ) -> TerrainResult<()> {
        let side = width.max(height).max(0).saturating_mul(cell_size.max(0));
        let grid = GridParams::new(side, cell_size, self.config.cells_per_tile_side)?;
        self.reset(grid);

        let max_height = self.store.fill_from_samples(width, height, samples)?;
        self.store.max_height = max_height;
        self.texture_scale = self.config.heightmap_texture_scale;
        debug_log(&format!(
            "[load_from_heightmap] {}x{} samples, max height {}",
            width, height, max_height
        ));

        for texture in textures {
            self.textures.find_or_add(texture)?;
        }
        if textures.len() == 3 {
            self.store
                .apply_height_bands(self.config.texture_height_low, self.config.texture_height_med);
        }
        resolve_all(&mut self.store, self.config.blend_intensity);

        if let Some(texture) = grass_texture {
            let mut distribution = GrassDistribution::new(
                texture.clone(),
                HEIGHTMAP_GRASS_COVERAGE,
                HEIGHTMAP_GRASS_HEIGHT,
                HEIGHTMAP_GRASS_WIDTH,
            );
            distribution.max_pos_height = max_height * self.config.texture_height_low * HEIGHTMAP_GRASS_CUTOFF;
            self.add_grass_distribution(&distribution)?;
        }

        self.rebuild_all();
        Ok(())
    }

    fn add_grass_distribution(&mut self, distribution: &GrassDistribution) -> TerrainResult<()> {
        if distribution.is_degenerate() {
            return Ok(());
        }
        let texture = self.textures.find_or_add(&distribution.texture)?;
        let patches = distribute_grass(&self.store, distribution, texture, &mut self.rng);
        debug_log(&format!("[grass] placed {} patches", patches.len()));
        self.grass.extend(patches);
        Ok(())
    }

    /// Copy of this terrain's data with freshly built tiles and no objects.
    pub fn duplicate(&self) -> Terrain {
        let mut copy = Terrain::new(self.config.clone());
        copy.reset(self.grid().clone());
        copy.store = self.store.clone();
        copy.textures = self.textures.clone();
        copy.grass = self.grass.clone();
        copy.texture_scale = self.texture_scale;
        copy.grass_uses_wind = self.grass_uses_wind;
        copy.lighting = self.lighting;
        copy.rebuild_all();
        copy
    }

    // ---- geometry ----

    fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            texture_scale: self.texture_scale,
            lit: self.lighting == LightingType::Dynamic,
            grass_uses_wind: self.grass_uses_wind,
        }
    }

    fn rebuild_tiles(&mut self, tiles: &[usize]) {
        if tiles.is_empty() {
            return;
        }
        let settings = self.build_settings();
        let results = build_tiles(&self.store, tiles, &self.grass, &settings);
        for (index, batches) in results {
            if let Some(tile) = self.tiles.get_mut(index) {
                tile.set_geometry(batches);
                self.dirty.insert(index);
            }
        }
    }

    /// Rebuild every tile whose footprint intersects `rect`.
    pub fn rebuild_region(&mut self, rect: &CellRect) -> Vec<usize> {
        let tiles = tiles_in_rect(self.grid(), rect);
        self.rebuild_tiles(&tiles);
        tiles
    }

    pub fn rebuild_all(&mut self) {
        let tiles: Vec<usize> = (0..self.tiles.len()).collect();
        self.rebuild_tiles(&tiles);
    }

    /// Indices of tiles rebuilt since the last flush.
    pub fn dirty_tiles(&self) -> Vec<usize> {
        self.dirty.iter().copied().collect()
    }

    /// Hand every rebuilt tile to `renderer`. Returns the number uploaded.
    pub fn flush_dirty_tiles(&mut self, renderer: &mut dyn TileRenderer) -> usize {
        if std::mem::take(&mut self.tiles_released) {
            renderer.release_tiles();
        }
        let dirty = std::mem::take(&mut self.dirty);
        for &index in &dirty {
            if let Some(tile) = self.tiles.get(index) {
                renderer.upload_tile(index, tile, &self.textures);
            }
        }
        dirty.len()
    }

    // ---- queries ----

    pub fn cell_at(&self, x: i32, y: i32) -> Option<&Cell> {
        self.store.get(x, y)
    }

    pub fn world_position(&self, x: i32, y: i32) -> Vector3 {
        self.store.world_position(x, y)
    }

    pub fn exact_height_at(&self, world_x: f32, world_z: f32) -> SurfaceSample {
        exact_height_at(&self.store, world_x, world_z)
    }

    /// Cell hit first by `ray`, building tile collision on demand.
    pub fn tile_pick(&mut self, ray: &Ray) -> Option<Vector2i> {
        if !self.is_generated() {
            return None;
        }
        let mut nearest: Option<f32> = None;
        for tile in &mut self.tiles {
            if ray_aabb(ray, &tile.aabb).is_none() {
                continue;
            }
            if let Some(t) = tile.collision_proxy().intersect(ray) {
                nearest = Some(nearest.map_or(t, |n| n.min(t)));
            }
        }

        let hit = ray.at(nearest?);
        let grid = self.grid();
        let size = grid.cell_size as f32;
        Some(Vector2i::new(
            ((hit.x - grid.displacement.x) / size) as i32,
            ((hit.z - grid.displacement.z) / size) as i32,
        ))
    }

    // ---- brush edits ----

    /// Apply `edit` to every in-grid cell of the brush. The pre-edit snapshot
    /// is taken lazily, only when the journal records.
    fn edit_cells<F>(
        &mut self,
        brush: &BrushFootprint,
        undo: &mut dyn UndoJournal,
        mut edit: F,
    ) -> (bool, Option<TerrainSnapshot>)
    where
        F: FnMut(i32, i32, &mut Cell) -> bool,
    {
        let rect = brush.cells();
        let mut before = None;
        let mut changed = false;
        for (x, y) in rect.cells() {
            if !self.store.grid().in_bounds(x, y) {
                continue;
            }
            if before.is_none() && undo.is_recording() {
                before = Some(TerrainSnapshot::capture(&self.store));
            }
            if let Some(cell) = self.store.get_mut(x, y) {
                changed |= edit(x - rect.x0, y - rect.y0, cell);
            }
        }
        (changed, before)
    }

    fn finish_cell_edit(
        &mut self,
        brush: &BrushFootprint,
        before: Option<TerrainSnapshot>,
        tracked: Vec<(u64, f32)>,
        undo: &mut dyn UndoJournal,
    ) -> EditReport {
        if let Some(before) = before {
            undo.record_terrain(before, TerrainSnapshot::capture(&self.store));
        }
        let resolved = resolve_region(&mut self.store, &brush.region(BLEND_BORDER), self.config.blend_intensity);
        self.follow_surface(tracked, undo);

        let rebuilt = brush.region(self.config.edit_border);
        let tiles = self.rebuild_region(&rebuilt);
        debug_log(&format!(
            "[edit] anchor=({}, {}) size={} rebuilt {} tiles",
            brush.anchor.x,
            brush.anchor.y,
            brush.size,
            tiles.len()
        ));
        EditReport {
            resolved: Some(resolved),
            rebuilt,
            tiles,
        }
    }

    fn raise_with_dome(
        &mut self,
        brush: BrushFootprint,
        add: f32,
        sphere: f32,
        undo: &mut dyn UndoJournal,
    ) -> Option<EditReport> {
        if !self.is_generated() || brush.is_degenerate() || add == 0.0 {
            return None;
        }
        let range = self.store.height_range(&brush.cells());
        let tracked = self.objects_near(&brush);
        let size = brush.size;

        let (changed, before) = self.edit_cells(&brush, undo, |i, j, cell| {
            cell.height = raised_height(cell.height, i, j, size, add, sphere, range);
            true
        });
        changed.then(|| self.finish_cell_edit(&brush, before, tracked, undo))
    }

    /// Raise (`add > 0`) or lower the cells under the brush.
    ///
    /// When the brush covers uneven ground the change is weighted so the
    /// ground evens out instead of shifting uniformly.
    pub fn raise_lower(
        &mut self,
        anchor: Vector2i,
        size: i32,
        add: f32,
        undo: &mut dyn UndoJournal,
    ) -> Option<EditReport> {
        self.raise_with_dome(BrushFootprint::new(anchor, size), add, 0.0, undo)
    }

    /// Raise a dome (`add > 0`) or carve a bowl under the brush.
    pub fn mountain_valley(
        &mut self,
        anchor: Vector2i,
        size: i32,
        add: f32,
        undo: &mut dyn UndoJournal,
    ) -> Option<EditReport> {
        let sphere = dome_factor(self.grid().cell_size, size, add);
        self.raise_with_dome(BrushFootprint::new(anchor, size), add, sphere, undo)
    }

    /// Smooth, flatten or roughen the cells under the brush.
    ///
    /// Does nothing when the brush covers perfectly level ground.
    pub fn modify(
        &mut self,
        anchor: Vector2i,
        size: i32,
        op: ModifyOp,
        undo: &mut dyn UndoJournal,
    ) -> Option<EditReport> {
        let brush = BrushFootprint::new(anchor, size);
        if !self.is_generated() || brush.is_degenerate() {
            return None;
        }
        let (min, max) = self.store.height_range(&brush.cells())?;
        if min == max {
            return None;
        }

        let noise: Vec<f32> = if op == ModifyOp::Noise {
            (0..brush.cells().cell_count()).map(|_| self.rng.random::<f32>()).collect()
        } else {
            Vec::new()
        };
        let cell_size = self.grid().cell_size;
        let tracked = self.objects_near(&brush);

        let (changed, before) = self.edit_cells(&brush, undo, |i, j, cell| {
            let sample = noise.get((j * size + i) as usize).copied().unwrap_or(0.5);
            cell.height = modified_height(op, cell.height, min, max, sample, cell_size);
            true
        });
        changed.then(|| self.finish_cell_edit(&brush, before, tracked, undo))
    }

    pub fn smooth(&mut self, anchor: Vector2i, size: i32, undo: &mut dyn UndoJournal) -> Option<EditReport> {
        self.modify(anchor, size, ModifyOp::Smooth, undo)
    }

    pub fn flatten(&mut self, anchor: Vector2i, size: i32, undo: &mut dyn UndoJournal) -> Option<EditReport> {
        self.modify(anchor, size, ModifyOp::Flatten, undo)
    }

    pub fn noise(&mut self, anchor: Vector2i, size: i32, undo: &mut dyn UndoJournal) -> Option<EditReport> {
        self.modify(anchor, size, ModifyOp::Noise, undo)
    }

    /// Paint `texture` onto the cells under the brush, registering it first.
    pub fn paint_texture(
        &mut self,
        anchor: Vector2i,
        size: i32,
        texture: &TextureHandle,
        undo: &mut dyn UndoJournal,
    ) -> TerrainResult<Option<EditReport>> {
        let brush = BrushFootprint::new(anchor, size);
        if !self.is_generated() || brush.is_degenerate() {
            return Ok(None);
        }
        let index = self.textures.find_or_add(texture)?;

        let (changed, before) = self.edit_cells(&brush, undo, |_, _, cell| {
            if cell.user_texture == index {
                return false;
            }
            cell.user_texture = index;
            true
        });
        Ok(changed.then(|| self.finish_cell_edit(&brush, before, Vec::new(), undo)))
    }

    /// Add `size` grass patches inside the brush square.
    pub fn paint_grass(
        &mut self,
        anchor: Vector2i,
        size: i32,
        texture: &TextureHandle,
        height: f32,
        width: f32,
        undo: &mut dyn UndoJournal,
    ) -> TerrainResult<Option<EditReport>> {
        let brush = BrushFootprint::new(anchor, size);
        if !self.is_generated() || brush.is_degenerate() || height == 0.0 || width == 0.0 {
            return Ok(None);
        }
        let index = self.textures.find_or_add(texture)?;
        let rect = brush.region(0);
        let before = undo.is_recording().then(|| GrassSnapshot::capture(&self.grass));

        let patches = paint_patches(
            &rect,
            self.grid().cell_size,
            size as usize,
            height,
            width,
            index,
            &mut self.rng,
        );
        self.grass.extend(patches);
        Ok(Some(self.finish_grass_edit(rect, before, undo)))
    }

    /// Remove every grass patch inside the brush square.
    pub fn remove_grass(&mut self, anchor: Vector2i, size: i32, undo: &mut dyn UndoJournal) -> Option<EditReport> {
        let brush = BrushFootprint::new(anchor, size);
        if !self.is_generated() || brush.is_degenerate() {
            return None;
        }
        let rect = brush.region(0);
        let before = undo.is_recording().then(|| GrassSnapshot::capture(&self.grass));
        let cell_size = self.grid().cell_size;
        if remove_in_rect(&mut self.grass, &rect, cell_size) == 0 {
            return None;
        }
        Some(self.finish_grass_edit(rect, before, undo))
    }

    fn finish_grass_edit(
        &mut self,
        rect: CellRect,
        before: Option<GrassSnapshot>,
        undo: &mut dyn UndoJournal,
    ) -> EditReport {
        if let Some(before) = before {
            undo.record_grass(before, GrassSnapshot::capture(&self.grass));
        }
        let tiles = self.rebuild_region(&rect);
        EditReport {
            resolved: None,
            rebuilt: rect,
            tiles,
        }
    }

    // ---- embedded objects ----

    /// Ids and surface heights of objects near the brush.
    fn objects_near(&self, brush: &BrushFootprint) -> Vec<(u64, f32)> {
        let (lo, hi) = brush.local_bounds(TRACKING_BORDER, self.grid().cell_size);
        self.objects()
            .filter_map(|object| {
                let local = self.grid().world_to_local(object.position);
                let inside = local.x >= lo.x && local.x <= hi.x && local.z >= lo.y && local.z <= hi.y;
                inside.then(|| (object.id, exact_height_local(&self.store, local.x, local.z).height))
            })
            .collect()
    }

    /// Shift tracked objects by the change of the surface under them.
    fn follow_surface(&mut self, tracked: Vec<(u64, f32)>, undo: &mut dyn UndoJournal) {
        for (id, old_height) in tracked {
            let Some(position) = self.object(id).map(|o| o.position) else {
                continue;
            };
            let local = self.grid().world_to_local(position);
            let new_height = exact_height_local(&self.store, local.x, local.z).height;
            let delta = old_height - new_height;
            if delta == 0.0 {
                continue;
            }
            let moved = Vector3::new(position.x, position.y - delta, position.z);
            self.set_object_position(id, moved);
            undo.record_object_move(id, position, moved);
        }
    }

    fn locate_object(&self, id: u64) -> Option<(usize, usize)> {
        self.tiles.iter().enumerate().find_map(|(t, tile)| {
            tile.objects
                .iter()
                .position(|o| o.id == id)
                .map(|o| (t, o))
        })
    }

    pub fn object(&self, id: u64) -> Option<&EmbeddedObject> {
        self.locate_object(id).map(|(t, o)| &self.tiles[t].objects[o])
    }

    /// Tile currently owning object `id`.
    pub fn object_tile(&self, id: u64) -> Option<Vector2i> {
        self.locate_object(id).map(|(t, _)| self.tiles[t].coord)
    }

    /// Scatter copies of `template` over the terrain. Returns the new ids.
    pub fn distribute_meshes(
        &mut self,
        template: &ScatterTemplate,
        coverage: f32,
        undo: &mut dyn UndoJournal,
    ) -> Vec<u64> {
        if !self.is_generated() {
            return Vec::new();
        }
        let placements = scatter_placements(
            &self.store,
            template,
            coverage,
            self.config.max_scatter_objects,
            &mut self.rng,
        );
        debug_log(&format!("[scatter] '{}' x{}", template.name, placements.len()));

        placements
            .into_iter()
            .map(|placement| {
                let object = EmbeddedObject {
                    id: self.next_object_id,
                    template: template.name.clone(),
                    position: placement.position,
                    rotation_y: placement.rotation_y,
                };
                self.next_object_id += 1;
                undo.record_object_spawn(&object);
                let id = object.id;
                self.insert_object(object);
                id
            })
            .collect()
    }

    /// Add an object to the tile covering its position.
    pub fn insert_object(&mut self, object: EmbeddedObject) {
        if self.tiles.is_empty() {
            return;
        }
        let local = self.grid().world_to_local(object.position);
        let coord = self.grid().tile_of_local_clamped(local.x, local.z);
        let index = self.grid().tile_index(coord.x, coord.y);
        self.next_object_id = self.next_object_id.max(object.id + 1);
        self.scene.object_added(&object, coord);
        self.tiles[index].objects.push(object);
    }

    pub fn remove_object(&mut self, id: u64) -> Option<EmbeddedObject> {
        let (t, o) = self.locate_object(id)?;
        self.scene.object_removed(id);
        Some(self.tiles[t].objects.remove(o))
    }

    /// Move an object without re-parenting it.
    pub fn set_object_position(&mut self, id: u64, position: Vector3) -> bool {
        let Some((t, o)) = self.locate_object(id) else {
            return false;
        };
        self.tiles[t].objects[o].position = position;
        self.scene.object_moved(id, position);
        true
    }

    /// Re-parent an object to tile `coord`.
    pub fn move_object_to_tile(&mut self, id: u64, coord: Vector2i) -> bool {
        let grid = self.grid();
        if coord.x < 0 || coord.y < 0 || coord.x >= grid.tile_count_x || coord.y >= grid.tile_count_y {
            return false;
        }
        let target = grid.tile_index(coord.x, coord.y);
        let Some((t, o)) = self.locate_object(id) else {
            return false;
        };
        if t == target {
            return false;
        }
        let from = self.tiles[t].coord;
        let object = self.tiles[t].objects.remove(o);
        self.tiles[target].objects.push(object);
        self.scene.object_reparented(id, from, coord);
        true
    }

    /// Re-parent an object into the tile that covers its current position.
    pub fn resort_object(&mut self, id: u64, undo: &mut dyn UndoJournal) -> bool {
        let Some((t, o)) = self.locate_object(id) else {
            return false;
        };
        let local = self.grid().world_to_local(self.tiles[t].objects[o].position);
        let target = self.grid().tile_of_local_clamped(local.x, local.z);
        let from = self.tiles[t].coord;
        if !self.move_object_to_tile(id, target) {
            return false;
        }
        undo.record_object_reparent(id, from, target);
        true
    }

    // ---- textures and materials ----

    /// Swap the texture in slot `index` and rebuild the tiles that use it.
    pub fn replace_texture(&mut self, index: i32, texture: &TextureHandle, undo: &mut dyn UndoJournal) -> bool {
        match self.textures.get(index) {
            Some(current) if !current.same(texture) => {}
            _ => return false,
        }
        let Some(previous) = self.textures.replace(index, texture.clone()) else {
            return false;
        };
        undo.record_texture_change(index, previous, texture.clone());

        let users: Vec<usize> = self
            .tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.uses_texture(index))
            .map(|(i, _)| i)
            .collect();
        for &i in &users {
            self.dirty.insert(i);
        }
        self.rebuild_tiles(&users);
        true
    }

    /// Re-band textures 0/1/2 by height and rebuild everything.
    pub fn set_texture_height_thresholds(&mut self, low: f32, med: f32) {
        self.config.texture_height_low = low;
        self.config.texture_height_med = med;
        if !self.is_generated() {
            return;
        }
        self.store.refresh_max_height();
        self.store.apply_height_bands(low, med);
        resolve_all(&mut self.store, self.config.blend_intensity);
        self.rebuild_all();
    }

    pub fn set_blend_intensity(&mut self, intensity: u8) {
        self.config.blend_intensity = intensity;
        if !self.is_generated() {
            return;
        }
        resolve_all(&mut self.store, intensity);
        self.rebuild_all();
    }

    pub fn set_lighting_type(&mut self, lighting: LightingType, undo: &mut dyn UndoJournal) -> bool {
        if lighting == self.lighting {
            return false;
        }
        undo.record_lighting_change(self.lighting, lighting);
        self.lighting = lighting;
        self.rebuild_all();
        true
    }

    pub fn set_texture_capacity(&mut self, capacity: Option<usize>) {
        self.config.max_textures = capacity;
        self.textures.set_capacity(capacity);
    }

    // ---- attributes ----

    pub fn attributes(&self) -> TerrainAttributes {
        TerrainAttributes {
            texture_scale: self.texture_scale,
            grass_uses_wind: self.grass_uses_wind,
        }
    }

    /// Apply edited attributes, rebuilding when anything changed.
    pub fn apply_attributes(&mut self, attributes: &TerrainAttributes) -> bool {
        if *attributes == self.attributes() {
            return false;
        }
        self.texture_scale = attributes.texture_scale;
        self.grass_uses_wind = attributes.grass_uses_wind;
        self.rebuild_all();
        true
    }

    // ---- snapshots ----

    pub fn terrain_snapshot(&self) -> TerrainSnapshot {
        TerrainSnapshot::capture(&self.store)
    }

    /// Restore heights and textures, then recompute blending and geometry.
    pub fn restore_terrain_snapshot(&mut self, snapshot: &TerrainSnapshot) -> TerrainResult<()> {
        let expected = self.store.cells().len();
        if snapshot.cells.len() != expected {
            return Err(TerrainError::SnapshotLength {
                expected,
                actual: snapshot.cells.len(),
            });
        }
        for (cell, sample) in self.store.cells_mut().iter_mut().zip(&snapshot.cells) {
            cell.height = sample.height;
            cell.user_texture = sample.texture;
        }
        resolve_all(&mut self.store, self.config.blend_intensity);
        self.rebuild_all();
        Ok(())
    }

    pub fn grass_snapshot(&self) -> GrassSnapshot {
        GrassSnapshot::capture(&self.grass)
    }

    pub fn restore_grass_snapshot(&mut self, snapshot: &GrassSnapshot) {
        self.grass = snapshot.patches.clone();
        self.rebuild_all();
    }

    // ---- persistence support ----

    pub(crate) fn tile_ids(&self) -> Vec<i32> {
        self.tiles.iter().map(|t| t.id).collect()
    }

    /// Install loaded data. `tile_ids` are kept for tiles that have one.
    pub(crate) fn install(
        &mut self,
        grid: GridParams,
        max_height: f32,
        cells: Vec<(f32, i32)>,
        textures: Vec<TextureHandle>,
        grass: Vec<GrassInstance>,
        tile_ids: &[i32],
    ) -> TerrainResult<()> {
        for (i, texture) in textures.iter().enumerate() {
            if textures[..i].iter().any(|t| t.same(texture)) {
                return Err(TerrainError::Format(format!("texture '{}' stored twice", texture.name())));
            }
        }
        if let Some(capacity) = self.config.max_textures {
            if textures.len() > capacity {
                return Err(TerrainError::TextureLimit { capacity });
            }
        }

        self.reset(grid);
        for texture in &textures {
            self.textures.find_or_add(texture)?;
        }
        for (cell, (height, texture)) in self.store.cells_mut().iter_mut().zip(cells) {
            cell.height = height;
            cell.user_texture = texture;
        }
        self.store.max_height = max_height;
        for (tile, &id) in self.tiles.iter_mut().zip(tile_ids) {
            if id >= 0 {
                tile.id = id;
            }
        }
        self.next_tile_id = self.next_tile_id.max(tile_ids.iter().copied().max().unwrap_or(-1) + 1);
        self.grass = grass;
        resolve_all(&mut self.store, self.config.blend_intensity);
        self.rebuild_all();
        Ok(())
    }

    pub(crate) fn set_persisted_state(&mut self, texture_scale: f32, grass_uses_wind: bool, lighting: LightingType) {
        self.texture_scale = texture_scale;
        self.grass_uses_wind = grass_uses_wind;
        self.lighting = lighting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::{CORNER_BOTTOM_RIGHT, CORNER_TOP_LEFT};
    use crate::mesh_builder::BatchKind;
    use crate::undo::UndoHistory;

    fn config(per_tile: i32) -> TerrainConfig {
        TerrainConfig {
            cells_per_tile_side: per_tile,
            seed: 11,
            ..Default::default()
        }
    }

    fn flat_terrain(side: i32, per_tile: i32) -> Terrain {
        let mut terrain = Terrain::new(config(per_tile));
        let params = GenerateParams {
            topology: Topology::Flat,
            side_length: side,
            cell_size: 1,
            max_height: 10.0,
        };
        terrain
            .generate(&params, &[TextureHandle::new("base")], &[], &[])
            .unwrap();
        terrain
    }

    fn set_height(terrain: &mut Terrain, x: i32, y: i32, h: f32) {
        let index = terrain.store.cell_index(x, y);
        terrain.store.cells_mut()[index].height = h;
    }

    struct CountingRenderer {
        released: usize,
        uploaded: Vec<usize>,
    }

    impl TileRenderer for CountingRenderer {
        fn release_tiles(&mut self) {
            self.released += 1;
        }

        fn upload_tile(&mut self, index: usize, _tile: &Tile, _textures: &TextureTable) {
            self.uploaded.push(index);
        }
    }

    #[test]
    fn test_generate_builds_every_tile() {
        let terrain = flat_terrain(16, 4);
        assert_eq!(terrain.tiles().len(), 16);
        assert!(terrain.tiles().iter().all(|t| t.vertex_count() == 16 * 4));
        assert_eq!(terrain.dirty_tiles().len(), 16);
        assert_eq!(terrain.material_count(), 1);
        assert!(terrain.store().cells().iter().all(|c| c.user_texture == 0 && c.height == 0.0));
    }

    #[test]
    fn test_generate_hills_within_range() {
        let mut terrain = Terrain::new(config(10));
        let params = GenerateParams {
            topology: Topology::Hills,
            side_length: 200,
            cell_size: 10,
            max_height: 150.0,
        };
        terrain.generate(&params, &[], &[], &[]).unwrap();
        let max = terrain.store().cells().iter().map(|c| c.height).fold(f32::MIN, f32::max);
        assert!(max > 0.0 && max <= 153.0);
        assert_eq!(terrain.bounding_box().size.y, 150.0);
    }

    #[test]
    fn test_generate_rejects_bad_grid() {
        let mut terrain = Terrain::default();
        let params = GenerateParams {
            topology: Topology::Flat,
            side_length: 100,
            cell_size: 0,
            max_height: 1.0,
        };
        assert!(terrain.generate(&params, &[], &[], &[]).is_err());
        assert!(!terrain.is_generated());
    }

    #[test]
    fn test_flush_hands_off_dirty_tiles_once() {
        let mut terrain = flat_terrain(8, 4);
        let mut renderer = CountingRenderer {
            released: 0,
            uploaded: Vec::new(),
        };
        assert_eq!(terrain.flush_dirty_tiles(&mut renderer), 4);
        assert_eq!(renderer.released, 1);
        assert_eq!(renderer.uploaded, vec![0, 1, 2, 3]);
        assert_eq!(terrain.flush_dirty_tiles(&mut renderer), 0);
        assert_eq!(renderer.released, 1);
    }

    #[test]
    fn test_flatten_scenario() {
        let mut terrain = flat_terrain(16, 16);
        let heights = [5.0, 7.0, 9.0, 6.0, 8.0, 10.0, 5.5, 12.0, 9.5];
        for (k, h) in heights.iter().enumerate() {
            set_height(&mut terrain, 7 + k as i32 % 3, 7 + k as i32 / 3, *h);
        }
        let report = terrain.flatten(Vector2i::new(8, 8), 3, &mut NoUndo).unwrap();
        for y in 7..10 {
            for x in 7..10 {
                assert_eq!(terrain.cell_at(x, y).unwrap().height, 5.0);
            }
        }
        assert_eq!(terrain.cell_at(6, 8).unwrap().height, 0.0);
        assert_eq!(report.rebuilt, CellRect::new(5, 5, 12, 12));
    }

    #[test]
    fn test_flatten_even_brush() {
        let mut terrain = flat_terrain(16, 16);
        // Brush of 4 at (8, 8) covers cells 6..10 on both axes.
        let heights = [10.0, 20.0, 5.0, 30.0];
        for y in 6..10 {
            for x in 6..10 {
                set_height(&mut terrain, x, y, heights[((x + y) % 4) as usize]);
            }
        }
        set_height(&mut terrain, 5, 8, 12.0);
        set_height(&mut terrain, 10, 8, 14.0);

        let report = terrain.flatten(Vector2i::new(8, 8), 4, &mut NoUndo).unwrap();
        for y in 6..10 {
            for x in 6..10 {
                assert_eq!(terrain.cell_at(x, y).unwrap().height, 5.0);
            }
        }
        assert_eq!(terrain.cell_at(5, 8).unwrap().height, 12.0);
        assert_eq!(terrain.cell_at(10, 8).unwrap().height, 14.0);
        assert_eq!(report.rebuilt, CellRect::new(4, 4, 12, 12));
    }

    #[test]
    fn test_smooth_scenario() {
        let mut terrain = flat_terrain(16, 16);
        // Brush of 2 covers cells 7..9 on both axes.
        set_height(&mut terrain, 7, 7, 0.0);
        set_height(&mut terrain, 8, 7, 10.0);
        set_height(&mut terrain, 7, 8, 0.0);
        set_height(&mut terrain, 8, 8, 10.0);
        terrain.smooth(Vector2i::new(8, 8), 2, &mut NoUndo).unwrap();
        assert_eq!(terrain.cell_at(7, 7).unwrap().height, 2.5);
        assert_eq!(terrain.cell_at(8, 7).unwrap().height, 7.5);
    }

    #[test]
    fn test_level_ground_modify_is_noop() {
        let mut terrain = flat_terrain(16, 16);
        let mut history = UndoHistory::new(8);
        for op in [ModifyOp::Smooth, ModifyOp::Flatten, ModifyOp::Noise] {
            assert!(terrain.modify(Vector2i::new(4, 4), 3, op, &mut history).is_none());
        }
        history.commit();
        assert_eq!(history.undo_count(), 0);
    }

    #[test]
    fn test_degenerate_brushes_are_noops() {
        let mut terrain = flat_terrain(16, 16);
        terrain.flush_dirty_tiles(&mut CountingRenderer { released: 0, uploaded: Vec::new() });
        assert!(terrain.raise_lower(Vector2i::new(4, 4), 0, 1.0, &mut NoUndo).is_none());
        assert!(terrain.raise_lower(Vector2i::new(4, 4), 3, 0.0, &mut NoUndo).is_none());
        let grass = TextureHandle::new("grass");
        assert!(terrain
            .paint_grass(Vector2i::new(4, 4), 3, &grass, 0.0, 1.0, &mut NoUndo)
            .unwrap()
            .is_none());
        assert!(terrain.dirty_tiles().is_empty());
    }

    #[test]
    fn test_raise_uniform_and_weighted() {
        let mut terrain = flat_terrain(16, 16);
        terrain.raise_lower(Vector2i::new(4, 4), 3, 2.0, &mut NoUndo).unwrap();
        assert_eq!(terrain.cell_at(3, 3).unwrap().height, 2.0);
        assert_eq!(terrain.cell_at(5, 5).unwrap().height, 2.0);
        assert_eq!(terrain.cell_at(6, 5).unwrap().height, 0.0);

        // Now uneven under a wider brush: the raised block stays put.
        terrain.raise_lower(Vector2i::new(4, 4), 5, 1.0, &mut NoUndo).unwrap();
        assert_eq!(terrain.cell_at(4, 4).unwrap().height, 2.0);
        assert_eq!(terrain.cell_at(2, 2).unwrap().height, 1.0);
    }

    #[test]
    fn test_mountain_and_valley() {
        let mut terrain = flat_terrain(32, 32);
        terrain.mountain_valley(Vector2i::new(10, 10), 8, 2.0, &mut NoUndo).unwrap();
        assert!(terrain.cell_at(10, 10).unwrap().height > 0.0);
        assert_eq!(terrain.cell_at(6, 10).unwrap().height, 0.0);

        terrain.mountain_valley(Vector2i::new(20, 20), 8, -2.0, &mut NoUndo).unwrap();
        assert!(terrain.cell_at(20, 20).unwrap().height < 0.0);
    }

    #[test]
    fn test_paint_texture_minimal_extent() {
        let mut terrain = flat_terrain(40, 10);
        terrain.flush_dirty_tiles(&mut CountingRenderer { released: 0, uploaded: Vec::new() });
        let rock = TextureHandle::new("rock");

        // Cell (11, 11) sits one cell inside tile (1, 1).
        let report = terrain
            .paint_texture(Vector2i::new(11, 11), 1, &rock, &mut NoUndo)
            .unwrap()
            .unwrap();
        assert_eq!(report.resolved, Some(CellRect::new(10, 10, 13, 13)));
        assert_eq!(report.rebuilt, CellRect::new(9, 9, 14, 14));
        // Padded rect reaches into tiles (0,0), (1,0), (0,1) and (1,1) only.
        assert_eq!(report.tiles, vec![0, 1, 4, 5]);
        assert_eq!(terrain.dirty_tiles(), vec![0, 1, 4, 5]);

        let border: Vec<_> = (0..40)
            .flat_map(|y| (0..40).map(move |x| (x, y)))
            .filter(|&(x, y)| terrain.cell_at(x, y).unwrap().is_border())
            .collect();
        assert_eq!(border.len(), 9);
        let diagonal = terrain.cell_at(10, 10).unwrap();
        assert_eq!(diagonal.blend_texture, 1);
        assert_eq!(diagonal.blend_weights[CORNER_BOTTOM_RIGHT], 255);
        assert_eq!(diagonal.blend_weights[CORNER_TOP_LEFT], 0);

        // Repainting the same texture changes nothing.
        assert!(terrain
            .paint_texture(Vector2i::new(11, 11), 1, &rock, &mut NoUndo)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_paint_texture_reports_texture_limit() {
        let mut terrain = flat_terrain(16, 16);
        terrain.set_texture_capacity(Some(1));
        let result = terrain.paint_texture(Vector2i::new(4, 4), 1, &TextureHandle::new("extra"), &mut NoUndo);
        assert!(matches!(result, Err(TerrainError::TextureLimit { capacity: 1 })));
    }

    #[test]
    fn test_grass_paint_and_remove() {
        let mut terrain = flat_terrain(32, 8);
        let grass = TextureHandle::new("grass");
        let report = terrain
            .paint_grass(Vector2i::new(10, 10), 5, &grass, 2.0, 1.0, &mut NoUndo)
            .unwrap()
            .unwrap();
        assert_eq!(report.rebuilt, CellRect::new(8, 8, 13, 13));
        assert_eq!(terrain.grass().len(), 5);
        assert!(terrain.tiles()[terrain.grid().tile_index(1, 1)]
            .batches
            .iter()
            .any(|b| b.key.kind == BatchKind::Grass));

        let survivor = GrassInstance {
            height: 1.0,
            width: 1.0,
            pos_x: 30.5,
            pos_z: 30.5,
            rotation: 0.3,
            texture: 1,
        };
        terrain.grass.push(survivor);
        terrain.remove_grass(Vector2i::new(10, 10), 5, &mut NoUndo).unwrap();
        assert_eq!(terrain.grass(), &[survivor]);
        assert!(terrain.remove_grass(Vector2i::new(10, 10), 5, &mut NoUndo).is_none());
    }

    #[test]
    fn test_undo_restores_heights_bit_for_bit() {
        let mut terrain = flat_terrain(16, 8);
        set_height(&mut terrain, 3, 3, 1.234_567);
        let original = terrain.terrain_snapshot();

        let mut history = UndoHistory::new(8);
        terrain.noise(Vector2i::new(3, 3), 4, &mut history).unwrap();
        history.commit();
        assert_ne!(terrain.terrain_snapshot(), original);

        assert!(history.undo(&mut terrain).unwrap());
        let restored = terrain.terrain_snapshot();
        for (a, b) in restored.cells.iter().zip(&original.cells) {
            assert_eq!(a.height.to_bits(), b.height.to_bits());
            assert_eq!(a.texture, b.texture);
        }

        assert!(history.redo(&mut terrain).unwrap());
        assert_ne!(terrain.terrain_snapshot(), original);
    }

    #[test]
    fn test_undo_grass_paint() {
        let mut terrain = flat_terrain(16, 8);
        let mut history = UndoHistory::new(8);
        terrain
            .paint_grass(Vector2i::new(5, 5), 3, &TextureHandle::new("g"), 1.0, 1.0, &mut history)
            .unwrap();
        assert_eq!(terrain.grass().len(), 3);
        history.undo(&mut terrain).unwrap();
        assert!(terrain.grass().is_empty());
    }

    #[test]
    fn test_restore_rejects_wrong_length() {
        let mut terrain = flat_terrain(16, 8);
        let result = terrain.restore_terrain_snapshot(&TerrainSnapshot::default());
        assert!(matches!(result, Err(TerrainError::SnapshotLength { .. })));
    }

    #[test]
    fn test_exact_height_query() {
        let mut terrain = flat_terrain(16, 8);
        set_height(&mut terrain, 4, 4, 3.0);
        let p = terrain.world_position(4, 4);
        let sample = terrain.exact_height_at(p.x, p.z);
        assert!((sample.height - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_tile_pick() {
        let mut terrain = flat_terrain(16, 8);
        let d = terrain.grid().displacement;
        let ray = Ray::new(Vector3::new(d.x + 5.5, 50.0, d.z + 9.25), Vector3::new(0.0, -1.0, 0.0));
        assert!(terrain.tiles().iter().all(|t| !t.has_collision()));
        assert_eq!(terrain.tile_pick(&ray), Some(Vector2i::new(5, 9)));
        assert!(terrain.tiles().iter().any(|t| t.has_collision()));

        let miss = Ray::new(Vector3::new(500.0, 50.0, 500.0), Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(terrain.tile_pick(&miss), None);
    }

    #[test]
    fn test_objects_follow_height_edits() {
        let mut terrain = flat_terrain(32, 8);
        let template = ScatterTemplate::new("rock", Aabb::new(Vector3::ZERO, Vector3::new(1.0, 0.0, 1.0)));
        terrain.insert_object(EmbeddedObject {
            id: 7,
            template: template.name.clone(),
            position: terrain.world_position(10, 10),
            rotation_y: 0.0,
        });

        let mut history = UndoHistory::new(8);
        terrain.raise_lower(Vector2i::new(10, 10), 3, 4.0, &mut history).unwrap();
        assert_eq!(terrain.object(7).unwrap().position.y, 4.0);

        history.undo(&mut terrain).unwrap();
        assert_eq!(terrain.object(7).unwrap().position.y, 0.0);
    }

    #[test]
    fn test_distribute_and_resort_objects() {
        let mut terrain = flat_terrain(32, 8);
        let template = ScatterTemplate::new("tree", Aabb::new(Vector3::ZERO, Vector3::new(4.0, 10.0, 4.0)));
        let ids = terrain.distribute_meshes(&template, 0.5, &mut NoUndo);
        assert_eq!(ids.len(), 32);
        assert_eq!(terrain.objects().count(), 32);

        for &id in &ids {
            let object = terrain.object(id).unwrap();
            let local = terrain.grid().world_to_local(object.position);
            let expected = terrain.grid().tile_of_local_clamped(local.x, local.z);
            assert_eq!(terrain.object_tile(id), Some(expected));
        }

        let corner = Vector2i::new(3, 3);
        let id = *ids.iter().find(|&&id| terrain.object_tile(id) != Some(corner)).unwrap();
        let far = terrain.world_position(31, 31);
        terrain.set_object_position(id, far);
        let mut history = UndoHistory::new(4);
        assert!(terrain.resort_object(id, &mut history));
        assert_eq!(terrain.object_tile(id), Some(corner));
        assert!(!terrain.resort_object(id, &mut NoUndo));
    }

    #[test]
    fn test_replace_texture_rebuilds_users_only() {
        let mut terrain = flat_terrain(16, 8);
        let mut renderer = CountingRenderer {
            released: 0,
            uploaded: Vec::new(),
        };
        let rock = TextureHandle::new("rock");
        terrain.paint_texture(Vector2i::new(2, 2), 1, &rock, &mut NoUndo).unwrap();
        terrain.flush_dirty_tiles(&mut renderer);

        let snow = TextureHandle::new("snow");
        assert!(terrain.replace_texture(1, &snow, &mut NoUndo));
        assert_eq!(terrain.dirty_tiles(), vec![0]);
        assert!(!terrain.replace_texture(1, &snow, &mut NoUndo));
        assert!(!terrain.replace_texture(9, &snow, &mut NoUndo));
        assert_eq!(rock.ref_count(), 1);
    }

    #[test]
    fn test_texture_height_thresholds() {
        let mut terrain = flat_terrain(16, 16);
        set_height(&mut terrain, 1, 1, 10.0);
        set_height(&mut terrain, 2, 2, 5.0);
        terrain.set_texture_height_thresholds(0.2, 0.9);
        assert_eq!(terrain.cell_at(0, 0).unwrap().user_texture, 0);
        assert_eq!(terrain.cell_at(2, 2).unwrap().user_texture, 1);
        assert_eq!(terrain.cell_at(1, 1).unwrap().user_texture, 2);
        assert!(terrain.cell_at(0, 0).unwrap().is_border());
    }

    #[test]
    fn test_lighting_and_attributes_rebuild() {
        let mut terrain = flat_terrain(16, 16);
        let mut history = UndoHistory::new(4);
        assert!(terrain.set_lighting_type(LightingType::None, &mut history));
        assert!(!terrain.tiles()[0].batches[0].flags.lit);
        assert!(!terrain.set_lighting_type(LightingType::None, &mut history));
        history.undo(&mut terrain).unwrap();
        assert_eq!(terrain.lighting_type(), LightingType::Dynamic);

        let mut attributes = terrain.attributes();
        assert!(!terrain.apply_attributes(&attributes));
        attributes.texture_scale = 1.0;
        assert!(terrain.apply_attributes(&attributes));
        let v = terrain.tiles()[0].batches[0].vertices[1].position;
        assert_eq!(terrain.tiles()[0].batches[0].vertices[1].uv, Vector2::new(v.x, v.z));
    }

    #[test]
    fn test_duplicate_copies_data() {
        let mut terrain = flat_terrain(16, 8);
        set_height(&mut terrain, 2, 2, 6.0);
        let copy = terrain.duplicate();
        assert_eq!(copy.terrain_snapshot(), terrain.terrain_snapshot());
        assert_eq!(copy.material_count(), 1);
        assert!(copy.textures().get(0).unwrap().same(terrain.textures().get(0).unwrap()));
    }

    #[test]
    fn test_heightmap_load_bands_and_grass() {
        let mut terrain = Terrain::new(config(4));
        let samples: Vec<f32> = (0..64).map(|i| if i < 32 { 0.0 } else { 100.0 }).collect();
        let textures = [TextureHandle::new("a"), TextureHandle::new("b"), TextureHandle::new("c")];
        let grass = TextureHandle::new("grass");
        terrain
            .load_from_heightmap(8, 8, 10, &samples, &textures, Some(&grass))
            .unwrap();

        assert_eq!(terrain.store().max_height, 100.0);
        assert_eq!(terrain.texture_scale(), 0.006);
        assert_eq!(terrain.cell_at(0, 0).unwrap().user_texture, 0);
        assert_eq!(terrain.cell_at(0, 7).unwrap().user_texture, 2);
        assert_eq!(terrain.material_count(), 4);
        // Grass only grows on the low half.
        assert!(!terrain.grass().is_empty());
        assert!(terrain.grass().iter().all(|g| g.pos_z < 40.0));
    }
}
