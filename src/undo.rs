//! Undo support for terrain edits.
//!
//! Edits report what they changed to an injected `UndoJournal`. The journal
//! methods all default to no-ops, so `NoUndo` costs nothing. `UndoHistory`
//! is the in-crate journal: it groups entries into actions and can revert
//! or replay them on a `Terrain`.

use godot::prelude::*;

use crate::config::LightingType;
use crate::error::{TerrainError, TerrainResult};
use crate::grass_planter::GrassInstance;
use crate::heightfield::Heightfield;
use crate::scatter::EmbeddedObject;
use crate::terrain::Terrain;
use crate::texture_table::TextureHandle;

/// Floats per cell in the flat terrain snapshot layout.
const TERRAIN_FLOATS_PER_CELL: usize = 2;
/// Floats per patch in the flat grass snapshot layout.
const GRASS_FLOATS_PER_PATCH: usize = 6;

/// Authored data of one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellSample {
    pub height: f32,
    pub texture: i32,
}

/// Heights and user textures of every cell, row-major.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TerrainSnapshot {
    pub cells: Vec<CellSample>,
}

impl TerrainSnapshot {
    pub fn capture(store: &Heightfield) -> Self {
        Self {
            cells: store
                .cells()
                .iter()
                .map(|c| CellSample {
                    height: c.height,
                    texture: c.user_texture,
                })
                .collect(),
        }
    }

    /// Flat layout: `[height, texture as f32]` per cell.
    pub fn to_flat(&self) -> Vec<f32> {
        self.cells
            .iter()
            .flat_map(|c| [c.height, c.texture as f32])
            .collect()
    }

    pub fn from_flat(values: &[f32], cell_count: usize) -> TerrainResult<Self> {
        let expected = cell_count * TERRAIN_FLOATS_PER_CELL;
        if values.len() != expected {
            return Err(TerrainError::SnapshotLength {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            cells: values
                .chunks_exact(TERRAIN_FLOATS_PER_CELL)
                .map(|c| CellSample {
                    height: c[0],
                    texture: c[1] as i32,
                })
                .collect(),
        })
    }
}

/// Every grass patch, in storage order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GrassSnapshot {
    pub patches: Vec<GrassInstance>,
}

impl GrassSnapshot {
    pub fn capture(grass: &[GrassInstance]) -> Self {
        Self {
            patches: grass.to_vec(),
        }
    }

    /// Flat layout: the patch count's bit pattern as one float, then
    /// `[height, width, pos_x, pos_z, rotation, texture as f32]` per patch.
    pub fn to_flat(&self) -> Vec<f32> {
        let mut values = Vec::with_capacity(1 + self.patches.len() * GRASS_FLOATS_PER_PATCH);
        values.push(f32::from_bits(self.patches.len() as u32));
        for g in &self.patches {
            values.extend_from_slice(&[g.height, g.width, g.pos_x, g.pos_z, g.rotation, g.texture as f32]);
        }
        values
    }

    pub fn from_flat(values: &[f32]) -> TerrainResult<Self> {
        let Some((header, body)) = values.split_first() else {
            return Err(TerrainError::SnapshotLength {
                expected: 1,
                actual: 0,
            });
        };
        let count = header.to_bits() as usize;
        let expected = 1 + count * GRASS_FLOATS_PER_PATCH;
        if values.len() != expected {
            return Err(TerrainError::SnapshotLength {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            patches: body
                .chunks_exact(GRASS_FLOATS_PER_PATCH)
                .map(|p| GrassInstance {
                    height: p[0],
                    width: p[1],
                    pos_x: p[2],
                    pos_z: p[3],
                    rotation: p[4],
                    texture: p[5] as i32,
                })
                .collect(),
        })
    }
}

/// Sink for undo information produced by edits.
pub trait UndoJournal {
    /// Edits skip taking snapshots when this is false.
    fn is_recording(&self) -> bool {
        false
    }

    fn record_terrain(&mut self, _before: TerrainSnapshot, _after: TerrainSnapshot) {}

    fn record_grass(&mut self, _before: GrassSnapshot, _after: GrassSnapshot) {}

    fn record_object_move(&mut self, _id: u64, _from: Vector3, _to: Vector3) {}

    fn record_object_spawn(&mut self, _object: &EmbeddedObject) {}

    fn record_object_reparent(&mut self, _id: u64, _from: Vector2i, _to: Vector2i) {}

    fn record_texture_change(&mut self, _index: i32, _before: TextureHandle, _after: TextureHandle) {}

    fn record_lighting_change(&mut self, _before: LightingType, _after: LightingType) {}
}

/// Journal that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUndo;

impl UndoJournal for NoUndo {}

/// One reversible change.
#[derive(Clone, Debug)]
pub enum UndoEntry {
    Terrain {
        before: TerrainSnapshot,
        after: TerrainSnapshot,
    },
    Grass {
        before: GrassSnapshot,
        after: GrassSnapshot,
    },
    ObjectMove {
        id: u64,
        from: Vector3,
        to: Vector3,
    },
    ObjectSpawn(EmbeddedObject),
    ObjectReparent {
        id: u64,
        from: Vector2i,
        to: Vector2i,
    },
    Texture {
        index: i32,
        before: TextureHandle,
        after: TextureHandle,
    },
    Lighting {
        before: LightingType,
        after: LightingType,
    },
}

impl UndoEntry {
    fn revert(&self, terrain: &mut Terrain) -> TerrainResult<()> {
        match self {
            UndoEntry::Terrain { before, .. } => terrain.restore_terrain_snapshot(before)?,
            UndoEntry::Grass { before, .. } => terrain.restore_grass_snapshot(before),
            UndoEntry::ObjectMove { id, from, .. } => {
                terrain.set_object_position(*id, *from);
            }
            UndoEntry::ObjectSpawn(object) => {
                terrain.remove_object(object.id);
            }
            UndoEntry::ObjectReparent { id, from, .. } => {
                terrain.move_object_to_tile(*id, *from);
            }
            UndoEntry::Texture { index, before, .. } => {
                terrain.replace_texture(*index, before, &mut NoUndo);
            }
            UndoEntry::Lighting { before, .. } => {
                terrain.set_lighting_type(*before, &mut NoUndo);
            }
        }
        Ok(())
    }

    fn reapply(&self, terrain: &mut Terrain) -> TerrainResult<()> {
        match self {
            UndoEntry::Terrain { after, .. } => terrain.restore_terrain_snapshot(after)?,
            UndoEntry::Grass { after, .. } => terrain.restore_grass_snapshot(after),
            UndoEntry::ObjectMove { id, to, .. } => {
                terrain.set_object_position(*id, *to);
            }
            UndoEntry::ObjectSpawn(object) => terrain.insert_object(object.clone()),
            UndoEntry::ObjectReparent { id, to, .. } => {
                terrain.move_object_to_tile(*id, *to);
            }
            UndoEntry::Texture { index, after, .. } => {
                terrain.replace_texture(*index, after, &mut NoUndo);
            }
            UndoEntry::Lighting { after, .. } => {
                terrain.set_lighting_type(*after, &mut NoUndo);
            }
        }
        Ok(())
    }
}

/// Entries produced by one user action.
#[derive(Clone, Debug, Default)]
pub struct UndoAction {
    pub entries: Vec<UndoEntry>,
}

/// Action-based undo/redo history.
pub struct UndoHistory {
    /// Stack of committed actions (most recent at the end)
    past: Vec<UndoAction>,
    /// Stack of undone actions available for redo (most recent at the end)
    future: Vec<UndoAction>,
    /// Entries of the action in progress
    pending: Vec<UndoEntry>,
    /// Maximum number of undo actions to keep
    max_entries: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(64)
    }
}

impl UndoHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            pending: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    fn push(&mut self, entry: UndoEntry) {
        self.pending.push(entry);
    }

    /// Close the action in progress. New actions invalidate redo.
    pub fn commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.future.clear();
        self.past.push(UndoAction {
            entries: std::mem::take(&mut self.pending),
        });
        while self.past.len() > self.max_entries {
            self.past.remove(0);
        }
    }

    /// Revert the most recent action. Returns false if there was none.
    pub fn undo(&mut self, terrain: &mut Terrain) -> TerrainResult<bool> {
        self.commit();
        let Some(action) = self.past.pop() else {
            return Ok(false);
        };
        for entry in action.entries.iter().rev() {
            entry.revert(terrain)?;
        }
        self.future.push(action);
        Ok(true)
    }

    /// Replay the most recently undone action. Returns false if there was none.
    pub fn redo(&mut self, terrain: &mut Terrain) -> TerrainResult<bool> {
        let Some(action) = self.future.pop() else {
            return Ok(false);
        };
        for entry in &action.entries {
            entry.reapply(terrain)?;
        }
        self.past.push(action);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty() || !self.pending.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.pending.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.past.len()
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }
}

impl UndoJournal for UndoHistory {
    fn is_recording(&self) -> bool {
        true
    }

    fn record_terrain(&mut self, before: TerrainSnapshot, after: TerrainSnapshot) {
        self.push(UndoEntry::Terrain { before, after });
    }

    fn record_grass(&mut self, before: GrassSnapshot, after: GrassSnapshot) {
        self.push(UndoEntry::Grass { before, after });
    }

    fn record_object_move(&mut self, id: u64, from: Vector3, to: Vector3) {
        self.push(UndoEntry::ObjectMove { id, from, to });
    }

    fn record_object_spawn(&mut self, object: &EmbeddedObject) {
        self.push(UndoEntry::ObjectSpawn(object.clone()));
    }

    fn record_object_reparent(&mut self, id: u64, from: Vector2i, to: Vector2i) {
        self.push(UndoEntry::ObjectReparent { id, from, to });
    }

    fn record_texture_change(&mut self, index: i32, before: TextureHandle, after: TextureHandle) {
        self.push(UndoEntry::Texture { index, before, after });
    }

    fn record_lighting_change(&mut self, before: LightingType, after: LightingType) {
        self.push(UndoEntry::Lighting { before, after });
    }
}
