//! Terrain persistence.
//!
//! Binary layout (all little-endian):
//!
//! ```text
//! bounding box      6 x f32   min xyz, max xyz
//! flags             u32       bit 0: grass uses wind
//! grid              8 x i32   side length, cell size, tile size,
//!                             tile count x/y, cell count x/y, cells per tile side
//! lighting          i32
//! displacement      3 x f32
//! texture scale     f32
//! textures          u32 count, then per texture: u32 byte length + UTF-8 name
//! cells             u32 count, then per cell: f32 height, i32 texture
//! grass             u32 count, then per patch: 5 x f32, i32 texture
//! tiles             u32 count, then per tile: i32 id
//! ```
//!
//! Texture names are turned back into handles by a `TextureResolver`.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use godot::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::LightingType;
use crate::debug_log::debug_log;
use crate::error::{TerrainError, TerrainResult};
use crate::grass_planter::GrassInstance;
use crate::grid::GridParams;
use crate::terrain::Terrain;
use crate::texture_table::TextureHandle;

const FLAG_GRASS_USES_WIND: u32 = 1;
/// Longest texture reference accepted when reading.
const MAX_TEXTURE_NAME: usize = 4096;

/// Maps persisted texture names back to live handles.
pub trait TextureResolver {
    fn resolve(&mut self, name: &str) -> Option<TextureHandle>;
}

impl<F> TextureResolver for F
where
    F: FnMut(&str) -> Option<TextureHandle>,
{
    fn resolve(&mut self, name: &str) -> Option<TextureHandle> {
        self(name)
    }
}

/// Resolver over a fixed set of known handles.
#[derive(Clone, Debug, Default)]
pub struct NamedTextures {
    known: HashMap<String, TextureHandle>,
}

impl NamedTextures {
    pub fn new(handles: impl IntoIterator<Item = TextureHandle>) -> Self {
        Self {
            known: handles
                .into_iter()
                .map(|h| (h.name().to_string(), h))
                .collect(),
        }
    }
}

impl TextureResolver for NamedTextures {
    fn resolve(&mut self, name: &str) -> Option<TextureHandle> {
        self.known.get(name).cloned()
    }
}

/// Editable attributes shown in property inspectors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerrainAttributes {
    pub texture_scale: f32,
    pub grass_uses_wind: bool,
}

impl TerrainAttributes {
    pub fn from_toml_str(text: &str) -> TerrainResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> TerrainResult<String> {
        Ok(toml::to_string(self)?)
    }
}

fn write_vector3<W: Write>(w: &mut W, v: Vector3) -> TerrainResult<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)?;
    Ok(())
}

fn read_vector3<R: Read>(r: &mut R) -> TerrainResult<Vector3> {
    let x = r.read_f32::<LittleEndian>()?;
    let y = r.read_f32::<LittleEndian>()?;
    let z = r.read_f32::<LittleEndian>()?;
    Ok(Vector3::new(x, y, z))
}

fn write_count<W: Write>(w: &mut W, count: usize) -> TerrainResult<()> {
    let count = u32::try_from(count).map_err(|_| TerrainError::Format(format!("count {} too large", count)))?;
    w.write_u32::<LittleEndian>(count)?;
    Ok(())
}

fn read_count<R: Read>(r: &mut R) -> TerrainResult<usize> {
    Ok(r.read_u32::<LittleEndian>()? as usize)
}

/// Write `terrain` in the binary layout.
pub fn write_terrain<W: Write>(terrain: &Terrain, w: &mut W) -> TerrainResult<()> {
    let grid = terrain.grid();
    let bounds = terrain.bounding_box();
    write_vector3(w, bounds.position)?;
    write_vector3(w, bounds.position + bounds.size)?;

    let flags = if terrain.grass_uses_wind() { FLAG_GRASS_USES_WIND } else { 0 };
    w.write_u32::<LittleEndian>(flags)?;

    for value in [
        grid.side_length,
        grid.cell_size,
        grid.tile_size,
        grid.tile_count_x,
        grid.tile_count_y,
        grid.cell_count_x,
        grid.cell_count_y,
        grid.cells_per_tile_side,
        terrain.lighting_type().to_i32(),
    ] {
        w.write_i32::<LittleEndian>(value)?;
    }
    write_vector3(w, grid.displacement)?;
    w.write_f32::<LittleEndian>(terrain.texture_scale())?;

    write_count(w, terrain.textures().len())?;
    for texture in terrain.textures().iter() {
        let name = texture.name().as_bytes();
        write_count(w, name.len())?;
        w.write_all(name)?;
    }

    let cells = terrain.store().cells();
    write_count(w, cells.len())?;
    for cell in cells {
        w.write_f32::<LittleEndian>(cell.height)?;
        w.write_i32::<LittleEndian>(cell.user_texture)?;
    }

    write_count(w, terrain.grass().len())?;
    for g in terrain.grass() {
        for value in [g.height, g.width, g.pos_x, g.pos_z, g.rotation] {
            w.write_f32::<LittleEndian>(value)?;
        }
        w.write_i32::<LittleEndian>(g.texture)?;
    }

    let ids = terrain.tile_ids();
    write_count(w, ids.len())?;
    for id in ids {
        w.write_i32::<LittleEndian>(id)?;
    }

    debug_log(&format!(
        "[serialize] wrote {} cells, {} grass patches, {} textures",
        cells.len(),
        terrain.grass().len(),
        terrain.textures().len()
    ));
    Ok(())
}

/// Binary image of `terrain`.
pub fn terrain_to_bytes(terrain: &Terrain) -> TerrainResult<Vec<u8>> {
    let mut bytes = Vec::new();
    write_terrain(terrain, &mut bytes)?;
    Ok(bytes)
}

/// Read a terrain written by `write_terrain` into `terrain`, replacing its
/// data and rebuilding every tile. `terrain` is left untouched on error
/// unless the failure happens after validation.
pub fn read_terrain<R: Read>(
    terrain: &mut Terrain,
    r: &mut R,
    resolver: &mut dyn TextureResolver,
) -> TerrainResult<()> {
    let min = read_vector3(r)?;
    let max = read_vector3(r)?;
    let flags = r.read_u32::<LittleEndian>()?;

    let mut header = [0i32; 9];
    for value in &mut header {
        *value = r.read_i32::<LittleEndian>()?;
    }
    let [side_length, cell_size, tile_size, tile_count_x, tile_count_y, cell_count_x, cell_count_y, per_tile, lighting] =
        header;
    let displacement = read_vector3(r)?;
    let texture_scale = r.read_f32::<LittleEndian>()?;

    let grid = GridParams::new(side_length, cell_size, per_tile)?;
    let stored = (tile_size, tile_count_x, tile_count_y, cell_count_x, cell_count_y);
    let derived = (
        grid.tile_size,
        grid.tile_count_x,
        grid.tile_count_y,
        grid.cell_count_x,
        grid.cell_count_y,
    );
    if stored != derived || displacement != grid.displacement {
        return Err(TerrainError::Format(format!(
            "grid header {:?} does not match side length {} and cell size {}",
            stored, side_length, cell_size
        )));
    }
    let lighting = LightingType::from_i32(lighting)
        .ok_or_else(|| TerrainError::Format(format!("unknown lighting type {}", lighting)))?;

    let texture_count = read_count(r)?;
    let mut textures = Vec::new();
    for _ in 0..texture_count {
        let len = read_count(r)?;
        if len > MAX_TEXTURE_NAME {
            return Err(TerrainError::Format(format!("texture reference of {} bytes", len)));
        }
        let mut bytes = vec![0u8; len];
        r.read_exact(&mut bytes)?;
        let name = String::from_utf8(bytes).map_err(|e| TerrainError::Format(e.to_string()))?;
        let handle = resolver
            .resolve(&name)
            .ok_or(TerrainError::UnresolvedTexture(name))?;
        textures.push(handle);
    }

    let cell_count = read_count(r)?;
    if cell_count != grid.cell_count() {
        return Err(TerrainError::Format(format!(
            "{} cells stored for a {}x{} grid",
            cell_count, grid.cell_count_x, grid.cell_count_y
        )));
    }
    let mut cells = Vec::with_capacity(cell_count);
    for _ in 0..cell_count {
        let height = r.read_f32::<LittleEndian>()?;
        let texture = r.read_i32::<LittleEndian>()?;
        cells.push((height, texture));
    }

    let grass_count = read_count(r)?;
    let mut grass = Vec::new();
    for _ in 0..grass_count {
        let mut values = [0f32; 5];
        for value in &mut values {
            *value = r.read_f32::<LittleEndian>()?;
        }
        let [height, width, pos_x, pos_z, rotation] = values;
        grass.push(GrassInstance {
            height,
            width,
            pos_x,
            pos_z,
            rotation,
            texture: r.read_i32::<LittleEndian>()?,
        });
    }

    let tile_count = read_count(r)?;
    if tile_count != grid.tile_count() {
        return Err(TerrainError::Format(format!(
            "{} tile ids stored for {} tiles",
            tile_count,
            grid.tile_count()
        )));
    }
    let mut tile_ids = Vec::with_capacity(tile_count);
    for _ in 0..tile_count {
        tile_ids.push(r.read_i32::<LittleEndian>()?);
    }

    terrain.set_persisted_state(texture_scale, flags & FLAG_GRASS_USES_WIND != 0, lighting);
    terrain.install(grid, max.y - min.y, cells, textures, grass, &tile_ids)?;
    debug_log(&format!("[serialize] read {} cells, {} grass patches", cell_count, grass_count));
    Ok(())
}

pub fn terrain_from_bytes(
    terrain: &mut Terrain,
    mut bytes: &[u8],
    resolver: &mut dyn TextureResolver,
) -> TerrainResult<()> {
    read_terrain(terrain, &mut bytes, resolver)
}
