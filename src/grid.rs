//! Grid geometry shared by the store, the mesh builder and the brushes.
//!
//! Provides the immutable grid parameters derived at (re)generation time and
//! half-open cell rectangles used to describe edit and rebuild regions.

use godot::prelude::*;

use crate::error::{TerrainError, TerrainResult};

/// Immutable parameters of a generated grid.
///
/// Invariant: `cell_count_x == tile_count_x * cells_per_tile_side` (same for Y)
/// and `side_length == tile_count_x * tile_size`.
#[derive(Clone, Debug, PartialEq)]
pub struct GridParams {
    /// Edge length of a cell in world units
    pub cell_size: i32,
    /// Edge length of the whole terrain, rounded down to whole tiles
    pub side_length: i32,
    pub cells_per_tile_side: i32,
    /// Edge length of a tile in world units (cell_size * cells_per_tile_side)
    pub tile_size: i32,
    pub tile_count_x: i32,
    pub tile_count_y: i32,
    pub cell_count_x: i32,
    pub cell_count_y: i32,
    /// World offset of the cell (0, 0) corner; centers the grid on the origin
    pub displacement: Vector3,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            cell_size: 0,
            side_length: 0,
            cells_per_tile_side: 0,
            tile_size: 0,
            tile_count_x: 0,
            tile_count_y: 0,
            cell_count_x: 0,
            cell_count_y: 0,
            displacement: Vector3::ZERO,
        }
    }
}

impl GridParams {
    /// Derive grid parameters for a requested side length.
    ///
    /// The side length is rounded down to whole tiles, with at least one tile
    /// per axis.
    pub fn new(side_length: i32, cell_size: i32, cells_per_tile_side: i32) -> TerrainResult<Self> {
        if side_length <= 0 || cell_size <= 0 || cells_per_tile_side <= 0 {
            return Err(TerrainError::InvalidGrid {
                side_length,
                cell_size,
            });
        }

        let tile_size = cell_size
            .checked_mul(cells_per_tile_side)
            .ok_or(TerrainError::InvalidGrid {
                side_length,
                cell_size,
            })?;
        let tile_count = (side_length / tile_size).max(1);
        let side_length = tile_count * tile_size;
        let half = side_length as f32 / 2.0;

        Ok(Self {
            cell_size,
            side_length,
            cells_per_tile_side,
            tile_size,
            tile_count_x: tile_count,
            tile_count_y: tile_count,
            cell_count_x: tile_count * cells_per_tile_side,
            cell_count_y: tile_count * cells_per_tile_side,
            displacement: Vector3::new(-half, 0.0, -half),
        })
    }

    pub fn cell_count(&self) -> usize {
        (self.cell_count_x.max(0) as usize) * (self.cell_count_y.max(0) as usize)
    }

    pub fn tile_count(&self) -> usize {
        (self.tile_count_x.max(0) as usize) * (self.tile_count_y.max(0) as usize)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.cell_count_x && y < self.cell_count_y
    }

    pub fn clamp_cell(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(0, (self.cell_count_x - 1).max(0)),
            y.clamp(0, (self.cell_count_y - 1).max(0)),
        )
    }

    /// Rectangle covering every cell of the grid.
    pub fn full_rect(&self) -> CellRect {
        CellRect::new(0, 0, self.cell_count_x, self.cell_count_y)
    }

    /// Cell footprint of tile `(tx, ty)`.
    pub fn tile_rect(&self, tx: i32, ty: i32) -> CellRect {
        let n = self.cells_per_tile_side;
        CellRect::new(tx * n, ty * n, (tx + 1) * n, (ty + 1) * n)
    }

    /// Row-major tile index.
    pub fn tile_index(&self, tx: i32, ty: i32) -> usize {
        (ty * self.tile_count_x + tx) as usize
    }

    pub fn tile_coord(&self, index: usize) -> Vector2i {
        let index = index as i32;
        Vector2i::new(index % self.tile_count_x, index / self.tile_count_x)
    }

    /// Tile covering a terrain-local position, `None` outside the grid.
    pub fn tile_of_local(&self, local_x: f32, local_z: f32) -> Option<Vector2i> {
        if self.tile_size <= 0 || local_x < 0.0 || local_z < 0.0 {
            return None;
        }
        let tx = (local_x / self.tile_size as f32) as i32;
        let ty = (local_z / self.tile_size as f32) as i32;
        (tx < self.tile_count_x && ty < self.tile_count_y).then(|| Vector2i::new(tx, ty))
    }

    /// Tile covering a terrain-local position, clamped onto the grid.
    pub fn tile_of_local_clamped(&self, local_x: f32, local_z: f32) -> Vector2i {
        let size = self.tile_size.max(1) as f32;
        Vector2i::new(
            ((local_x / size) as i32).clamp(0, (self.tile_count_x - 1).max(0)),
            ((local_z / size) as i32).clamp(0, (self.tile_count_y - 1).max(0)),
        )
    }

    /// Cell containing a terrain-local position (truncating, unclamped).
    pub fn cell_of_local(&self, local_x: f32, local_z: f32) -> Vector2i {
        let size = self.cell_size.max(1) as f32;
        Vector2i::new((local_x / size) as i32, (local_z / size) as i32)
    }

    pub fn world_to_local(&self, world: Vector3) -> Vector3 {
        world - self.displacement
    }

    pub fn local_to_world(&self, local: Vector3) -> Vector3 {
        local + self.displacement
    }

    /// Axis-aligned bounds of the terrain volume in world space.
    pub fn bounding_box(&self, max_height: f32) -> Aabb {
        Aabb::new(
            self.displacement,
            Vector3::new(self.side_length as f32, max_height, self.side_length as f32),
        )
    }
}

/// Half-open rectangle of cells, `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl CellRect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Square of side `2 * half + 1` centered on `anchor`, grown by `border`.
    pub fn around(anchor: Vector2i, half: i32, border: i32) -> Self {
        Self::new(
            anchor.x - half - border,
            anchor.y - half - border,
            anchor.x + half + border + 1,
            anchor.y + half + border + 1,
        )
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// True when the two rectangles share at least one cell.
    pub fn intersects(&self, other: &CellRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x0 < other.x1
            && other.x0 < self.x1
            && self.y0 < other.y1
            && other.y0 < self.y1
    }

    pub fn padded(&self, border: i32) -> Self {
        Self::new(
            self.x0 - border,
            self.y0 - border,
            self.x1 + border,
            self.y1 + border,
        )
    }

    pub fn clamped(&self, grid: &GridParams) -> Self {
        Self::new(
            self.x0.clamp(0, grid.cell_count_x),
            self.y0.clamp(0, grid.cell_count_y),
            self.x1.clamp(0, grid.cell_count_x),
            self.y1.clamp(0, grid.cell_count_y),
        )
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..self.y1).flat_map(move |y| (x0..x1).map(move |x| (x, y)))
    }

    pub fn cell_count(&self) -> usize {
        (self.width() as usize) * (self.height() as usize)
    }
}
