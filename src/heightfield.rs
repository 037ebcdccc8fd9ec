//! Per-cell terrain data.
//!
//! The store is a dense row-major array (`index = y * cell_count_x + x`)
//! sized by the grid parameters. Raw indexing panics out of range; the
//! `*_clamped` accessors clamp onto the grid and are what geometry code uses.

use godot::prelude::*;

use crate::error::{TerrainError, TerrainResult};
use crate::grid::{CellRect, GridParams};
use crate::noise_field::TopologyField;

/// Corner order of `Cell::blend_weights`.
pub const CORNER_TOP_LEFT: usize = 0;
pub const CORNER_TOP_RIGHT: usize = 1;
pub const CORNER_BOTTOM_LEFT: usize = 2;
pub const CORNER_BOTTOM_RIGHT: usize = 3;

/// One grid cell. Only `height` and `user_texture` are authored; the rest is
/// derived by the blend resolver.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Cell {
    pub height: f32,
    /// Texture chosen by generation or painting
    pub user_texture: i32,
    /// Always equal to `user_texture` once resolved
    pub main_texture: i32,
    /// Neighboring texture blended in at the corners, or `main_texture`
    pub blend_texture: i32,
    /// Per-corner weight of `blend_texture` (TL, TR, BL, BR)
    pub blend_weights: [u8; 4],
}

impl Cell {
    pub fn is_border(&self) -> bool {
        self.blend_weights.iter().any(|&w| w != 0)
    }
}

/// Dense heightfield store.
#[derive(Clone, Debug, Default)]
pub struct Heightfield {
    grid: GridParams,
    cells: Vec<Cell>,
    /// Largest height the terrain was generated or loaded with
    pub max_height: f32,
}

impl Heightfield {
    pub fn new(grid: GridParams) -> Self {
        let cells = vec![Cell::default(); grid.cell_count()];
        Self {
            grid,
            cells,
            max_height: 0.0,
        }
    }

    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Row-major index of an in-range cell.
    pub fn cell_index(&self, x: i32, y: i32) -> usize {
        assert!(
            self.grid.in_bounds(x, y),
            "cell ({}, {}) outside {}x{} grid",
            x,
            y,
            self.grid.cell_count_x,
            self.grid.cell_count_y
        );
        (y * self.grid.cell_count_x + x) as usize
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&Cell> {
        if self.grid.in_bounds(x, y) {
            self.cells.get((y * self.grid.cell_count_x + x) as usize)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        if self.grid.in_bounds(x, y) {
            self.cells.get_mut((y * self.grid.cell_count_x + x) as usize)
        } else {
            None
        }
    }

    pub fn get_clamped(&self, x: i32, y: i32) -> &Cell {
        let (cx, cy) = self.grid.clamp_cell(x, y);
        &self.cells[self.cell_index(cx, cy)]
    }

    pub fn height_clamped(&self, x: i32, y: i32) -> f32 {
        self.get_clamped(x, y).height
    }

    /// Terrain-local position of the corner of cell `(x, y)`, clamped.
    pub fn local_position(&self, x: i32, y: i32) -> Vector3 {
        let (cx, cy) = self.grid.clamp_cell(x, y);
        let size = self.grid.cell_size as f32;
        Vector3::new(
            cx as f32 * size,
            self.cells[self.cell_index(cx, cy)].height,
            cy as f32 * size,
        )
    }

    /// World position of the corner of cell `(x, y)`, clamped.
    pub fn world_position(&self, x: i32, y: i32) -> Vector3 {
        self.grid.local_to_world(self.local_position(x, y))
    }

    /// Fill heights from a topology function and reset every cell to texture 0.
    pub fn fill_procedural(&mut self, field: &TopologyField) {
        let width = self.grid.cell_count_x;
        for (i, cell) in self.cells.iter_mut().enumerate() {
            let (x, y) = (i as i32 % width, i as i32 / width);
            *cell = Cell {
                height: field.sample(x, y),
                ..Cell::default()
            };
        }
    }

    /// Fill heights from a `width * height` sample array, clamping source
    /// coordinates. Returns the largest sample used (at least 0).
    pub fn fill_from_samples(&mut self, width: i32, height: i32, samples: &[f32]) -> TerrainResult<f32> {
        let expected = (width.max(0) as usize) * (height.max(0) as usize);
        if width <= 0 || height <= 0 || samples.len() < expected {
            return Err(TerrainError::InvalidHeightmap {
                width,
                height,
                expected,
                actual: samples.len(),
            });
        }

        let cells_x = self.grid.cell_count_x;
        let mut max_height = 0.0f32;
        for (i, cell) in self.cells.iter_mut().enumerate() {
            let sx = (i as i32 % cells_x).clamp(0, width - 1);
            let sy = (i as i32 / cells_x).clamp(0, height - 1);
            let h = samples[(sy * width + sx) as usize];
            max_height = max_height.max(h);
            *cell = Cell {
                height: h,
                ..Cell::default()
            };
        }
        Ok(max_height)
    }

    /// Assign textures 0/1/2 by height band relative to `max_height`.
    pub fn apply_height_bands(&mut self, low: f32, med: f32) {
        let max = self.max_height;
        for cell in &mut self.cells {
            cell.user_texture = if cell.height < max * low {
                0
            } else if cell.height < max * med {
                1
            } else {
                2
            };
        }
    }

    /// Raise `max_height` to the tallest cell, returning it.
    pub fn refresh_max_height(&mut self) -> f32 {
        let observed = self
            .cells
            .iter()
            .map(|c| c.height)
            .fold(f32::MIN, f32::max);
        self.max_height = self.max_height.max(observed);
        self.max_height
    }

    /// Lowest and highest height among the in-range cells of `rect`.
    pub fn height_range(&self, rect: &CellRect) -> Option<(f32, f32)> {
        rect.clamped(&self.grid)
            .cells()
            .filter_map(|(x, y)| self.get(x, y))
            .map(|c| c.height)
            .fold(None, |acc, h| match acc {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise_field::Topology;

    fn small_store() -> Heightfield {
        Heightfield::new(GridParams::new(8, 1, 4).unwrap())
    }

    #[test]
    fn test_store_matches_grid() {
        let store = small_store();
        assert_eq!(store.cells().len(), 64);
        assert_eq!(store.cell_index(3, 2), 19);
    }

    #[test]
    #[should_panic]
    fn test_raw_index_out_of_range_panics() {
        small_store().cell_index(8, 0);
    }

    #[test]
    fn test_clamped_access() {
        let mut store = small_store();
        store.get_mut(7, 7).unwrap().height = 9.0;
        assert_eq!(store.height_clamped(100, 100), 9.0);
        assert!(store.get(-1, 0).is_none());

        let corner = store.world_position(50, 50);
        assert_eq!(corner, Vector3::new(3.0, 9.0, 3.0));
        assert_eq!(store.world_position(0, 0), Vector3::new(-4.0, 0.0, -4.0));
    }

    #[test]
    fn test_procedural_fill_resets_textures() {
        let mut store = small_store();
        store.cells_mut()[5].user_texture = 3;
        store.fill_procedural(&TopologyField::new(Topology::Flat, 10.0, 1, 0));
        assert!(store.cells().iter().all(|c| c.height == 0.0 && c.user_texture == 0));
    }

    #[test]
    fn test_fill_from_samples_clamps_source() {
        let mut store = small_store();
        let samples = [1.0, 2.0, 3.0, 4.0];
        let max = store.fill_from_samples(2, 2, &samples).unwrap();
        assert_eq!(max, 4.0);
        assert_eq!(store.get(0, 0).unwrap().height, 1.0);
        assert_eq!(store.get(1, 0).unwrap().height, 2.0);
        assert_eq!(store.get(5, 0).unwrap().height, 2.0);
        assert_eq!(store.get(6, 6).unwrap().height, 4.0);
    }

    #[test]
    fn test_fill_from_samples_rejects_short_input() {
        let mut store = small_store();
        let result = store.fill_from_samples(4, 4, &[0.0; 3]);
        assert!(matches!(result, Err(TerrainError::InvalidHeightmap { expected: 16, .. })));
    }

    #[test]
    fn test_height_bands() {
        let mut store = small_store();
        store.max_height = 100.0;
        store.get_mut(0, 0).unwrap().height = 10.0;
        store.get_mut(1, 0).unwrap().height = 50.0;
        store.get_mut(2, 0).unwrap().height = 95.0;
        store.apply_height_bands(0.2, 0.9);
        assert_eq!(store.get(0, 0).unwrap().user_texture, 0);
        assert_eq!(store.get(1, 0).unwrap().user_texture, 1);
        assert_eq!(store.get(2, 0).unwrap().user_texture, 2);
    }

    #[test]
    fn test_height_range_ignores_outside_cells() {
        let mut store = small_store();
        store.get_mut(0, 0).unwrap().height = -2.0;
        store.get_mut(1, 1).unwrap().height = 6.0;
        let range = store.height_range(&CellRect::new(-3, -3, 2, 2));
        assert_eq!(range, Some((-2.0, 6.0)));
        assert_eq!(store.height_range(&CellRect::new(20, 20, 30, 30)), None);
    }
}
