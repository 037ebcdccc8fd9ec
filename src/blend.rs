//! Texture blend resolution.
//!
//! A cell whose 3x3 neighborhood contains a different user texture becomes a
//! border cell: the first differing neighbor (row-major scan from the
//! top-left) becomes its blend texture, and every differing neighbor marks
//! the cell corners it touches with the blend intensity.

use crate::grid::CellRect;
use crate::heightfield::Heightfield;

/// Corners touched by each neighbor slot of the 3x3 neighborhood, in
/// row-major slot order. Corner order is TL, TR, BL, BR.
const NEIGHBOR_CORNERS: [[bool; 4]; 9] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [true, false, true, false],
    [false, false, false, false],
    [false, true, false, true],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
];

pub const DEFAULT_BLEND_INTENSITY: u8 = 255;

/// Recompute the derived blend state of cell `(x, y)`.
pub fn resolve_cell(store: &mut Heightfield, x: i32, y: i32, intensity: u8) {
    let own = store.get_clamped(x, y).user_texture;
    let mut other = None;
    let mut weights = [0u8; 4];

    let mut slot = 0;
    for ny in (y - 1)..=(y + 1) {
        for nx in (x - 1)..=(x + 1) {
            let neighbor = store.get_clamped(nx, ny).user_texture;
            if neighbor != own {
                other.get_or_insert(neighbor);
                for (weight, &touched) in weights.iter_mut().zip(&NEIGHBOR_CORNERS[slot]) {
                    if touched {
                        *weight = intensity;
                    }
                }
            }
            slot += 1;
        }
    }

    let index = store.cell_index(x, y);
    let cell = &mut store.cells_mut()[index];
    cell.main_texture = own;
    cell.blend_texture = other.unwrap_or(own);
    cell.blend_weights = weights;
}

/// Resolve every cell of `rect`, clamped onto the grid.
pub fn resolve_region(store: &mut Heightfield, rect: &CellRect, intensity: u8) -> CellRect {
    let rect = rect.clamped(store.grid());
    for (x, y) in rect.cells() {
        resolve_cell(store, x, y, intensity);
    }
    rect
}

pub fn resolve_all(store: &mut Heightfield, intensity: u8) {
    let full = store.grid().full_rect();
    resolve_region(store, &full, intensity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridParams;
    use crate::heightfield::{CORNER_BOTTOM_LEFT, CORNER_BOTTOM_RIGHT, CORNER_TOP_LEFT, CORNER_TOP_RIGHT};

    fn store() -> Heightfield {
        Heightfield::new(GridParams::new(8, 1, 8).unwrap())
    }

    #[test]
    fn test_uniform_texture_has_no_border() {
        let mut s = store();
        resolve_all(&mut s, 255);
        for cell in s.cells() {
            assert!(!cell.is_border());
            assert_eq!(cell.blend_texture, cell.main_texture);
        }
    }

    #[test]
    fn test_blend_symmetry_between_two_cells() {
        let mut s = store();
        for cell in s.cells_mut() {
            cell.user_texture = 0;
        }
        s.get_mut(3, 3).unwrap().user_texture = 1;
        resolve_all(&mut s, 255);

        // Right-hand neighbor sees texture 1 on its left edge.
        let right = *s.get(4, 3).unwrap();
        assert_eq!(right.blend_texture, 1);
        assert_eq!(right.blend_weights[CORNER_TOP_LEFT], 255);
        assert_eq!(right.blend_weights[CORNER_BOTTOM_LEFT], 255);
        assert_eq!(right.blend_weights[CORNER_TOP_RIGHT], 0);
        assert_eq!(right.blend_weights[CORNER_BOTTOM_RIGHT], 0);

        // The painted cell sees texture 0 on its right edge.
        let painted = *s.get(3, 3).unwrap();
        assert_eq!(painted.main_texture, 1);
        assert_eq!(painted.blend_texture, 0);
        assert_eq!(painted.blend_weights[CORNER_TOP_RIGHT], 255);
        assert_eq!(painted.blend_weights[CORNER_BOTTOM_RIGHT], 255);
    }

    #[test]
    fn test_single_cell_marks_nine_cells() {
        let mut s = store();
        s.get_mut(4, 4).unwrap().user_texture = 2;
        resolve_all(&mut s, 200);

        let border_cells: Vec<_> = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|&(x, y)| s.get(x, y).unwrap().is_border())
            .collect();
        assert_eq!(border_cells.len(), 9);
        assert!(border_cells.iter().all(|&(x, y)| (3..=5).contains(&x) && (3..=5).contains(&y)));

        // Diagonal neighbor touches only the shared corner.
        assert_eq!(s.get(3, 3).unwrap().blend_weights, [0, 0, 0, 200]);
        assert_eq!(s.get(5, 5).unwrap().blend_weights, [200, 0, 0, 0]);
        assert_eq!(s.get(4, 4).unwrap().blend_weights, [200; 4]);
    }

    #[test]
    fn test_first_differing_neighbor_wins() {
        let mut s = store();
        s.get_mut(2, 2).unwrap().user_texture = 5;
        s.get_mut(4, 4).unwrap().user_texture = 7;
        resolve_all(&mut s, 255);
        // (3,3) scans (2,2) before (4,4).
        assert_eq!(s.get(3, 3).unwrap().blend_texture, 5);
        assert_eq!(s.get(3, 3).unwrap().blend_weights, [255, 0, 0, 255]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut s = store();
        for (i, cell) in s.cells_mut().iter_mut().enumerate() {
            cell.user_texture = ((i * 7) % 3) as i32;
        }
        resolve_all(&mut s, 255);
        let first: Vec<_> = s.cells().to_vec();
        resolve_all(&mut s, 255);
        assert_eq!(first, s.cells().to_vec());

        resolve_region(&mut s, &CellRect::new(1, 1, 5, 6), 255);
        assert_eq!(first, s.cells().to_vec());
    }

    #[test]
    fn test_region_is_clamped() {
        let mut s = store();
        let resolved = resolve_region(&mut s, &CellRect::new(-2, -2, 3, 3), 255);
        assert_eq!(resolved, CellRect::new(0, 0, 3, 3));
    }

    #[test]
    fn test_grid_edge_uses_clamped_neighbors() {
        let mut s = store();
        s.get_mut(0, 1).unwrap().user_texture = 1;
        resolve_all(&mut s, 255);
        let corner = s.get(0, 0).unwrap();
        // Clamped slots (-1,1) and (0,1) both map onto the painted cell.
        assert_eq!(corner.blend_texture, 1);
        assert_eq!(corner.blend_weights, [0, 0, 255, 255]);
    }
}
