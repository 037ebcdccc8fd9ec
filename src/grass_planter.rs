//! Grass patch placement.
//!
//! Grass is stored as a flat list of patches in terrain-local coordinates.
//! Patches are turned into geometry by the mesh builder of the tile that
//! covers them.

use rand::Rng;

use crate::grid::CellRect;
use crate::heightfield::Heightfield;
use crate::texture_table::TextureHandle;

/// Coverage used when a heightmap is loaded with a grass sprite.
pub const HEIGHTMAP_GRASS_COVERAGE: f32 = 0.8;
pub const HEIGHTMAP_GRASS_HEIGHT: f32 = 17.0;
pub const HEIGHTMAP_GRASS_WIDTH: f32 = 20.0;
/// Fraction of the low texture band below which heightmap grass grows.
pub const HEIGHTMAP_GRASS_CUTOFF: f32 = 0.9;

/// One grass patch (two crossed cards).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrassInstance {
    pub height: f32,
    pub width: f32,
    /// Terrain-local X (displacement not applied)
    pub pos_x: f32,
    /// Terrain-local Z (displacement not applied)
    pub pos_z: f32,
    /// Y rotation in radians
    pub rotation: f32,
    pub texture: i32,
}

/// Request to cover part of the terrain with one kind of grass.
#[derive(Clone, Debug)]
pub struct GrassDistribution {
    pub texture: TextureHandle,
    /// Fraction of the terrain to cover, 0..1
    pub coverage: f32,
    pub height: f32,
    pub width: f32,
    /// Patches are not placed on cells higher than this
    pub max_pos_height: f32,
}

impl GrassDistribution {
    pub fn new(texture: TextureHandle, coverage: f32, height: f32, width: f32) -> Self {
        Self {
            texture,
            coverage,
            height,
            width,
            max_pos_height: f32::MAX,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.coverage == 0.0 || self.height == 0.0 || self.width == 0.0
    }
}

fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.random_range(0..1000) as f32 / 500.0
}

/// Scatter patches of `distribution` over the whole terrain.
///
/// The patch count scales with terrain area over patch footprint; candidates
/// on cells above `max_pos_height` are dropped.
pub fn distribute_grass<R: Rng + ?Sized>(
    store: &Heightfield,
    distribution: &GrassDistribution,
    texture: i32,
    rng: &mut R,
) -> Vec<GrassInstance> {
    let grid = store.grid();
    let side = grid.side_length as f32;
    let range = side - grid.cell_size as f32;
    if distribution.is_degenerate() || range <= 0.0 || store.is_empty() {
        return Vec::new();
    }

    let width_sq = distribution.width * distribution.width;
    let wanted = ((side * side) / width_sq * (distribution.coverage * 2.0)).max(0.0) as usize;

    let mut patches = Vec::new();
    for _ in 0..wanted {
        let pos_x = rng.random::<f32>() * range;
        let pos_z = rng.random::<f32>() * range;

        let cell = grid.cell_of_local(pos_x, pos_z);
        if store.height_clamped(cell.x, cell.y) > distribution.max_pos_height {
            continue;
        }

        patches.push(GrassInstance {
            height: distribution.height,
            width: distribution.width,
            pos_x,
            pos_z,
            rotation: random_rotation(rng),
            texture,
        });
    }
    patches
}

/// `count` patches at uniform positions inside `rect`.
pub fn paint_patches<R: Rng + ?Sized>(
    rect: &CellRect,
    cell_size: i32,
    count: usize,
    height: f32,
    width: f32,
    texture: i32,
    rng: &mut R,
) -> Vec<GrassInstance> {
    let size = cell_size as f32;
    (0..count)
        .map(|_| {
            let pos_x = (rect.x0 as f32 + rng.random::<f32>() * rect.width() as f32) * size;
            let pos_z = (rect.y0 as f32 + rng.random::<f32>() * rect.height() as f32) * size;
            GrassInstance {
                height,
                width,
                pos_x,
                pos_z,
                rotation: random_rotation(rng),
                texture,
            }
        })
        .collect()
}

/// Remove patches whose cell lies in `rect` (half-open, so the row and column
/// at `x1`/`y1` are kept). Survivors keep their order.
pub fn remove_in_rect(grass: &mut Vec<GrassInstance>, rect: &CellRect, cell_size: i32) -> usize {
    let size = cell_size.max(1) as f32;
    let before = grass.len();
    grass.retain(|g| !rect.contains((g.pos_x / size) as i32, (g.pos_z / size) as i32));
    before - grass.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridParams;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn patch(x: f32, z: f32) -> GrassInstance {
        GrassInstance {
            height: 2.0,
            width: 1.0,
            pos_x: x,
            pos_z: z,
            rotation: 0.25,
            texture: 0,
        }
    }

    #[test]
    fn test_distribution_count_and_range() {
        let store = Heightfield::new(GridParams::new(32, 1, 8).unwrap());
        let dist = GrassDistribution::new(TextureHandle::new("grass"), 0.5, 3.0, 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let patches = distribute_grass(&store, &dist, 4, &mut rng);

        // 32*32 / 4 * 1.0
        assert_eq!(patches.len(), 256);
        for p in &patches {
            assert!(p.pos_x >= 0.0 && p.pos_x < 31.0);
            assert!(p.pos_z >= 0.0 && p.pos_z < 31.0);
            assert!(p.rotation >= 0.0 && p.rotation < 2.0);
            assert_eq!(p.texture, 4);
        }
    }

    #[test]
    fn test_distribution_respects_height_cutoff() {
        let mut store = Heightfield::new(GridParams::new(16, 1, 8).unwrap());
        for cell in store.cells_mut() {
            cell.height = 50.0;
        }
        let mut dist = GrassDistribution::new(TextureHandle::new("grass"), 1.0, 3.0, 1.0);
        dist.max_pos_height = 10.0;
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(distribute_grass(&store, &dist, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_degenerate_distribution_is_skipped() {
        let store = Heightfield::new(GridParams::new(16, 1, 8).unwrap());
        let dist = GrassDistribution::new(TextureHandle::new("grass"), 1.0, 0.0, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(distribute_grass(&store, &dist, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_painted_patches_stay_in_rect() {
        let rect = CellRect::new(2, 3, 5, 6);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let patches = paint_patches(&rect, 10, 9, 1.0, 1.0, 1, &mut rng);
        assert_eq!(patches.len(), 9);
        for p in &patches {
            assert!(rect.contains((p.pos_x / 10.0) as i32, (p.pos_z / 10.0) as i32));
        }
    }

    #[test]
    fn test_remove_keeps_survivors_in_order() {
        let mut grass = vec![
            patch(0.5, 0.5),
            patch(5.5, 5.5),
            patch(9.5, 1.5),
            patch(6.2, 4.9),
            patch(2.5, 7.5),
        ];
        let expected = vec![grass[0], grass[2], grass[4]];

        let removed = remove_in_rect(&mut grass, &CellRect::new(4, 4, 7, 7), 1);
        assert_eq!(removed, 2);
        assert_eq!(grass.len(), 3);
        for (kept, want) in grass.iter().zip(&expected) {
            assert_eq!(kept.pos_x.to_bits(), want.pos_x.to_bits());
            assert_eq!(kept.pos_z.to_bits(), want.pos_z.to_bits());
            assert_eq!(kept.rotation.to_bits(), want.rotation.to_bits());
        }
    }

    #[test]
    fn test_remove_excludes_far_edge() {
        let mut grass = vec![patch(4.0, 4.0), patch(7.0, 5.5), patch(5.5, 7.0), patch(3.9, 5.0)];
        let removed = remove_in_rect(&mut grass, &CellRect::new(4, 4, 7, 7), 1);
        assert_eq!(removed, 1);
        assert_eq!(grass.len(), 3);
        assert_eq!(grass[0].pos_x, 7.0);
    }
}
