//! Brush footprints and height rules for terrain editing.
//!
//! A brush is a square of `size` cells starting `size / 2` cells before the
//! anchor on both axes. The rules here are pure; `Terrain` applies them to
//! the store and takes care of snapshots and rebuilds.

use std::f32::consts::PI;

use godot::prelude::*;

use crate::grid::CellRect;

/// Padding around the brush whose blend state is recomputed.
pub const BLEND_BORDER: i32 = 1;
/// Padding around the brush, in cells, whose embedded objects follow the surface.
pub const TRACKING_BORDER: i32 = 1;
/// Mountain/valley dome height per cell, brush cell and unit of `add`.
const DOME_FACTOR: f32 = 0.03;

/// Height edits that work relative to the brush's height range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModifyOp {
    /// Pull heights halfway towards the middle of the range
    Smooth,
    /// Set every height to the range minimum
    Flatten,
    /// Add random jitter of up to half a cell in either direction
    Noise,
}

/// Editing tool driven by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushTool {
    #[default]
    RaiseLower,
    MountainValley,
    Smooth,
    Flatten,
    Noise,
    PaintTexture,
    PaintGrass,
    RemoveGrass,
}

impl BrushTool {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => BrushTool::RaiseLower,
            1 => BrushTool::MountainValley,
            2 => BrushTool::Smooth,
            3 => BrushTool::Flatten,
            4 => BrushTool::Noise,
            5 => BrushTool::PaintTexture,
            6 => BrushTool::PaintGrass,
            7 => BrushTool::RemoveGrass,
            _ => return None,
        })
    }

    /// Tools that change heights.
    pub fn is_sculpt(self) -> bool {
        matches!(
            self,
            BrushTool::RaiseLower | BrushTool::MountainValley | BrushTool::Smooth | BrushTool::Flatten | BrushTool::Noise
        )
    }

    /// The relative height rule behind smooth/flatten/noise, if any.
    pub fn modify_op(self) -> Option<ModifyOp> {
        match self {
            BrushTool::Smooth => Some(ModifyOp::Smooth),
            BrushTool::Flatten => Some(ModifyOp::Flatten),
            BrushTool::Noise => Some(ModifyOp::Noise),
            _ => None,
        }
    }
}

/// Square brush placed on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrushFootprint {
    pub anchor: Vector2i,
    pub size: i32,
}

impl BrushFootprint {
    pub fn new(anchor: Vector2i, size: i32) -> Self {
        Self { anchor, size }
    }

    pub fn half(&self) -> i32 {
        self.size / 2
    }

    pub fn is_degenerate(&self) -> bool {
        self.size < 1
    }

    /// Cells touched by the brush (possibly partly outside the grid).
    pub fn cells(&self) -> CellRect {
        let x0 = self.anchor.x - self.half();
        let y0 = self.anchor.y - self.half();
        CellRect::new(x0, y0, x0 + self.size, y0 + self.size)
    }

    /// Odd square around the anchor grown by `border` cells.
    pub fn region(&self, border: i32) -> CellRect {
        CellRect::around(self.anchor, self.half(), border)
    }

    /// Terrain-local XZ bounds (inclusive) of `region(border)`.
    pub fn local_bounds(&self, border: i32, cell_size: i32) -> (Vector2, Vector2) {
        let rect = self.region(border);
        let size = cell_size as f32;
        (
            Vector2::new(rect.x0 as f32 * size, rect.y0 as f32 * size),
            Vector2::new(rect.x1 as f32 * size, rect.y1 as f32 * size),
        )
    }
}

/// Dome strength used by mountain/valley edits.
pub fn dome_factor(cell_size: i32, size: i32, add: f32) -> f32 {
    cell_size as f32 * size as f32 * DOME_FACTOR * add
}

/// Raise/lower rule for the cell at brush offset `(i, j)`.
///
/// * `sphere != 0`: dome of strength `sphere` scaled by `|add|`.
/// * `range = Some((min, max))` with `min != max`: cells near the low end move
///   most when raising and least when lowering.
/// * otherwise a uniform shift by `add`.
pub fn raised_height(height: f32, i: i32, j: i32, size: i32, add: f32, sphere: f32, range: Option<(f32, f32)>) -> f32 {
    if sphere != 0.0 {
        let u = i as f32 / size as f32;
        let v = j as f32 / size as f32;
        let dome = (u * PI).sin() * (v * PI).sin() * sphere * 0.01;
        return height + add.abs() * dome;
    }

    match range {
        Some((min, max)) if max != min => {
            let mut fact = ((max - height) / (max - min)).clamp(0.0, 1.0);
            if add < 0.0 {
                fact = 1.0 - fact;
            }
            height + add * fact
        }
        _ => height + add,
    }
}

/// Smooth/flatten/noise rule. `noise` is a uniform sample in `[0, 1)`.
pub fn modified_height(op: ModifyOp, height: f32, min: f32, max: f32, noise: f32, cell_size: i32) -> f32 {
    match op {
        ModifyOp::Smooth => {
            let average = min + (max - min) / 2.0;
            height - (height - average) * 0.5
        }
        ModifyOp::Flatten => min,
        ModifyOp::Noise => height + (noise - 0.5) * cell_size as f32,
    }
}
