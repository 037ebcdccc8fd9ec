//! Brush preview visualization for terrain editing.
//!
//! The preview is a line loop around the brush square that follows the
//! terrain surface, so it stays visible on slopes.

use godot::classes::mesh::PrimitiveType;
use godot::classes::rendering_server::ArrayType;
use godot::classes::{ArrayMesh, Shader, ShaderMaterial};
use godot::prelude::*;

use crate::brush::{BrushFootprint, BrushTool};
use crate::heightfield::Heightfield;

/// Height the outline floats above the surface.
const OUTLINE_LIFT: f32 = 0.2;

/// Shader source for the brush outline
const BRUSH_PREVIEW_SHADER: &str = r#"
shader_type spatial;
render_mode blend_mix, depth_draw_never, depth_test_disabled, cull_disabled, unshaded;

uniform vec4 brush_color : source_color = vec4(0.0, 0.8, 1.0, 0.8);

void fragment() {
    ALBEDO = brush_color.rgb;
    ALPHA = brush_color.a;
}
"#;

/// Outline colors per tool family
#[derive(Clone, Copy, Debug)]
pub struct BrushColors {
    /// Raise/lower and mountain/valley
    pub sculpt_color: [f32; 4],
    /// Smooth, flatten and noise
    pub modify_color: [f32; 4],
    pub paint_color: [f32; 4],
    pub grass_color: [f32; 4],
}

impl Default for BrushColors {
    fn default() -> Self {
        Self {
            sculpt_color: [0.0, 0.8, 1.0, 0.8], // Cyan
            modify_color: [0.8, 0.8, 0.0, 0.8], // Yellow
            paint_color: [1.0, 0.5, 0.0, 0.8],  // Orange
            grass_color: [0.2, 1.0, 0.2, 0.8],  // Green
        }
    }
}

impl BrushColors {
    pub fn for_tool(&self, tool: BrushTool) -> Color {
        let c = match tool {
            BrushTool::RaiseLower | BrushTool::MountainValley => self.sculpt_color,
            BrushTool::Smooth | BrushTool::Flatten | BrushTool::Noise => self.modify_color,
            BrushTool::PaintTexture => self.paint_color,
            BrushTool::PaintGrass | BrushTool::RemoveGrass => self.grass_color,
        };
        Color::from_rgba(c[0], c[1], c[2], c[3])
    }
}

/// Line segment endpoints (pairs) tracing the border of the brush square
/// over the surface. Empty when the brush misses the grid.
pub fn outline_points(store: &Heightfield, brush: &BrushFootprint) -> Vec<Vector3> {
    if store.is_empty() || brush.is_degenerate() {
        return Vec::new();
    }
    let rect = brush.cells().clamped(store.grid());
    if rect.is_empty() {
        return Vec::new();
    }

    let mut ring: Vec<(i32, i32)> = Vec::new();
    ring.extend((rect.x0..rect.x1).map(|x| (x, rect.y0)));
    ring.extend((rect.y0..rect.y1).map(|y| (rect.x1, y)));
    ring.extend((rect.x0 + 1..=rect.x1).rev().map(|x| (x, rect.y1)));
    ring.extend((rect.y0 + 1..=rect.y1).rev().map(|y| (rect.x0, y)));

    let lifted = |(x, y): (i32, i32)| store.world_position(x, y) + Vector3::new(0.0, OUTLINE_LIFT, 0.0);
    let mut points = Vec::with_capacity(ring.len() * 2);
    for (i, &corner) in ring.iter().enumerate() {
        let next = ring[(i + 1) % ring.len()];
        points.push(lifted(corner));
        points.push(lifted(next));
    }
    points
}

/// Brush preview mesh generator
pub struct BrushPreview {
    /// Cached preview material
    material: Option<Gd<ShaderMaterial>>,
    colors: BrushColors,
}

impl Default for BrushPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl BrushPreview {
    pub fn new() -> Self {
        Self {
            material: None,
            colors: BrushColors::default(),
        }
    }

    fn ensure_material(&mut self) {
        if self.material.is_some() {
            return;
        }

        let mut shader = Shader::new_gd();
        shader.set_code(BRUSH_PREVIEW_SHADER);

        let mut material = ShaderMaterial::new_gd();
        material.set_shader(&shader);
        material.set_shader_parameter(
            "brush_color",
            &self.colors.for_tool(BrushTool::default()).to_variant(),
        );

        self.material = Some(material);
    }

    /// Recolor the outline for `tool`
    pub fn update_material(&mut self, tool: BrushTool) {
        self.ensure_material();
        let color = self.colors.for_tool(tool);
        if let Some(ref mut material) = self.material {
            material.set_shader_parameter("brush_color", &color.to_variant());
        }
    }

    /// Generate the outline mesh for `brush`
    pub fn generate_mesh(&mut self, store: &Heightfield, brush: &BrushFootprint) -> Option<Gd<ArrayMesh>> {
        let points = outline_points(store, brush);
        if points.is_empty() {
            return None;
        }
        self.ensure_material();

        let packed_vertices = PackedVector3Array::from(&points[..]);

        let mut mesh = ArrayMesh::new_gd();
        let num_arrays = ArrayType::MAX.ord() as usize;
        let mut arrays: Array<Variant> = Array::new();

        for i in 0..num_arrays {
            if i == ArrayType::VERTEX.ord() as usize {
                arrays.push(&packed_vertices.to_variant());
            } else {
                arrays.push(&Variant::nil());
            }
        }

        mesh.add_surface_from_arrays(PrimitiveType::LINES, &arrays);
        Some(mesh)
    }

    /// Get the preview material (for applying to MeshInstance3D)
    pub fn get_material(&mut self) -> Option<Gd<ShaderMaterial>> {
        self.ensure_material();
        self.material.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridParams;

    fn store() -> Heightfield {
        let mut store = Heightfield::new(GridParams::new(16, 1, 8).unwrap());
        store.get_mut(5, 5).unwrap().height = 3.0;
        store
    }

    #[test]
    fn test_outline_closes_around_brush() {
        let s = store();
        let points = outline_points(&s, &BrushFootprint::new(Vector2i::new(5, 5), 3));
        // 3x3 square: 12 unit edges, 2 points each.
        assert_eq!(points.len(), 24);
        assert_eq!(points.first(), points.last());
        let d = s.grid().displacement;
        assert_eq!(points[0], Vector3::new(4.0 + d.x, OUTLINE_LIFT, 4.0 + d.z));
    }

    #[test]
    fn test_outline_follows_surface() {
        let s = store();
        let points = outline_points(&s, &BrushFootprint::new(Vector2i::new(6, 6), 1));
        assert_eq!(points.len(), 8);
        let raised = outline_points(&s, &BrushFootprint::new(Vector2i::new(5, 5), 1));
        assert_eq!(raised[0].y, 3.0 + OUTLINE_LIFT);
        assert!(points.iter().all(|p| p.y == OUTLINE_LIFT));
    }

    #[test]
    fn test_outline_misses() {
        let s = store();
        assert!(outline_points(&s, &BrushFootprint::new(Vector2i::new(40, 40), 3)).is_empty());
        assert!(outline_points(&s, &BrushFootprint::new(Vector2i::new(4, 4), 0)).is_empty());
        assert!(outline_points(&Heightfield::default(), &BrushFootprint::new(Vector2i::new(0, 0), 2)).is_empty());
    }

    #[test]
    fn test_tool_colors() {
        let colors = BrushColors::default();
        assert_eq!(colors.for_tool(BrushTool::Flatten), colors.for_tool(BrushTool::Noise));
        assert_ne!(colors.for_tool(BrushTool::PaintTexture), colors.for_tool(BrushTool::PaintGrass));
        assert!(BrushPreview::new().material.is_none());
    }
}
