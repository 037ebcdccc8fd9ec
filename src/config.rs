//! Terrain configuration shared by generation, editing and the Godot node.
//!
//! Every field has a default, so a partial TOML document (or none at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::error::{TerrainError, TerrainResult};

/// How terrain batches are lit by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightingType {
    /// Unlit, vertex colors only.
    None,
    /// Lit by scene lights.
    #[default]
    Dynamic,
    /// Baked lighting stored in vertex colors.
    LightmapVertexColors,
}

impl LightingType {
    pub fn to_i32(self) -> i32 {
        match self {
            LightingType::None => 0,
            LightingType::Dynamic => 1,
            LightingType::LightmapVertexColors => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(LightingType::None),
            1 => Some(LightingType::Dynamic),
            2 => Some(LightingType::LightmapVertexColors),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Cells along one side of a tile.
    pub cells_per_tile_side: i32,
    /// World-to-UV scale for generated terrain.
    pub texture_scale: f32,
    /// World-to-UV scale applied after loading a heightmap.
    pub heightmap_texture_scale: f32,
    /// Fraction of max height below which texture 0 is used.
    pub texture_height_low: f32,
    /// Fraction of max height below which texture 1 is used (2 above).
    pub texture_height_med: f32,
    /// Corner weight written for blended corners.
    pub blend_intensity: u8,
    pub grass_uses_wind: bool,
    pub lighting: LightingType,
    /// Hard cap on embedded objects placed per distribution.
    pub max_scatter_objects: usize,
    /// Padding (in cells) around an edit that gets its geometry rebuilt.
    pub edit_border: i32,
    /// Renderer texture slot limit, if any.
    pub max_textures: Option<usize>,
    pub seed: u64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            cells_per_tile_side: 35,
            texture_scale: 0.02,
            heightmap_texture_scale: 0.006,
            texture_height_low: 0.2,
            texture_height_med: 0.9,
            blend_intensity: 255,
            grass_uses_wind: true,
            lighting: LightingType::Dynamic,
            max_scatter_objects: 500,
            edit_border: 2,
            max_textures: None,
            seed: 0,
        }
    }
}

impl TerrainConfig {
    /// Parse a configuration from TOML, filling omitted fields with defaults.
    pub fn from_toml_str(text: &str) -> TerrainResult<Self> {
        let config: TerrainConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> TerrainResult<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> TerrainResult<()> {
        if self.cells_per_tile_side < 1 {
            return Err(TerrainError::Config(format!(
                "cells_per_tile_side must be at least 1, got {}",
                self.cells_per_tile_side
            )));
        }
        if self.edit_border < 0 {
            return Err(TerrainError::Config(format!(
                "edit_border must not be negative, got {}",
                self.edit_border
            )));
        }
        if self.texture_height_low > self.texture_height_med {
            return Err(TerrainError::Config(format!(
                "texture_height_low ({}) exceeds texture_height_med ({})",
                self.texture_height_low, self.texture_height_med
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TerrainConfig::default();
        assert_eq!(config.cells_per_tile_side, 35);
        assert_eq!(config.blend_intensity, 255);
        assert_eq!(config.max_scatter_objects, 500);
        assert!(config.grass_uses_wind);
        assert_eq!(config.lighting, LightingType::Dynamic);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TerrainConfig::from_toml_str("cells_per_tile_side = 8\nseed = 42\n").unwrap();
        assert_eq!(config.cells_per_tile_side, 8);
        assert_eq!(config.seed, 42);
        assert_eq!(config.texture_scale, 0.02);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = TerrainConfig {
            lighting: LightingType::LightmapVertexColors,
            max_textures: Some(4),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        let parsed = TerrainConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_bad_tile_side() {
        let result = TerrainConfig::from_toml_str("cells_per_tile_side = 0");
        assert!(matches!(result, Err(TerrainError::Config(_))));
    }

    #[test]
    fn test_lighting_type_codes() {
        for lighting in [
            LightingType::None,
            LightingType::Dynamic,
            LightingType::LightmapVertexColors,
        ] {
            assert_eq!(LightingType::from_i32(lighting.to_i32()), Some(lighting));
        }
        assert_eq!(LightingType::from_i32(7), None);
    }
}
