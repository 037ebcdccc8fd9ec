use godot::prelude::*;

pub mod blend;
pub mod brush;
pub mod brush_preview;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod grass_planter;
pub mod grid;
pub mod heightfield;
pub mod mesh_builder;
pub mod noise_field;
pub mod query;
pub mod scatter;
pub mod serialization;
pub mod terrain;
pub mod terrain_node;
pub mod texture_table;
pub mod undo;

struct PixyHeightfieldExtension;

#[gdextension]
unsafe impl ExtensionLibrary for PixyHeightfieldExtension {}
