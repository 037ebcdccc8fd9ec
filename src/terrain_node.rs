use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use godot::classes::mesh::PrimitiveType;
use godot::classes::rendering_server::ArrayType;
use godot::classes::{
    ArrayMesh, Camera3D, FileAccess, INode3D, Image, Material, MeshInstance3D, Node3D, PackedScene, Shader,
    ShaderMaterial, Texture2D,
};
use godot::prelude::*;

use crate::brush::{BrushFootprint, BrushTool};
use crate::brush_preview::BrushPreview;
use crate::config::{LightingType, TerrainConfig};
use crate::debug_log::{compute_normal_stats, debug_log, init_debug_log};
use crate::grass_planter::GrassDistribution;
use crate::mesh_builder::{BatchKind, BatchKey, GeometryBatch, MaterialFlags, Tile};
use crate::noise_field::Topology;
use crate::query::Ray;
use crate::scatter::{EmbeddedObject, SceneHost, ScatterTemplate};
use crate::serialization::{terrain_from_bytes, terrain_to_bytes, TerrainAttributes};
use crate::terrain::{EditReport, GenerateParams, Terrain, TileRenderer};
use crate::texture_table::{TextureHandle, TextureTable};
use crate::undo::UndoHistory;

/// Terrain surface shader. `{render_mode}` and `{alpha}` are filled in per
/// material flags.
const TERRAIN_SHADER: &str = r#"
shader_type spatial;
render_mode {render_mode};

uniform sampler2D texture_main : source_color, filter_linear_mipmap, repeat_enable;
uniform sampler2D texture_blend : source_color, filter_linear_mipmap, repeat_enable;
uniform bool use_blend = false;
uniform bool use_wind = false;
uniform float wind_strength = 0.3;

void vertex() {
    if (use_wind && UV.y < 0.5) {
        VERTEX.x += sin(TIME * 1.7 + VERTEX.z * 0.05) * wind_strength;
        VERTEX.z += cos(TIME * 1.3 + VERTEX.x * 0.05) * wind_strength * 0.5;
    }
}

void fragment() {
    vec4 main_color = texture(texture_main, UV);
    vec4 color = main_color;
    if (use_blend) {
        color = mix(main_color, texture(texture_blend, UV), COLOR.a);
    }
    ALBEDO = color.rgb;
    {alpha}
}
"#;

fn shader_code(flags: MaterialFlags, kind: BatchKind) -> String {
    let mut modes = vec!["blend_mix", "depth_draw_opaque"];
    modes.push(if flags.double_sided { "cull_disabled" } else { "cull_back" });
    if !flags.lit {
        modes.push("unshaded");
    }
    let alpha = match kind {
        BatchKind::Grass => "ALPHA = color.a;\n    ALPHA_SCISSOR_THRESHOLD = 0.5;",
        BatchKind::Terrain => "",
    };
    TERRAIN_SHADER
        .replace("{render_mode}", &modes.join(", "))
        .replace("{alpha}", alpha)
}

/// Index list with every triangle's winding reversed. Geometry is built
/// counter-clockwise; Godot treats clockwise triangles as front faces.
fn godot_indices(indices: &[u16]) -> Vec<i32> {
    indices
        .chunks_exact(3)
        .flat_map(|t| [t[0] as i32, t[2] as i32, t[1] as i32])
        .collect()
}

fn surface_arrays(batch: &GeometryBatch) -> Array<Variant> {
    let positions: Vec<Vector3> = batch.vertices.iter().map(|v| v.position).collect();
    let normals: Vec<Vector3> = batch.vertices.iter().map(|v| v.normal).collect();
    let uvs: Vec<Vector2> = batch.vertices.iter().map(|v| v.uv).collect();
    let colors: Vec<Color> = batch.vertices.iter().map(|v| v.color).collect();
    let indices = godot_indices(&batch.indices);

    let packed_vertices = PackedVector3Array::from(&positions[..]);
    let packed_normals = PackedVector3Array::from(&normals[..]);
    let packed_uvs = PackedVector2Array::from(&uvs[..]);
    let packed_colors = PackedColorArray::from(&colors[..]);
    let packed_indices = PackedInt32Array::from(&indices[..]);

    let num_arrays = ArrayType::MAX.ord() as usize;
    let mut arrays: Array<Variant> = Array::new();
    for i in 0..num_arrays {
        if i == ArrayType::VERTEX.ord() as usize {
            arrays.push(&packed_vertices.to_variant());
        } else if i == ArrayType::NORMAL.ord() as usize {
            arrays.push(&packed_normals.to_variant());
        } else if i == ArrayType::TEX_UV.ord() as usize {
            arrays.push(&packed_uvs.to_variant());
        } else if i == ArrayType::COLOR.ord() as usize {
            arrays.push(&packed_colors.to_variant());
        } else if i == ArrayType::INDEX.ord() as usize {
            arrays.push(&packed_indices.to_variant());
        } else {
            arrays.push(&Variant::nil());
        }
    }
    arrays
}

/// Uploads tile batches into one `MeshInstance3D` child per tile.
#[derive(Default)]
struct TileMeshes {
    parent: Option<Gd<Node3D>>,
    instances: Vec<Option<Gd<MeshInstance3D>>>,
    shaders: HashMap<(MaterialFlags, BatchKind), Gd<Shader>>,
    materials: HashMap<(BatchKey, MaterialFlags), Gd<ShaderMaterial>>,
    loaded: HashMap<String, Option<Gd<Texture2D>>>,
}

impl TileMeshes {
    fn texture(&mut self, textures: &TextureTable, index: i32) -> Option<Gd<Texture2D>> {
        let name = textures.get(index)?.name().to_string();
        self.loaded
            .entry(name)
            .or_insert_with_key(|path| match try_load::<Texture2D>(path.as_str()) {
                Ok(texture) => Some(texture),
                Err(err) => {
                    godot_warn!("PixyHeightfield: cannot load texture '{}': {}", path, err);
                    None
                }
            })
            .clone()
    }

    fn material(&mut self, batch: &GeometryBatch, textures: &TextureTable) -> Gd<ShaderMaterial> {
        let key = (batch.key, batch.flags);
        if let Some(material) = self.materials.get(&key) {
            return material.clone();
        }

        let shader = self
            .shaders
            .entry((batch.flags, batch.key.kind))
            .or_insert_with(|| {
                let mut shader = Shader::new_gd();
                shader.set_code(shader_code(batch.flags, batch.key.kind).as_str());
                shader
            })
            .clone();

        let mut material = ShaderMaterial::new_gd();
        material.set_shader(&shader);
        if let Some(texture) = self.texture(textures, batch.key.texture) {
            material.set_shader_parameter("texture_main", &texture.to_variant());
        }
        if let Some(blend) = batch.key.blend_texture {
            if let Some(texture) = self.texture(textures, blend) {
                material.set_shader_parameter("texture_blend", &texture.to_variant());
            }
            material.set_shader_parameter("use_blend", &true.to_variant());
        }
        material.set_shader_parameter("use_wind", &batch.flags.wind.to_variant());

        self.materials.insert(key, material.clone());
        material
    }

    fn instance(&mut self, index: usize) -> Option<Gd<MeshInstance3D>> {
        if self.instances.len() <= index {
            self.instances.resize(index + 1, None);
        }
        if self.instances[index].is_none() {
            let mut parent = self.parent.clone()?;
            let mut instance = MeshInstance3D::new_alloc();
            instance.set_name(format!("Tile_{}", index).as_str());
            parent.add_child(&instance);
            self.instances[index] = Some(instance);
        }
        self.instances[index].clone()
    }

    /// Forget cached materials so texture replacements are picked up.
    fn clear_materials(&mut self) {
        self.materials.clear();
        self.loaded.clear();
    }
}

impl TileRenderer for TileMeshes {
    fn release_tiles(&mut self) {
        for instance in self.instances.drain(..).flatten() {
            if instance.is_instance_valid() {
                instance.free();
            }
        }
        self.clear_materials();
    }

    fn upload_tile(&mut self, index: usize, tile: &Tile, textures: &TextureTable) {
        let Some(mut instance) = self.instance(index) else {
            return;
        };

        let mut mesh = ArrayMesh::new_gd();
        let mut surface = 0;
        for batch in tile.batches.iter().filter(|b| !b.indices.is_empty()) {
            mesh.add_surface_from_arrays(PrimitiveType::TRIANGLES, &surface_arrays(batch));
            let material = self.material(batch, textures);
            mesh.surface_set_material(surface, &material);
            surface += 1;
        }
        instance.set_mesh(&mesh);
    }
}

/// Scene host that instances registered templates under per-tile nodes.
struct NodeSceneHost {
    root: Gd<Node3D>,
    templates: Rc<RefCell<HashMap<String, Gd<PackedScene>>>>,
    tiles: HashMap<(i32, i32), Gd<Node3D>>,
    objects: HashMap<u64, Gd<Node3D>>,
}

impl NodeSceneHost {
    fn new(mut parent: Gd<Node3D>, templates: Rc<RefCell<HashMap<String, Gd<PackedScene>>>>) -> Self {
        let mut root = Node3D::new_alloc();
        root.set_name("EmbeddedObjects");
        parent.add_child(&root);
        Self {
            root,
            templates,
            tiles: HashMap::new(),
            objects: HashMap::new(),
        }
    }

    fn tile_node(&mut self, tile: Vector2i) -> Gd<Node3D> {
        let root = &mut self.root;
        self.tiles
            .entry((tile.x, tile.y))
            .or_insert_with(|| {
                let mut node = Node3D::new_alloc();
                node.set_name(format!("Tile_{}_{}", tile.x, tile.y).as_str());
                root.add_child(&node);
                node
            })
            .clone()
    }
}

impl SceneHost for NodeSceneHost {
    fn object_added(&mut self, object: &EmbeddedObject, tile: Vector2i) {
        let scene = self.templates.borrow().get(&object.template).cloned();
        let Some(scene) = scene else {
            godot_warn!("PixyHeightfield: no scene registered for '{}'", object.template);
            return;
        };
        let Some(node) = scene.instantiate() else {
            return;
        };
        let Ok(mut node) = node.try_cast::<Node3D>() else {
            godot_warn!("PixyHeightfield: '{}' is not a Node3D scene", object.template);
            return;
        };
        node.set_position(object.position);
        node.set_rotation_degrees(Vector3::new(0.0, object.rotation_y, 0.0));
        self.tile_node(tile).add_child(&node);
        self.objects.insert(object.id, node);
    }

    fn object_moved(&mut self, id: u64, position: Vector3) {
        if let Some(node) = self.objects.get_mut(&id) {
            node.set_position(position);
        }
    }

    fn object_reparented(&mut self, id: u64, _from: Vector2i, to: Vector2i) {
        let target = self.tile_node(to);
        if let Some(node) = self.objects.get_mut(&id) {
            node.reparent(&target);
        }
    }

    fn object_removed(&mut self, id: u64) {
        if let Some(node) = self.objects.remove(&id) {
            if node.is_instance_valid() {
                node.free();
            }
        }
    }
}

impl Drop for NodeSceneHost {
    fn drop(&mut self) {
        if self.root.is_instance_valid() {
            self.root.clone().queue_free();
        }
    }
}

/// Tiled heightfield terrain node.
///
/// Geometry lives in one `MeshInstance3D` child per tile; embedded objects
/// are instanced from registered scenes under an `EmbeddedObjects` child.
#[derive(GodotClass)]
#[class(base=Node3D, init, tool)]
pub struct PixyHeightfield {
    base: Base<Node3D>,

    /// Edge length of the terrain in world units
    #[export]
    #[init(val = 1400)]
    side_length: i32,

    /// Edge length of a cell in world units
    #[export]
    #[init(val = 10)]
    cell_size: i32,

    #[export]
    #[init(val = 200.0)]
    max_height: f32,

    /// 0 = hills, 1 = desert, 2 = flat
    #[export]
    #[init(val = 0)]
    topology: i32,

    #[export]
    #[init(val = 35)]
    cells_per_tile_side: i32,

    #[export]
    #[init(val = 0)]
    seed: i64,

    /// Optional TOML file with extra terrain settings
    #[export]
    config_path: GString,

    /// Texture resources registered at generation; the first covers the ground
    #[export]
    texture_paths: PackedStringArray,

    #[export]
    grass_texture_path: GString,

    #[export]
    #[init(val = 0.3)]
    grass_coverage: f32,

    #[export]
    #[init(val = 10.0)]
    grass_height: f32,

    #[export]
    #[init(val = 8.0)]
    grass_width: f32,

    /// See `BrushTool` (0 = raise/lower ... 7 = remove grass)
    #[export]
    #[init(val = 0)]
    brush_tool: i32,

    /// Brush edge length in cells
    #[export]
    #[init(val = 5)]
    brush_size: i32,

    #[export]
    #[init(val = 1.0)]
    brush_strength: f32,

    /// Texture painted by the paint brush
    #[export]
    paint_texture_path: GString,

    /// Write debug_heightfield.log while editing
    #[export]
    #[init(val = false)]
    debug_logging: bool,

    terrain: Terrain,
    undo: UndoHistory,
    meshes: TileMeshes,
    preview: BrushPreview,
    preview_instance: Option<Gd<MeshInstance3D>>,
    texture_handles: HashMap<String, TextureHandle>,
    scene_templates: Rc<RefCell<HashMap<String, Gd<PackedScene>>>>,
}

#[godot_api]
impl INode3D for PixyHeightfield {
    fn ready(&mut self) {
        if self.debug_logging {
            init_debug_log();
        }
        godot_print!(
            "PixyHeightfield ready: side {} cell {} tile {}",
            self.side_length,
            self.cell_size,
            self.cells_per_tile_side
        );
    }
}

#[godot_api]
impl PixyHeightfield {
    /// Generate a new procedural terrain from the exported settings.
    #[func]
    fn generate(&mut self) -> bool {
        let params = GenerateParams {
            topology: Topology::from_i32(self.topology),
            side_length: self.side_length,
            cell_size: self.cell_size,
            max_height: self.max_height,
        };
        let textures = self.generation_textures();
        let mut grass = Vec::new();
        if !self.grass_texture_path.is_empty() {
            let path = self.grass_texture_path.to_string();
            let texture = self.texture_handle(&path);
            grass.push(GrassDistribution::new(
                texture,
                self.grass_coverage,
                self.grass_height,
                self.grass_width,
            ));
        }

        self.replace_terrain();
        let result = self.terrain.generate(&params, &textures, &grass, &[]);
        self.finish_rebuild("generate", result)
    }

    /// Build the terrain from the red channel of `image`, scaled to `max_height`.
    #[func]
    fn load_heightmap(&mut self, image: Gd<Image>) -> bool {
        let (width, height) = (image.get_width(), image.get_height());
        let mut samples = Vec::with_capacity((width.max(0) * height.max(0)) as usize);
        for y in 0..height {
            for x in 0..width {
                samples.push(image.get_pixel(x, y).r * self.max_height);
            }
        }

        let textures = self.generation_textures();
        let grass_path = self.grass_texture_path.to_string();
        let grass = (!grass_path.is_empty()).then(|| self.texture_handle(&grass_path));

        self.replace_terrain();
        let result = self
            .terrain
            .load_from_heightmap(width, height, self.cell_size, &samples, &textures, grass.as_ref());
        self.finish_rebuild("load_heightmap", result)
    }

    /// Apply the current brush at `cell`. `invert` lowers instead of raising.
    #[func]
    fn apply_brush(&mut self, cell: Vector2i, invert: bool) -> bool {
        let tool = BrushTool::from_i32(self.brush_tool).unwrap_or_default();
        let size = self.brush_size;
        let add = if invert { -self.brush_strength } else { self.brush_strength };

        let result = match tool {
            BrushTool::RaiseLower => Ok(self.terrain.raise_lower(cell, size, add, &mut self.undo)),
            BrushTool::MountainValley => Ok(self.terrain.mountain_valley(cell, size, add, &mut self.undo)),
            BrushTool::Smooth | BrushTool::Flatten | BrushTool::Noise => Ok(tool
                .modify_op()
                .and_then(|op| self.terrain.modify(cell, size, op, &mut self.undo))),
            BrushTool::PaintTexture => match self.paint_handle() {
                Some(texture) => self.terrain.paint_texture(cell, size, &texture, &mut self.undo),
                None => Ok(None),
            },
            BrushTool::PaintGrass => {
                if self.grass_texture_path.is_empty() {
                    Ok(None)
                } else {
                    let path = self.grass_texture_path.to_string();
                    let texture = self.texture_handle(&path);
                    let (height, width) = (self.grass_height, self.grass_width);
                    self.terrain
                        .paint_grass(cell, size, &texture, height, width, &mut self.undo)
                }
            }
            BrushTool::RemoveGrass => Ok(self.terrain.remove_grass(cell, size, &mut self.undo)),
        };
        self.undo.commit();

        match result {
            Ok(Some(report)) => {
                self.log_edit(tool, &report);
                self.flush();
                true
            }
            Ok(None) => false,
            Err(err) => {
                godot_error!("PixyHeightfield: {} failed: {}", tool_name(tool), err);
                false
            }
        }
    }

    /// Cell under `screen_pos` as seen from `camera`, or (-1, -1).
    #[func]
    fn pick_cell(&mut self, camera: Gd<Camera3D>, screen_pos: Vector2) -> Vector2i {
        let to_local = self.base().get_global_transform().affine_inverse();
        let origin = to_local * camera.project_ray_origin(screen_pos);
        let direction = to_local.basis * camera.project_ray_normal(screen_pos);
        self.terrain
            .tile_pick(&Ray::new(origin, direction))
            .unwrap_or(Vector2i::new(-1, -1))
    }

    /// Surface height at a node-local XZ position.
    #[func]
    fn get_height_at(&self, x: f32, z: f32) -> f32 {
        self.terrain.exact_height_at(x, z).height
    }

    /// Surface normal at a node-local XZ position (up when nothing was hit).
    #[func]
    fn get_normal_at(&self, x: f32, z: f32) -> Vector3 {
        self.terrain.exact_height_at(x, z).normal.unwrap_or(Vector3::UP)
    }

    #[func]
    fn show_brush_preview(&mut self, cell: Vector2i) {
        let tool = BrushTool::from_i32(self.brush_tool).unwrap_or_default();
        let brush = BrushFootprint::new(cell, self.brush_size);
        self.preview.update_material(tool);
        let mesh = self.preview.generate_mesh(self.terrain.store(), &brush);
        let material = self.preview.get_material();
        let mut instance = self.preview_instance();

        match (mesh, material) {
            (Some(mesh), Some(material)) => {
                instance.set_mesh(&mesh);
                instance.set_material_override(&material.upcast::<Material>());
                instance.set_visible(true);
            }
            _ => instance.set_visible(false),
        }
    }

    #[func]
    fn hide_brush_preview(&mut self) {
        if let Some(ref mut instance) = self.preview_instance {
            instance.set_visible(false);
        }
    }

    #[func]
    fn undo(&mut self) -> bool {
        let result = self.undo.undo(&mut self.terrain);
        self.finish_history("undo", result)
    }

    #[func]
    fn redo(&mut self) -> bool {
        let result = self.undo.redo(&mut self.terrain);
        self.finish_history("redo", result)
    }

    /// Scatter instances of `scene` over the terrain. `bounds` is the local
    /// bounding box of the scene's mesh.
    #[func]
    fn distribute_meshes(&mut self, name: GString, scene: Gd<PackedScene>, bounds: Aabb, coverage: f32) -> i32 {
        let name = name.to_string();
        self.scene_templates.borrow_mut().insert(name.clone(), scene);
        let template = ScatterTemplate::new(name, bounds);
        let ids = self.terrain.distribute_meshes(&template, coverage, &mut self.undo);
        self.undo.commit();
        godot_print!("PixyHeightfield: placed {} '{}' instances", ids.len(), template.name);
        ids.len() as i32
    }

    /// Swap texture slot `index` for the texture at `path`.
    #[func]
    fn replace_texture(&mut self, index: i32, path: GString) -> bool {
        let texture = self.texture_handle(&path.to_string());
        let changed = self.terrain.replace_texture(index, &texture, &mut self.undo);
        self.undo.commit();
        if changed {
            self.meshes.clear_materials();
            self.flush();
        }
        changed
    }

    #[func]
    fn set_texture_height_thresholds(&mut self, low: f32, med: f32) {
        self.terrain.set_texture_height_thresholds(low, med);
        self.flush();
    }

    #[func]
    fn set_blend_intensity(&mut self, intensity: i32) {
        self.terrain.set_blend_intensity(intensity.clamp(0, 255) as u8);
        self.flush();
    }

    /// 0 = none, 1 = dynamic, 2 = lightmap vertex colors
    #[func]
    fn set_lighting_type(&mut self, lighting: i32) -> bool {
        let Some(lighting) = LightingType::from_i32(lighting) else {
            godot_warn!("PixyHeightfield: unknown lighting type {}", lighting);
            return false;
        };
        let changed = self.terrain.set_lighting_type(lighting, &mut self.undo);
        self.undo.commit();
        if changed {
            self.flush();
        }
        changed
    }

    #[func]
    fn get_material_count(&self) -> i32 {
        self.terrain.material_count() as i32
    }

    #[func]
    fn get_terrain_aabb(&self) -> Aabb {
        self.terrain.bounding_box()
    }

    /// Editable attributes as TOML (`TextureScale`, `GrassUsesWind`).
    #[func]
    fn get_attributes(&self) -> GString {
        match self.terrain.attributes().to_toml_string() {
            Ok(text) => GString::from(text.as_str()),
            Err(err) => {
                godot_error!("PixyHeightfield: {}", err);
                GString::new()
            }
        }
    }

    #[func]
    fn set_attributes(&mut self, text: GString) -> bool {
        let attributes = match TerrainAttributes::from_toml_str(&text.to_string()) {
            Ok(attributes) => attributes,
            Err(err) => {
                godot_error!("PixyHeightfield: {}", err);
                return false;
            }
        };
        let changed = self.terrain.apply_attributes(&attributes);
        if changed {
            self.flush();
        }
        changed
    }

    #[func]
    fn save_to_bytes(&self) -> PackedByteArray {
        match terrain_to_bytes(&self.terrain) {
            Ok(bytes) => PackedByteArray::from(&bytes[..]),
            Err(err) => {
                godot_error!("PixyHeightfield: save failed: {}", err);
                PackedByteArray::new()
            }
        }
    }

    #[func]
    fn load_from_bytes(&mut self, bytes: PackedByteArray) -> bool {
        let mut terrain = Terrain::new(self.load_config());
        let handles = &mut self.texture_handles;
        let mut resolver = |name: &str| {
            Some(
                handles
                    .entry(name.to_string())
                    .or_insert_with(|| TextureHandle::new(name))
                    .clone(),
            )
        };
        if let Err(err) = terrain_from_bytes(&mut terrain, bytes.as_slice(), &mut resolver) {
            godot_error!("PixyHeightfield: load failed: {}", err);
            return false;
        }

        self.undo.clear();
        self.meshes.release_tiles();
        let scene = self.scene_host();
        terrain.set_scene_host(scene);
        self.terrain = terrain;
        self.finish_rebuild("load_from_bytes", Ok(()))
    }
}

impl PixyHeightfield {
    /// Shared handle for the texture resource at `path`.
    fn texture_handle(&mut self, path: &str) -> TextureHandle {
        self.texture_handles
            .entry(path.to_string())
            .or_insert_with(|| TextureHandle::new(path))
            .clone()
    }

    fn generation_textures(&mut self) -> Vec<TextureHandle> {
        let paths: Vec<String> = self.texture_paths.as_slice().iter().map(|p| p.to_string()).collect();
        paths.iter().map(|p| self.texture_handle(p)).collect()
    }

    fn paint_handle(&mut self) -> Option<TextureHandle> {
        if self.paint_texture_path.is_empty() {
            return None;
        }
        let path = self.paint_texture_path.to_string();
        Some(self.texture_handle(&path))
    }

    /// Terrain settings: the optional TOML file, then the exported overrides.
    fn load_config(&self) -> TerrainConfig {
        let mut config = if self.config_path.is_empty() {
            TerrainConfig::default()
        } else {
            let text = FileAccess::get_file_as_string(&self.config_path).to_string();
            TerrainConfig::from_toml_str(&text).unwrap_or_else(|err| {
                godot_warn!("PixyHeightfield: ignoring {}: {}", self.config_path, err);
                TerrainConfig::default()
            })
        };
        config.cells_per_tile_side = self.cells_per_tile_side.max(1);
        config.seed = self.seed as u64;
        config
    }

    fn scene_host(&mut self) -> Box<dyn SceneHost> {
        let parent = self.to_gd().upcast::<Node3D>();
        Box::new(NodeSceneHost::new(parent, self.scene_templates.clone()))
    }

    /// Start over with an empty terrain built from the current settings.
    fn replace_terrain(&mut self) {
        let mut terrain = Terrain::new(self.load_config());
        terrain.set_scene_host(self.scene_host());
        self.terrain = terrain;
        self.undo.clear();
        self.meshes.release_tiles();
    }

    fn flush(&mut self) -> usize {
        self.meshes.parent = Some(self.to_gd().upcast::<Node3D>());
        self.terrain.flush_dirty_tiles(&mut self.meshes)
    }

    fn finish_rebuild(&mut self, what: &str, result: crate::error::TerrainResult<()>) -> bool {
        if let Err(err) = result {
            godot_error!("PixyHeightfield: {} failed: {}", what, err);
            return false;
        }
        let uploaded = self.flush();
        let grid = self.terrain.grid();
        godot_print!(
            "PixyHeightfield: {} done, {}x{} cells, {} tiles uploaded, {} grass patches",
            what,
            grid.cell_count_x,
            grid.cell_count_y,
            uploaded,
            self.terrain.grass().len()
        );
        if self.debug_logging {
            let normals: Vec<Vector3> = self
                .terrain
                .tiles()
                .iter()
                .flat_map(|t| t.batches.iter())
                .flat_map(|b| b.vertices.iter().map(|v| v.normal))
                .collect();
            debug_log(&format!("[{}] normals: {:?}", what, compute_normal_stats(&normals)));
        }
        true
    }

    fn finish_history(&mut self, what: &str, result: crate::error::TerrainResult<bool>) -> bool {
        match result {
            Ok(true) => {
                self.meshes.clear_materials();
                self.flush();
                true
            }
            Ok(false) => false,
            Err(err) => {
                godot_error!("PixyHeightfield: {} failed: {}", what, err);
                false
            }
        }
    }

    fn preview_instance(&mut self) -> Gd<MeshInstance3D> {
        if let Some(ref instance) = self.preview_instance {
            if instance.is_instance_valid() {
                return instance.clone();
            }
        }
        let mut instance = MeshInstance3D::new_alloc();
        instance.set_name("BrushPreview");
        self.base_mut().add_child(&instance);
        self.preview_instance = Some(instance.clone());
        instance
    }

    fn log_edit(&self, tool: BrushTool, report: &EditReport) {
        debug_log(&format!(
            "[{}] rebuilt {:?} -> tiles {:?}",
            tool_name(tool),
            report.rebuilt,
            report.tiles
        ));
    }
}

fn tool_name(tool: BrushTool) -> &'static str {
    match tool {
        BrushTool::RaiseLower => "raise/lower",
        BrushTool::MountainValley => "mountain/valley",
        BrushTool::Smooth => "smooth",
        BrushTool::Flatten => "flatten",
        BrushTool::Noise => "noise",
        BrushTool::PaintTexture => "paint texture",
        BrushTool::PaintGrass => "paint grass",
        BrushTool::RemoveGrass => "remove grass",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winding_is_reversed_per_triangle() {
        assert_eq!(godot_indices(&[0, 3, 1, 0, 2, 3]), vec![0, 1, 3, 0, 3, 2]);
    }

    #[test]
    fn test_shader_variants() {
        let grass = MaterialFlags {
            double_sided: true,
            lit: false,
            wind: true,
        };
        let code = shader_code(grass, BatchKind::Grass);
        assert!(code.contains("cull_disabled"));
        assert!(code.contains("unshaded"));
        assert!(code.contains("ALPHA_SCISSOR_THRESHOLD"));

        let ground = MaterialFlags {
            double_sided: false,
            lit: true,
            wind: false,
        };
        let code = shader_code(ground, BatchKind::Terrain);
        assert!(code.contains("cull_back"));
        assert!(!code.contains("unshaded"));
        assert!(!code.contains("{alpha}"));
    }
}
