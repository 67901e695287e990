//! Typed view of the container's structured metadata.
//!
//! Only the fields the ingestion pipeline consumes are modelled; anything
//! else in the document is ignored. Optional fields carry the defaults the
//! format defines, required ones fail deserialization.

use serde::Deserialize;

use crate::error::{Result, SceneError};

/// Accessor component types, as stored in `componentType`.
pub const COMPONENT_BYTE: u32 = 5120;
pub const COMPONENT_UNSIGNED_BYTE: u32 = 5121;
pub const COMPONENT_SHORT: u32 = 5122;
pub const COMPONENT_UNSIGNED_SHORT: u32 = 5123;
pub const COMPONENT_UNSIGNED_INT: u32 = 5125;
pub const COMPONENT_FLOAT: u32 = 5126;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Index of the scene to display, if the document names one.
    pub scene: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<SceneDef>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub extensions: DocumentExtensions,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SceneDef {
    pub name: Option<String>,
    /// Root node indices.
    #[serde(default)]
    pub nodes: Vec<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Node {
    pub name: Option<String>,
    /// Quaternion (x, y, z, w).
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    /// Column-major local matrix; replaces rotation/translation/scale when present.
    pub matrix: Option<[f32; 16]>,
    #[serde(default)]
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub camera: Option<usize>,
    #[serde(default)]
    pub extensions: NodeExtensions,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: None,
            rotation: identity_rotation(),
            translation: [0.0; 3],
            scale: unit_scale(),
            matrix: None,
            children: Vec::new(),
            mesh: None,
            camera: None,
            extensions: NodeExtensions::default(),
        }
    }
}

impl Node {
    /// Light definition index from the punctual-lights extension, if any.
    pub fn light(&self) -> Option<usize> {
        self.extensions.lights_punctual.as_ref().map(|l| l.light)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodeExtensions {
    #[serde(rename = "KHR_lights_punctual")]
    pub lights_punctual: Option<NodeLight>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct NodeLight {
    pub light: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    /// Only the first primitive of a mesh is rendered.
    pub fn primitive(&self) -> Option<&Primitive> {
        self.primitives.first()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Primitive {
    #[serde(default)]
    pub attributes: Attributes,
    pub indices: Option<usize>,
    pub material: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Attributes {
    #[serde(rename = "POSITION")]
    pub position: Option<usize>,
    #[serde(rename = "NORMAL")]
    pub normal: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Accessor {
    /// Size in bytes of one element, or `None` for an unknown type.
    pub fn element_size(&self) -> Option<usize> {
        let component = match self.component_type {
            COMPONENT_BYTE | COMPONENT_UNSIGNED_BYTE => 1,
            COMPONENT_SHORT | COMPONENT_UNSIGNED_SHORT => 2,
            COMPONENT_UNSIGNED_INT | COMPONENT_FLOAT => 4,
            _ => return None,
        };
        let components = match self.kind.as_str() {
            "SCALAR" => 1,
            "VEC2" => 2,
            "VEC3" => 3,
            "VEC4" | "MAT2" => 4,
            "MAT3" => 9,
            "MAT4" => 16,
            _ => return None,
        };
        Some(component * components)
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    #[serde(default)]
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: Option<String>,
    #[serde(default)]
    pub pbr_metallic_roughness: PbrMetallicRoughness,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    #[serde(default = "white")]
    pub base_color_factor: [f32; 4],
    #[serde(default = "one")]
    pub roughness_factor: f32,
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self { base_color_factor: white(), roughness_factor: 1.0 }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Camera {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub perspective: Option<Perspective>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Perspective {
    /// Vertical field of view in radians.
    pub yfov: f32,
    pub aspect_ratio: Option<f32>,
    pub znear: f32,
    /// Absent for an infinite far plane.
    pub zfar: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DocumentExtensions {
    #[serde(rename = "KHR_lights_punctual")]
    pub lights_punctual: Option<LightsPunctual>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LightsPunctual {
    #[serde(default)]
    pub lights: Vec<LightDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LightDef {
    pub name: Option<String>,
    #[serde(rename = "type", default = "point")]
    pub kind: String,
    #[serde(default = "one")]
    pub intensity: f32,
}

impl LightDef {
    pub fn is_point(&self) -> bool {
        self.kind == "point"
    }
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

fn white() -> [f32; 4] {
    [1.0; 4]
}

fn one() -> f32 {
    1.0
}

fn point() -> String {
    "point".to_string()
}

impl Document {
    /// Deserialize and validate a metadata document.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: Document = serde_json::from_str(text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// The scene to display: `scene` when present, else the first one.
    pub fn active_scene(&self) -> Result<&SceneDef> {
        let index = self.scene.unwrap_or(0);
        self.scenes
            .get(index)
            .ok_or_else(|| SceneError::MalformedMetadata(format!("scene {index} does not exist")))
    }

    /// Light definitions declared by the punctual-lights extension.
    pub fn lights(&self) -> &[LightDef] {
        self.extensions
            .lights_punctual
            .as_ref()
            .map(|l| l.lights.as_slice())
            .unwrap_or(&[])
    }

    /// Check every cross-reference the pipeline follows.
    ///
    /// Attribute references are left to attribute extraction, which reports
    /// them as missing attributes.
    pub fn validate(&self) -> Result<()> {
        let scene = self.active_scene()?;
        let node_count = self.nodes.len();

        for &root in &scene.nodes {
            check_index("scene root node", root, node_count)?;
        }

        for (i, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                check_index(&format!("node {i} child"), child, node_count)?;
            }
            if let Some(mesh) = node.mesh {
                check_index(&format!("node {i} mesh"), mesh, self.meshes.len())?;
            }
            if let Some(camera) = node.camera {
                check_index(&format!("node {i} camera"), camera, self.cameras.len())?;
            }
            if let Some(light) = node.light() {
                check_index(&format!("node {i} light"), light, self.lights().len())?;
            }
        }

        for (i, mesh) in self.meshes.iter().enumerate() {
            let primitive = mesh
                .primitive()
                .ok_or_else(|| SceneError::MalformedMetadata(format!("mesh {i} has no primitives")))?;
            if mesh.primitives.len() > 1 {
                log::warn!("mesh {i} has {} primitives; only the first is used", mesh.primitives.len());
            }
            if let Some(material) = primitive.material {
                check_index(&format!("mesh {i} material"), material, self.materials.len())?;
            }
        }

        for (i, accessor) in self.accessors.iter().enumerate() {
            if let Some(view) = accessor.buffer_view {
                check_index(&format!("accessor {i} buffer view"), view, self.buffer_views.len())?;
            }
            if accessor.element_size().is_none() {
                return Err(SceneError::MalformedMetadata(format!(
                    "accessor {i} has unsupported layout {} / {}",
                    accessor.kind, accessor.component_type
                )));
            }
        }

        for (i, camera) in self.cameras.iter().enumerate() {
            if let Some(p) = &camera.perspective {
                if !(p.yfov > 0.0 && p.znear > 0.0) || p.zfar.is_some_and(|far| far <= p.znear) {
                    return Err(SceneError::MalformedMetadata(format!(
                        "camera {i} has an invalid perspective projection"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_index(what: &str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(SceneError::MalformedMetadata(format!("{what} index {index} out of range ({len})")))
    }
}
