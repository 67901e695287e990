use std::ops::Range;
use std::sync::Arc;

use glam::Mat4;
use glimmer_gpu_shared::uniforms::{
    pack_blocks, CameraUniforms, InstanceUniforms, LightUniforms, MaterialUniforms,
};

use crate::attributes::{decode_indices, MeshAttributes};

/// Vertex and index data of one mesh, as ranges into the scene's payload.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneMesh {
    /// Index of the mesh in the source document.
    pub source: usize,
    pub name: Option<String>,
    pub attributes: MeshAttributes,
}

/// A mesh placed in the world, ready to draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderInstance {
    /// Node the instance was created from.
    pub node: usize,
    /// Index into [`Scene::meshes`].
    pub mesh: usize,
    /// Index into [`Scene::materials`].
    pub material: usize,
    pub world: Mat4,
    pub uniforms: InstanceUniforms,
}

/// A problem the load recovered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadWarning {
    pub node: Option<usize>,
    pub message: String,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node {
            Some(node) => write!(f, "node {node}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A fully loaded scene.
///
/// Immutable once built. Vertex and index accessors slice the source bytes
/// the scene was loaded from; nothing is copied out of the payload.
#[derive(Debug)]
pub struct Scene {
    pub(crate) source: Arc<[u8]>,
    pub(crate) payload: Range<usize>,
    pub(crate) meshes: Vec<SceneMesh>,
    pub(crate) instances: Vec<RenderInstance>,
    pub(crate) materials: Vec<MaterialUniforms>,
    pub(crate) camera: CameraUniforms,
    pub(crate) light: Option<LightUniforms>,
    pub(crate) warnings: Vec<LoadWarning>,
    pub(crate) uniform_alignment: u64,
}

impl Scene {
    /// The binary payload chunk.
    pub fn payload(&self) -> &[u8] {
        &self.source[self.payload.clone()]
    }

    pub fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    pub fn instances(&self) -> &[RenderInstance] {
        &self.instances
    }

    pub fn materials(&self) -> &[MaterialUniforms] {
        &self.materials
    }

    pub fn camera(&self) -> &CameraUniforms {
        &self.camera
    }

    /// The scene's point light, if it has one.
    pub fn light(&self) -> Option<&LightUniforms> {
        self.light.as_ref()
    }

    /// The light block to bind: the scene's light or the all-zero block.
    pub fn light_uniforms(&self) -> LightUniforms {
        self.light.unwrap_or_default()
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Block stride alignment requested at load time.
    pub fn uniform_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    /// Tightly packed `f32x3` positions of `mesh`.
    pub fn positions(&self, mesh: usize) -> Option<&[u8]> {
        let m = self.meshes.get(mesh)?;
        Some(m.attributes.positions.slice(self.payload()))
    }

    /// Tightly packed `f32x3` normals of `mesh`, when it has them.
    pub fn normals(&self, mesh: usize) -> Option<&[u8]> {
        let m = self.meshes.get(mesh)?;
        Some(m.attributes.normals?.slice(self.payload()))
    }

    /// Raw little-endian 16-bit indices of `mesh`.
    pub fn index_bytes(&self, mesh: usize) -> Option<&[u8]> {
        let m = self.meshes.get(mesh)?;
        Some(m.attributes.indices.slice(self.payload()))
    }

    /// Decoded indices of `mesh`.
    pub fn indices(&self, mesh: usize) -> Option<Vec<u16>> {
        self.index_bytes(mesh).map(decode_indices)
    }

    pub fn instance_blocks(&self) -> Vec<InstanceUniforms> {
        self.instances.iter().map(|i| i.uniforms).collect()
    }

    /// Instance blocks laid out for dynamic-offset binding.
    pub fn instance_block_bytes(&self, alignment: u64) -> Vec<u8> {
        pack_blocks(&self.instance_blocks(), alignment)
    }

    /// Material blocks laid out for dynamic-offset binding.
    pub fn material_block_bytes(&self, alignment: u64) -> Vec<u8> {
        pack_blocks(&self.materials, alignment)
    }
}
